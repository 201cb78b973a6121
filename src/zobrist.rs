use once_cell::sync::Lazy;

use crate::types::{Color, Hand, Piece, PieceType, Square};

/// Largest count a single hand slot can hold, plus one for the empty slot.
const HAND_SLOTS: usize = 19;

/// Zobrist hashing keys for shogi positions.
/// These are pseudo-random u64 values XORed together to create a unique hash for each position.
pub struct ZobristKeys {
    /// Keys for each (piece, square) combination: 28 * 81 keys.
    /// Indexed as: pieces[piece.index()][square]
    pub pieces: [[u64; Square::NUM]; Piece::NUM],
    /// Keys for hand contents, one per count: hands[color][hand kind][count].
    /// A count of zero hashes to zero so an empty hand leaves the key untouched.
    pub hands: [[[u64; HAND_SLOTS]; 7]; Color::NUM],
    /// Key for side to move (XORed when it's white's turn)
    pub side_to_move: u64,
}

impl ZobristKeys {
    /// Initialize Zobrist keys with deterministic pseudo-random values.
    pub fn new() -> Self {
        let mut rng = XorShift64::new(0x5A0B_1CE5_D00D_F00D);

        let mut pieces = [[0u64; Square::NUM]; Piece::NUM];
        for piece in pieces.iter_mut() {
            for key in piece.iter_mut() {
                *key = rng.next();
            }
        }

        let mut hands = [[[0u64; HAND_SLOTS]; 7]; Color::NUM];
        for color in hands.iter_mut() {
            for kind in color.iter_mut() {
                for key in kind.iter_mut().skip(1) {
                    *key = rng.next();
                }
            }
        }

        let side_to_move = rng.next();

        ZobristKeys {
            pieces,
            hands,
            side_to_move,
        }
    }

    #[inline(always)]
    pub fn piece_key(&self, piece: Piece, sq: Square) -> u64 {
        self.pieces[piece.index()][sq.index()]
    }

    /// Key for `color` holding exactly `count` pieces of kind `pt`.
    #[inline]
    pub fn hand_key(&self, color: Color, pt: PieceType, count: u32) -> u64 {
        match pt.hand_index() {
            Some(i) => self.hands[color.index()][i][(count as usize).min(HAND_SLOTS - 1)],
            None => 0,
        }
    }

    /// Combined key for an entire hand.
    pub fn full_hand_key(&self, color: Color, hand: Hand) -> u64 {
        PieceType::HAND_KINDS
            .iter()
            .fold(0, |acc, &pt| acc ^ self.hand_key(color, pt, hand.count(pt)))
    }
}

impl Default for ZobristKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple XorShift64 PRNG for deterministic key generation
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64 { state: seed }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Global static Zobrist keys (initialized once)
pub static ZOBRIST_KEYS: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zobrist_keys_unique() {
        let keys = ZobristKeys::new();
        assert_ne!(keys.side_to_move, 0);

        let mut all_keys: Vec<u64> = keys.pieces.iter().flatten().copied().collect();
        for color in &keys.hands {
            for kind in color {
                all_keys.extend(kind.iter().skip(1));
            }
        }
        all_keys.push(keys.side_to_move);

        all_keys.sort_unstable();
        for pair in all_keys.windows(2) {
            assert_ne!(pair[0], pair[1], "Duplicate Zobrist key found");
        }
    }

    #[test]
    fn test_zobrist_deterministic() {
        let keys1 = ZobristKeys::new();
        let keys2 = ZobristKeys::new();
        assert_eq!(keys1.side_to_move, keys2.side_to_move);
        assert_eq!(keys1.pieces, keys2.pieces);
        assert_eq!(keys1.hands, keys2.hands);
    }

    #[test]
    fn test_empty_hand_hashes_to_zero() {
        let keys = ZobristKeys::new();
        assert_eq!(keys.full_hand_key(Color::Black, Hand::EMPTY), 0);
        let hand = Hand::EMPTY.add(PieceType::Pawn);
        assert_eq!(
            keys.full_hand_key(Color::Black, hand),
            keys.hand_key(Color::Black, PieceType::Pawn, 1)
        );
        assert_eq!(keys.hand_key(Color::White, PieceType::King, 1), 0);
    }
}
