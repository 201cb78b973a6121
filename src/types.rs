//! Core value types: colors, piece kinds, squares, hands and packed moves.
//!
//! Square indexing: `sq = file * 9 + rank`, where file 0 is the USI file `1`
//! (right edge from Black's point of view) and rank 0 is the USI rank `a`
//! (White's back rank). Black moves towards rank 0.

use std::fmt;
use std::ops::Not;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Color {
    /// Moves first. Uppercase letters in SFEN.
    Black = 0,
    White = 1,
}

impl Color {
    pub const NUM: usize = 2;
    pub const ALL: [Color; 2] = [Color::Black, Color::White];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn other_color(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Color of a SFEN piece letter: uppercase is Black, lowercase is White.
    pub fn from_case(c: char) -> Option<Color> {
        if c.is_ascii_uppercase() {
            Some(Color::Black)
        } else if c.is_ascii_lowercase() {
            Some(Color::White)
        } else {
            None
        }
    }

    pub fn to_human(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
        }
    }
}

impl Not for Color {
    type Output = Color;

    #[inline(always)]
    fn not(self) -> Color {
        self.other_color()
    }
}

/// The fourteen piece kinds. Promotable kinds occupy 0..6 and their promoted
/// counterparts sit exactly six slots later.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PieceType {
    Pawn = 0,
    Lance = 1,
    Knight = 2,
    Silver = 3,
    Bishop = 4,
    Rook = 5,
    ProPawn = 6,
    ProLance = 7,
    ProKnight = 8,
    ProSilver = 9,
    Horse = 10,
    Dragon = 11,
    Gold = 12,
    King = 13,
}

impl PieceType {
    pub const NUM: usize = 14;

    pub const ALL: [PieceType; 14] = [
        PieceType::Pawn,
        PieceType::Lance,
        PieceType::Knight,
        PieceType::Silver,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::ProPawn,
        PieceType::ProLance,
        PieceType::ProKnight,
        PieceType::ProSilver,
        PieceType::Horse,
        PieceType::Dragon,
        PieceType::Gold,
        PieceType::King,
    ];

    /// Kinds that can sit in a hand, in the order used by [`Hand`] and drop generation.
    pub const HAND_KINDS: [PieceType; 7] = [
        PieceType::Pawn,
        PieceType::Lance,
        PieceType::Knight,
        PieceType::Silver,
        PieceType::Gold,
        PieceType::Bishop,
        PieceType::Rook,
    ];

    const PROMOTION_OFFSET: u8 = 6;

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn from_index(idx: usize) -> Option<PieceType> {
        if idx < Self::NUM {
            Some(Self::ALL[idx])
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn is_promotable(self) -> bool {
        (self as u8) < Self::PROMOTION_OFFSET
    }

    #[inline(always)]
    pub const fn is_promoted(self) -> bool {
        let v = self as u8;
        v >= Self::PROMOTION_OFFSET && v < 2 * Self::PROMOTION_OFFSET
    }

    /// Promoted counterpart. Unpromotable kinds are returned unchanged.
    #[inline]
    pub const fn promote(self) -> PieceType {
        if self.is_promotable() {
            Self::ALL[self as usize + Self::PROMOTION_OFFSET as usize]
        } else {
            self
        }
    }

    /// Base kind of a promoted piece. Base kinds are returned unchanged.
    #[inline]
    pub const fn demote(self) -> PieceType {
        if self.is_promoted() {
            Self::ALL[self as usize - Self::PROMOTION_OFFSET as usize]
        } else {
            self
        }
    }

    /// Kinds that move like a gold general.
    #[inline]
    pub const fn is_gold_like(self) -> bool {
        matches!(
            self,
            PieceType::Gold
                | PieceType::ProPawn
                | PieceType::ProLance
                | PieceType::ProKnight
                | PieceType::ProSilver
        )
    }

    /// Slot in [`PieceType::HAND_KINDS`], or `None` for kinds that never enter a hand.
    #[inline]
    pub const fn hand_index(self) -> Option<usize> {
        match self {
            PieceType::Pawn => Some(0),
            PieceType::Lance => Some(1),
            PieceType::Knight => Some(2),
            PieceType::Silver => Some(3),
            PieceType::Gold => Some(4),
            PieceType::Bishop => Some(5),
            PieceType::Rook => Some(6),
            _ => None,
        }
    }

    /// SFEN letter of the base kind (uppercase). Promoted kinds use their base letter.
    pub const fn to_char(self) -> char {
        match self.demote() {
            PieceType::Pawn => 'P',
            PieceType::Lance => 'L',
            PieceType::Knight => 'N',
            PieceType::Silver => 'S',
            PieceType::Bishop => 'B',
            PieceType::Rook => 'R',
            PieceType::Gold => 'G',
            _ => 'K',
        }
    }

    /// Unpromoted kind for a SFEN letter (either case).
    pub fn from_char(c: char) -> Option<PieceType> {
        match c.to_ascii_uppercase() {
            'P' => Some(PieceType::Pawn),
            'L' => Some(PieceType::Lance),
            'N' => Some(PieceType::Knight),
            'S' => Some(PieceType::Silver),
            'B' => Some(PieceType::Bishop),
            'R' => Some(PieceType::Rook),
            'G' => Some(PieceType::Gold),
            'K' => Some(PieceType::King),
            _ => None,
        }
    }

    pub fn to_human(self) -> &'static str {
        match self {
            Self::Pawn => "pawn",
            Self::Lance => "lance",
            Self::Knight => "knight",
            Self::Silver => "silver",
            Self::Bishop => "bishop",
            Self::Rook => "rook",
            Self::ProPawn => "tokin",
            Self::ProLance => "promoted lance",
            Self::ProKnight => "promoted knight",
            Self::ProSilver => "promoted silver",
            Self::Horse => "horse",
            Self::Dragon => "dragon",
            Self::Gold => "gold",
            Self::King => "king",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Piece {
    pub color: Color,
    pub piece_type: PieceType,
}

impl Piece {
    /// Number of distinct colored pieces, used to size history tables.
    pub const NUM: usize = Color::NUM * PieceType::NUM;

    #[inline(always)]
    pub const fn new(color: Color, piece_type: PieceType) -> Piece {
        Piece { color, piece_type }
    }

    /// Dense index in `0..Piece::NUM`.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.color.index() * PieceType::NUM + self.piece_type.index()
    }

    /// SFEN token for this piece, e.g. `P`, `+r`.
    pub fn to_sfen(self) -> String {
        let letter = self.piece_type.to_char();
        let letter = match self.color {
            Color::Black => letter,
            Color::White => letter.to_ascii_lowercase(),
        };
        if self.piece_type.is_promoted() {
            format!("+{letter}")
        } else {
            letter.to_string()
        }
    }
}

/// A board square, or the synthetic [`Square::HAND`] source of a drop.
#[derive(PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub const NUM: usize = 81;
    /// Source square of every drop move.
    pub const HAND: Square = Square(81);

    #[inline(always)]
    pub const fn new(file: u8, rank: u8) -> Square {
        debug_assert!(file < 9 && rank < 9);
        Square(file * 9 + rank)
    }

    #[inline(always)]
    pub const fn from_index(idx: u8) -> Square {
        debug_assert!(idx <= 81);
        Square(idx)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// File 0..9, where 0 is the USI file `1`.
    #[inline(always)]
    pub const fn file(self) -> u8 {
        self.0 / 9
    }

    /// Rank 0..9, where 0 is the USI rank `a`.
    #[inline(always)]
    pub const fn rank(self) -> u8 {
        self.0 % 9
    }

    #[inline(always)]
    pub const fn is_on_board(self) -> bool {
        self.0 < 81
    }

    /// Rank as seen by `color`: 0 is that color's far edge.
    #[inline(always)]
    pub const fn relative_rank(self, color: Color) -> u8 {
        match color {
            Color::Black => self.rank(),
            Color::White => 8 - self.rank(),
        }
    }

    /// Whether this square lies in `color`'s three-rank promotion zone.
    #[inline(always)]
    pub const fn in_promotion_zone(self, color: Color) -> bool {
        self.relative_rank(color) < 3
    }

    /// Square offset by `(df, dr)`, or `None` when it leaves the board.
    #[inline]
    pub const fn offset(self, df: i8, dr: i8) -> Option<Square> {
        let f = self.file() as i8 + df;
        let r = self.rank() as i8 + dr;
        if f >= 0 && f < 9 && r >= 0 && r < 9 {
            Some(Square::new(f as u8, r as u8))
        } else {
            None
        }
    }

    pub fn all() -> impl Iterator<Item = Square> {
        (0..81u8).map(Square)
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_on_board() {
            write!(f, "{}{}", self.file() + 1, (b'a' + self.rank()) as char)
        } else {
            write!(f, "hand")
        }
    }
}

/// Pieces held in reserve, packed into a `u32`.
///
/// Bit layout: pawn 0-4, lance 5-7, knight 8-10, silver 11-13, gold 14-16,
/// bishop 17-18, rook 19-20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hand(u32);

impl Hand {
    pub const EMPTY: Hand = Hand(0);

    const SHIFTS: [u32; 7] = [0, 5, 8, 11, 14, 17, 19];
    const MASKS: [u32; 7] = [0x1F, 0x07, 0x07, 0x07, 0x07, 0x03, 0x03];
    /// Highest count each kind can reach in a legal game.
    pub const MAX_COUNTS: [u32; 7] = [18, 4, 4, 4, 4, 2, 2];

    #[inline]
    pub const fn count(self, pt: PieceType) -> u32 {
        match pt.hand_index() {
            Some(i) => (self.0 >> Self::SHIFTS[i]) & Self::MASKS[i],
            None => 0,
        }
    }

    #[inline]
    pub const fn has(self, pt: PieceType) -> bool {
        self.count(pt) > 0
    }

    #[inline]
    pub const fn add(self, pt: PieceType) -> Hand {
        match pt.hand_index() {
            Some(i) => Hand(self.0 + (1 << Self::SHIFTS[i])),
            None => self,
        }
    }

    #[inline]
    pub const fn sub(self, pt: PieceType) -> Hand {
        debug_assert!(self.has(pt));
        match pt.hand_index() {
            Some(i) => Hand(self.0 - (1 << Self::SHIFTS[i])),
            None => self,
        }
    }

    #[inline]
    pub const fn set(self, pt: PieceType, count: u32) -> Hand {
        match pt.hand_index() {
            Some(i) => {
                let shift = Self::SHIFTS[i];
                let mask = Self::MASKS[i];
                Hand((self.0 & !(mask << shift)) | ((count & mask) << shift))
            }
            None => self,
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when the hand holds anything besides pawns.
    #[inline]
    pub const fn has_non_pawn(self) -> bool {
        self.0 & !Self::MASKS[0] != 0
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Hand {
        Hand(raw)
    }
}

/// A move packed into 16 bits.
///
/// Bits 0-6 hold the destination, bits 7-13 the origin square (or the dropped
/// kind for drops), bit 14 the promotion flag and bit 15 the drop flag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Move(u16);

impl Move {
    const SQ_MASK: u16 = 0x7F;
    const FROM_SHIFT: u16 = 7;
    const PROMOTE_FLAG: u16 = 1 << 14;
    const DROP_FLAG: u16 = 1 << 15;

    pub const NONE: Move = Move(0);
    /// Passing move used by null-move pruning. Never legal on the board.
    pub const NULL: Move = Move(1 | (1 << 7));

    #[inline(always)]
    pub const fn new_normal(from: Square, to: Square, promote: bool) -> Move {
        let mut raw = to.0 as u16 | ((from.0 as u16) << Self::FROM_SHIFT);
        if promote {
            raw |= Self::PROMOTE_FLAG;
        }
        Move(raw)
    }

    #[inline(always)]
    pub const fn new_drop(piece_type: PieceType, to: Square) -> Move {
        Move(to.0 as u16 | ((piece_type as u16) << Self::FROM_SHIFT) | Self::DROP_FLAG)
    }

    #[inline(always)]
    pub const fn to(self) -> Square {
        Square((self.0 & Self::SQ_MASK) as u8)
    }

    /// Origin square; [`Square::HAND`] for drops.
    #[inline(always)]
    pub const fn from(self) -> Square {
        if self.is_drop() {
            Square::HAND
        } else {
            Square(((self.0 >> Self::FROM_SHIFT) & Self::SQ_MASK) as u8)
        }
    }

    #[inline(always)]
    pub const fn is_drop(self) -> bool {
        self.0 & Self::DROP_FLAG != 0
    }

    #[inline(always)]
    pub const fn is_promotion(self) -> bool {
        self.0 & Self::PROMOTE_FLAG != 0
    }

    /// Kind placed by a drop. Only meaningful when [`Move::is_drop`] holds.
    #[inline(always)]
    pub const fn dropped_piece(self) -> PieceType {
        PieceType::ALL[(((self.0 >> Self::FROM_SHIFT) & Self::SQ_MASK) as usize) % PieceType::NUM]
    }

    #[inline(always)]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Neither [`Move::NONE`] nor [`Move::NULL`].
    #[inline(always)]
    pub const fn is_ok(self) -> bool {
        self.0 != Self::NONE.0 && self.0 != Self::NULL.0
    }

    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Move {
        Move(raw)
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        if *self == Move::NULL {
            return write!(f, "null");
        }
        if self.is_drop() {
            write!(f, "{}*{:?}", self.dropped_piece().to_char(), self.to())
        } else {
            write!(
                f,
                "{:?}{:?}{}",
                self.from(),
                self.to(),
                if self.is_promotion() { "+" } else { "" }
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_demote() {
        for pt in PieceType::ALL {
            if pt.is_promotable() {
                assert_eq!(pt.promote().index(), pt.index() + 6);
                assert_eq!(pt.promote().demote(), pt);
                assert!(pt.promote().is_promoted());
            } else {
                assert_eq!(pt.promote(), pt);
            }
        }
        assert_eq!(PieceType::Gold.demote(), PieceType::Gold);
        assert_eq!(PieceType::King.promote(), PieceType::King);
    }

    #[test]
    fn test_square_geometry() {
        let sq = Square::new(6, 6); // 7g
        assert_eq!(sq.file(), 6);
        assert_eq!(sq.rank(), 6);
        assert_eq!(format!("{:?}", sq), "7g");
        assert!(Square::new(0, 2).in_promotion_zone(Color::Black));
        assert!(!Square::new(0, 3).in_promotion_zone(Color::Black));
        assert!(Square::new(0, 6).in_promotion_zone(Color::White));
        assert_eq!(Square::new(0, 0).offset(-1, 0), None);
        assert_eq!(Square::new(4, 4).offset(1, -1), Some(Square::new(5, 3)));
    }

    #[test]
    fn test_hand_counts() {
        let mut hand = Hand::EMPTY;
        for _ in 0..18 {
            hand = hand.add(PieceType::Pawn);
        }
        hand = hand.add(PieceType::Rook).add(PieceType::Rook);
        assert_eq!(hand.count(PieceType::Pawn), 18);
        assert_eq!(hand.count(PieceType::Rook), 2);
        assert_eq!(hand.count(PieceType::Bishop), 0);
        assert!(hand.has_non_pawn());

        let hand = hand.sub(PieceType::Rook).set(PieceType::Gold, 3);
        assert_eq!(hand.count(PieceType::Rook), 1);
        assert_eq!(hand.count(PieceType::Gold), 3);
        assert_eq!(hand.count(PieceType::Pawn), 18);
        assert!(!Hand::EMPTY.add(PieceType::Pawn).has_non_pawn());
    }

    #[test]
    fn test_move_packing() {
        let from = Square::new(6, 6);
        let to = Square::new(6, 5);
        let mv = Move::new_normal(from, to, false);
        assert_eq!(mv.from(), from);
        assert_eq!(mv.to(), to);
        assert!(!mv.is_drop());
        assert!(!mv.is_promotion());

        let promo = Move::new_normal(Square::new(7, 2), Square::new(1, 1), true);
        assert!(promo.is_promotion());
        assert_eq!(format!("{:?}", promo), "8c2b+");

        let drop = Move::new_drop(PieceType::Silver, Square::new(4, 4));
        assert!(drop.is_drop());
        assert_eq!(drop.from(), Square::HAND);
        assert_eq!(drop.dropped_piece(), PieceType::Silver);
        assert_eq!(format!("{:?}", drop), "S*5e");

        assert!(!Move::NULL.is_ok());
        assert!(Move::NONE.is_none());
    }
}
