//! Position: the board plus side to move, game ply and a stack of per-ply state.
//!
//! Make/unmake never copies the board. Each make pushes a [`StateInfo`] that is
//! copied from its parent and then mutated; unmake moves the cursor back and
//! restores the board from the move and the captured piece recorded in the state.

use std::fmt;

use crate::bitboard::{self, Bitboard, FILE_MASKS};
use crate::board::Board;
use crate::error::SfenError;
use crate::types::{Color, Hand, Move, Piece, PieceType, Square};
use crate::zobrist::ZOBRIST_KEYS;

pub const SFEN_STARTPOS: &str = "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

/// Hand order used when writing SFEN.
const SFEN_HAND_ORDER: [PieceType; 7] = [
    PieceType::Rook,
    PieceType::Bishop,
    PieceType::Gold,
    PieceType::Silver,
    PieceType::Knight,
    PieceType::Lance,
    PieceType::Pawn,
];

/// Everything about a position that changes from ply to ply and is cheaper to
/// copy than to recompute on unmake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateInfo {
    pub hash: u64,
    pub hands: [Hand; Color::NUM],
    /// Enemy pieces attacking the side to move's king
    pub checkers: Bitboard,
    /// Pieces (either color) shielding each color's king from an enemy slider
    pub blockers_for_king: [Bitboard; Color::NUM],
    /// `pinners[c]`: sliders of color `c` pinning an enemy piece to the enemy king
    pub pinners: [Bitboard; Color::NUM],
    pub king_squares: [Square; Color::NUM],
    pub captured: Option<Piece>,
    pub last_move: Move,
    /// The piece standing on the destination of `last_move`
    pub moved_piece: Option<Piece>,
    /// Plies of unbroken checking by each color, grows by two per checking move
    pub continuous_check: [u32; Color::NUM],
    pub plies_from_null: u32,
}

impl StateInfo {
    fn new() -> Self {
        StateInfo {
            hash: 0,
            hands: [Hand::EMPTY; Color::NUM],
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; Color::NUM],
            pinners: [Bitboard::EMPTY; Color::NUM],
            king_squares: [Square::new(0, 0); Color::NUM],
            captured: None,
            last_move: Move::NONE,
            moved_piece: None,
            continuous_check: [0; Color::NUM],
            plies_from_null: 0,
        }
    }
}

/// Arena of state snapshots addressed by a cursor.
///
/// Slots above the cursor are kept allocated so the next `advance` reuses them.
#[derive(Clone, Debug)]
pub struct StateStack {
    states: Vec<StateInfo>,
    cursor: usize,
}

impl StateStack {
    fn new(root: StateInfo) -> Self {
        let mut states = Vec::with_capacity(256);
        states.push(root);
        StateStack { states, cursor: 0 }
    }

    #[inline(always)]
    pub fn current(&self) -> &StateInfo {
        &self.states[self.cursor]
    }

    #[inline(always)]
    fn current_mut(&mut self) -> &mut StateInfo {
        &mut self.states[self.cursor]
    }

    /// Push a copy of the current state and return it for mutation.
    #[inline]
    fn advance(&mut self) -> &mut StateInfo {
        let parent = self.states[self.cursor];
        self.cursor += 1;
        if self.cursor == self.states.len() {
            self.states.push(parent);
        } else {
            self.states[self.cursor] = parent;
        }
        &mut self.states[self.cursor]
    }

    #[inline]
    fn retreat(&mut self) {
        debug_assert!(self.cursor > 0, "retreat past the root state");
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// State `n` plies before the current one.
    #[inline]
    pub fn back(&self, n: usize) -> Option<&StateInfo> {
        self.cursor.checked_sub(n).map(|i| &self.states[i])
    }

    /// Number of plies played since the position was loaded.
    #[inline]
    pub fn depth(&self) -> usize {
        self.cursor
    }
}

/// Outcome of a repeated position, from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    None,
    Draw,
    /// The opponent checked on every move of the cycle
    Win,
    /// The side to move checked on every move of the cycle
    Loss,
}

#[derive(Clone)]
pub struct Position {
    board: Board,
    side_to_move: Color,
    /// Move number as written in SFEN, starting at 1
    game_ply: u32,
    states: StateStack,
}

impl Position {
    pub fn startpos() -> Position {
        Self::from_sfen(SFEN_STARTPOS).expect("the initial SFEN is valid")
    }

    /// Parse SFEN text (`<board> <b|w> <hand> [ply]`).
    pub fn from_sfen(sfen: &str) -> Result<Position, SfenError> {
        let fields: Vec<&str> = sfen.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(SfenError::MissingFields(fields.len()));
        }
        let board = parse_board(fields[0])?;
        let side_to_move = match fields[1] {
            "b" => Color::Black,
            "w" => Color::White,
            other => return Err(SfenError::SideToMove(other.to_string())),
        };
        let hands = parse_hands(fields[2])?;
        let game_ply = match fields.get(3) {
            Some(text) => text
                .parse::<u32>()
                .map_err(|_| SfenError::Ply(text.to_string()))?,
            None => 1,
        };
        Position::from_parts(board, side_to_move, hands, game_ply)
    }

    /// Build a position from its components, validating kings and check state.
    pub fn from_parts(
        board: Board,
        side_to_move: Color,
        hands: [Hand; Color::NUM],
        game_ply: u32,
    ) -> Result<Position, SfenError> {
        let mut root = StateInfo::new();
        for color in Color::ALL {
            let kings = board.pieces_of(color, PieceType::King);
            match kings.lsb() {
                Some(sq) if kings.count() == 1 => root.king_squares[color.index()] = sq,
                _ => return Err(SfenError::KingCount(color, kings.count() as usize)),
            }
        }
        root.hands = hands;

        let them_king = root.king_squares[(!side_to_move).index()];
        if board.is_attacked_by(side_to_move, them_king, board.occupied()) {
            return Err(SfenError::OpponentInCheck);
        }

        let mut pos = Position {
            board,
            side_to_move,
            game_ply,
            states: StateStack::new(root),
        };
        let hash = pos.compute_hash();
        pos.states.current_mut().hash = hash;
        pos.update_check_info();
        Ok(pos)
    }

    pub fn to_sfen(&self) -> String {
        let mut out = String::with_capacity(96);
        for rank in 0..9u8 {
            if rank > 0 {
                out.push('/');
            }
            let mut empty = 0;
            for file in (0..9u8).rev() {
                match self.board.piece_on(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        out.push_str(&piece.to_sfen());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
        }
        out.push(' ');
        out.push(match self.side_to_move {
            Color::Black => 'b',
            Color::White => 'w',
        });
        out.push(' ');
        out.push_str(&self.hand_sfen());
        out.push(' ');
        out.push_str(&self.game_ply.to_string());
        out
    }

    fn hand_sfen(&self) -> String {
        let mut out = String::new();
        for color in Color::ALL {
            let hand = self.hand(color);
            for pt in SFEN_HAND_ORDER {
                let n = hand.count(pt);
                if n == 0 {
                    continue;
                }
                if n > 1 {
                    out.push_str(&n.to_string());
                }
                let letter = pt.to_char();
                out.push(match color {
                    Color::Black => letter,
                    Color::White => letter.to_ascii_lowercase(),
                });
            }
        }
        if out.is_empty() {
            out.push('-');
        }
        out
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline(always)]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn game_ply(&self) -> u32 {
        self.game_ply
    }

    #[inline(always)]
    pub fn state(&self) -> &StateInfo {
        self.states.current()
    }

    #[inline(always)]
    pub fn states(&self) -> &StateStack {
        &self.states
    }

    #[inline(always)]
    pub fn hash(&self) -> u64 {
        self.states.current().hash
    }

    #[inline(always)]
    pub fn hand(&self, color: Color) -> Hand {
        self.states.current().hands[color.index()]
    }

    #[inline(always)]
    pub fn checkers(&self) -> Bitboard {
        self.states.current().checkers
    }

    #[inline(always)]
    pub fn in_check(&self) -> bool {
        self.states.current().checkers.is_nonempty()
    }

    #[inline(always)]
    pub fn king_square(&self, color: Color) -> Square {
        self.states.current().king_squares[color.index()]
    }

    #[inline(always)]
    pub fn blockers_for_king(&self, color: Color) -> Bitboard {
        self.states.current().blockers_for_king[color.index()]
    }

    #[inline(always)]
    pub fn pinners(&self, color: Color) -> Bitboard {
        self.states.current().pinners[color.index()]
    }

    #[inline(always)]
    pub fn last_move(&self) -> Move {
        self.states.current().last_move
    }

    #[inline(always)]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board.piece_on(sq)
    }

    /// The piece that `mv` picks up (or places, for drops).
    #[inline]
    pub fn moved_piece(&self, mv: Move) -> Option<Piece> {
        if mv.is_drop() {
            Some(Piece::new(self.side_to_move, mv.dropped_piece()))
        } else {
            self.board.piece_on(mv.from())
        }
    }

    /// The piece that `mv` captures, if any.
    #[inline]
    pub fn captured_by(&self, mv: Move) -> Option<Piece> {
        if mv.is_drop() {
            None
        } else {
            self.board.piece_on(mv.to())
        }
    }

    #[inline]
    pub fn is_capture(&self, mv: Move) -> bool {
        self.captured_by(mv).is_some()
    }

    // ------------------------------------------------------------------
    // Make / unmake
    // ------------------------------------------------------------------

    /// Play a pseudo-legal, legal move.
    pub fn make_move(&mut self, mv: Move) {
        debug_assert!(mv.is_ok());
        let keys = &*ZOBRIST_KEYS;
        let us = self.side_to_move;
        let ui = us.index();
        let to = mv.to();

        let st = self.states.advance();
        st.captured = None;
        st.last_move = mv;
        st.plies_from_null += 1;

        if mv.is_drop() {
            let pt = mv.dropped_piece();
            let count = st.hands[ui].count(pt);
            debug_assert!(count > 0, "drop of {pt:?} from an empty hand");
            st.hands[ui] = st.hands[ui].sub(pt);
            st.hash ^= keys.hand_key(us, pt, count) ^ keys.hand_key(us, pt, count.saturating_sub(1));
            let piece = Piece::new(us, pt);
            self.board.put_piece(piece, to);
            st.hash ^= keys.piece_key(piece, to);
            st.moved_piece = Some(piece);
        } else {
            let from = mv.from();
            if let Some(captured) = self.board.piece_on(to) {
                debug_assert!(captured.color != us && captured.piece_type != PieceType::King);
                self.board.remove_piece(to);
                st.hash ^= keys.piece_key(captured, to);
                let kind = captured.piece_type.demote();
                let count = st.hands[ui].count(kind);
                st.hands[ui] = st.hands[ui].add(kind);
                st.hash ^= keys.hand_key(us, kind, count) ^ keys.hand_key(us, kind, count + 1);
                st.captured = Some(captured);
            }

            let moving = self.board.remove_piece(from);
            debug_assert!(moving.is_some_and(|p| p.color == us), "no {us:?} piece on {from:?}");
            if let Some(piece) = moving {
                st.hash ^= keys.piece_key(piece, from);
                let placed = if mv.is_promotion() {
                    Piece::new(us, piece.piece_type.promote())
                } else {
                    piece
                };
                self.board.put_piece(placed, to);
                st.hash ^= keys.piece_key(placed, to);
                if placed.piece_type == PieceType::King {
                    st.king_squares[ui] = to;
                }
                st.moved_piece = Some(placed);
            }
        }

        st.hash ^= keys.side_to_move;
        self.side_to_move = !us;
        self.game_ply += 1;

        self.update_check_info();
        let st = self.states.current_mut();
        st.continuous_check[ui] = if st.checkers.is_nonempty() {
            st.continuous_check[ui] + 2
        } else {
            0
        };
    }

    /// Take back `mv`, which must be the last move made.
    pub fn unmake_move(&mut self, mv: Move) {
        debug_assert_eq!(self.states.current().last_move, mv);
        let captured = self.states.current().captured;
        self.side_to_move = !self.side_to_move;
        self.game_ply = self.game_ply.saturating_sub(1);

        let to = mv.to();
        if mv.is_drop() {
            self.board.remove_piece(to);
        } else {
            if let Some(piece) = self.board.remove_piece(to) {
                let original = if mv.is_promotion() {
                    Piece::new(piece.color, piece.piece_type.demote())
                } else {
                    piece
                };
                self.board.put_piece(original, mv.from());
            }
            if let Some(piece) = captured {
                self.board.put_piece(piece, to);
            }
        }
        self.states.retreat();
    }

    /// Pass the turn. Only valid when not in check.
    pub fn make_null_move(&mut self) {
        debug_assert!(!self.in_check());
        let us = self.side_to_move;
        let st = self.states.advance();
        st.captured = None;
        st.last_move = Move::NULL;
        st.moved_piece = None;
        st.plies_from_null = 0;
        st.continuous_check[us.index()] = 0;
        st.hash ^= ZOBRIST_KEYS.side_to_move;
        // The mover was not in check, so the opponent cannot be either.
        st.checkers = Bitboard::EMPTY;
        self.side_to_move = !us;
    }

    pub fn unmake_null_move(&mut self) {
        debug_assert_eq!(self.states.current().last_move, Move::NULL);
        self.side_to_move = !self.side_to_move;
        self.states.retreat();
    }

    fn update_check_info(&mut self) {
        let us = self.side_to_move;
        let board = &self.board;
        let st = self.states.current_mut();
        for color in Color::ALL {
            let (blockers, pinners) = board.slider_blockers(color, st.king_squares[color.index()]);
            st.blockers_for_king[color.index()] = blockers;
            st.pinners[(!color).index()] = pinners;
        }
        st.checkers = board.attackers_to_by(!us, st.king_squares[us.index()], board.occupied());
    }

    /// Hash recomputed from the board, hands and side to move.
    pub fn compute_hash(&self) -> u64 {
        let keys = &*ZOBRIST_KEYS;
        let mut hash = 0;
        for sq in self.board.occupied() {
            if let Some(piece) = self.board.piece_on(sq) {
                hash ^= keys.piece_key(piece, sq);
            }
        }
        for color in Color::ALL {
            hash ^= keys.full_hand_key(color, self.hand(color));
        }
        if self.side_to_move == Color::White {
            hash ^= keys.side_to_move;
        }
        hash
    }

    /// Look back through the game for an earlier occurrence of this position.
    ///
    /// Null moves break the chain: positions before the last null move are ignored.
    pub fn repetition(&self) -> Repetition {
        let st = self.states.current();
        let max_back = (st.plies_from_null as usize).min(self.states.depth());
        let us = self.side_to_move.index();
        let mut back = 4;
        while back <= max_back {
            if let Some(prev) = self.states.back(back) {
                if prev.hash == st.hash {
                    let span = back as u32;
                    if st.continuous_check[1 - us] >= span {
                        return Repetition::Win;
                    }
                    if st.continuous_check[us] >= span {
                        return Repetition::Loss;
                    }
                    return Repetition::Draw;
                }
            }
            back += 2;
        }
        Repetition::None
    }

    // ------------------------------------------------------------------
    // Legality
    // ------------------------------------------------------------------

    /// Whether `mv` could have been produced by move generation here. Used to
    /// validate moves from the transposition table and killer slots.
    pub fn is_pseudo_legal(&self, mv: Move) -> bool {
        if !mv.is_ok() {
            return false;
        }
        let us = self.side_to_move;
        let to = mv.to();
        if !to.is_on_board() {
            return false;
        }

        if mv.is_drop() {
            let pt = mv.dropped_piece();
            if pt.hand_index().is_none() || Move::new_drop(pt, to) != mv {
                return false;
            }
            if !self.hand(us).has(pt) || self.board.piece_on(to).is_some() {
                return false;
            }
            if bitboard::dead_end_squares(us, pt).contains(to) {
                return false;
            }
            return pt != PieceType::Pawn
                || (self.board.pieces_of(us, PieceType::Pawn) & FILE_MASKS[to.file() as usize])
                    .is_empty();
        }

        let from = mv.from();
        if !from.is_on_board() {
            return false;
        }
        let Some(piece) = self.board.piece_on(from) else {
            return false;
        };
        if piece.color != us || self.board.pieces(us).contains(to) {
            return false;
        }
        if !bitboard::attacks_from(piece, from, self.board.occupied()).contains(to) {
            return false;
        }
        if mv.is_promotion() {
            piece.piece_type.is_promotable()
                && (from.in_promotion_zone(us) || to.in_promotion_zone(us))
        } else {
            !bitboard::dead_end_squares(us, piece.piece_type).contains(to)
        }
    }

    /// Whether a pseudo-legal move leaves the mover's king safe and obeys the
    /// pawn-drop-mate rule.
    pub fn is_legal(&self, mv: Move) -> bool {
        let us = self.side_to_move;
        let st = self.states.current();
        let ksq = st.king_squares[us.index()];
        let to = mv.to();

        if mv.is_drop() {
            if st.checkers.is_nonempty() {
                if st.checkers.more_than_one() {
                    return false;
                }
                match st.checkers.lsb() {
                    Some(checker) if bitboard::between(checker, ksq).contains(to) => {}
                    _ => return false,
                }
            }
            if mv.dropped_piece() == PieceType::Pawn
                && bitboard::pawn_attacks(us, to).contains(st.king_squares[(!us).index()])
            {
                return !self.is_pawn_drop_mate(to);
            }
            return true;
        }

        let from = mv.from();
        if from == ksq {
            let occupied = self.board.occupied() ^ Bitboard::from_square(from);
            return !self.board.is_attacked_by(!us, to, occupied);
        }

        if st.checkers.is_nonempty() {
            if st.checkers.more_than_one() {
                return false;
            }
            match st.checkers.lsb() {
                Some(checker) if (bitboard::between(checker, ksq) | st.checkers).contains(to) => {}
                _ => return false,
            }
        }

        !st.blockers_for_king[us.index()].contains(from) || bitboard::line(from, ksq).contains(to)
    }

    /// Whether dropping a pawn on `to`, directly in front of the enemy king,
    /// would checkmate.
    fn is_pawn_drop_mate(&self, to: Square) -> bool {
        let us = self.side_to_move;
        let them = !us;
        let st = self.states.current();
        let their_king = st.king_squares[them.index()];
        let occupied = self.board.occupied() | Bitboard::from_square(to);

        let defenders = self.board.attackers_to_by(them, to, occupied)
            & !self.board.pieces_of(them, PieceType::King);
        for defender in defenders {
            if !st.blockers_for_king[them.index()].contains(defender)
                || bitboard::line(defender, their_king).contains(to)
            {
                return false;
            }
        }

        let without_king = occupied ^ Bitboard::from_square(their_king);
        let escapes = bitboard::king_attacks(their_king) & !self.board.pieces(them);
        for sq in escapes {
            if !self.board.is_attacked_by(us, sq, without_king) {
                return false;
            }
        }
        // The pawn checks from an adjacent square, so nothing can interpose.
        true
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hand_text = |color: Color| -> String {
            let hand = self.hand(color);
            let parts: Vec<String> = SFEN_HAND_ORDER
                .iter()
                .filter(|&&pt| hand.count(pt) > 0)
                .map(|&pt| format!("{}{}", pt.to_char(), hand.count(pt)))
                .collect();
            if parts.is_empty() {
                "-".to_string()
            } else {
                parts.join(" ")
            }
        };
        writeln!(f, "White hand: {}", hand_text(Color::White))?;
        writeln!(f, "{}", self.board)?;
        writeln!(f, "Black hand: {}", hand_text(Color::Black))?;
        writeln!(f, "Side to move: {}", self.side_to_move.to_human())?;
        writeln!(f, "Sfen: {}", self.to_sfen())?;
        write!(f, "Key: {:016X}", self.hash())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.to_sfen())
    }
}

fn parse_board(text: &str) -> Result<Board, SfenError> {
    let rows: Vec<&str> = text.split('/').collect();
    if rows.len() != 9 {
        return Err(SfenError::Board(format!("expected 9 ranks, found {}", rows.len())));
    }

    let mut board = Board::empty();
    for (rank, row) in rows.iter().enumerate() {
        let mut col = 0usize;
        let mut promoted = false;
        for c in row.chars() {
            if let Some(n) = c.to_digit(10) {
                if promoted || n == 0 {
                    return Err(SfenError::Board(format!("unexpected {c:?} in rank {row:?}")));
                }
                col += n as usize;
            } else if c == '+' {
                if promoted {
                    return Err(SfenError::Board(format!("double '+' in rank {row:?}")));
                }
                promoted = true;
                continue;
            } else {
                let (Some(color), Some(base)) = (Color::from_case(c), PieceType::from_char(c)) else {
                    return Err(SfenError::Board(format!("unknown piece {c:?}")));
                };
                let pt = if promoted {
                    if !base.is_promotable() {
                        return Err(SfenError::Board(format!("{c:?} cannot be promoted")));
                    }
                    base.promote()
                } else {
                    base
                };
                promoted = false;
                if col >= 9 {
                    return Err(SfenError::Board(format!("rank {row:?} is longer than 9 squares")));
                }
                let sq = Square::new((8 - col) as u8, rank as u8);
                if bitboard::dead_end_squares(color, pt).contains(sq) {
                    return Err(SfenError::Board(format!("{c:?} on {sq:?} can never move")));
                }
                board.put_piece(Piece::new(color, pt), sq);
                col += 1;
            }
            if col > 9 {
                return Err(SfenError::Board(format!("rank {row:?} is longer than 9 squares")));
            }
        }
        if promoted || col != 9 {
            return Err(SfenError::Board(format!("rank {row:?} does not cover 9 squares")));
        }
    }
    Ok(board)
}

fn parse_hands(text: &str) -> Result<[Hand; Color::NUM], SfenError> {
    let mut hands = [Hand::EMPTY; Color::NUM];
    if text == "-" {
        return Ok(hands);
    }

    let mut count: Option<u32> = None;
    for c in text.chars() {
        if let Some(d) = c.to_digit(10) {
            let n = count.unwrap_or(0) * 10 + d;
            if n > 18 {
                return Err(SfenError::Hand(format!("count too large in {text:?}")));
            }
            count = Some(n);
            continue;
        }
        let color = Color::from_case(c);
        let pt = PieceType::from_char(c);
        let (Some(color), Some(pt), Some(slot)) = (color, pt, pt.and_then(|p| p.hand_index())) else {
            return Err(SfenError::Hand(format!("{c:?} cannot be held in hand")));
        };
        let n = count.take().unwrap_or(1);
        let hand = hands[color.index()];
        let total = hand.count(pt) + n;
        if n == 0 || total > Hand::MAX_COUNTS[slot] {
            return Err(SfenError::Hand(format!("bad count {n} for {c:?}")));
        }
        hands[color.index()] = hand.set(pt, total);
    }
    if count.is_some() {
        return Err(SfenError::Hand(format!("trailing count in {text:?}")));
    }
    Ok(hands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::generate_legal;
    use crate::movelist::MoveList;
    use crate::notation::{format_move, parse_move, Dialect};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn legal_moves(pos: &Position) -> Vec<String> {
        let mut list = MoveList::new();
        generate_legal(pos, &mut list);
        list.iter().map(|m| format_move(m, Dialect::Usi)).collect()
    }

    #[test]
    fn test_sfen_round_trip() {
        let cases = [
            SFEN_STARTPOS,
            "lnsgkgsnl/1r5b1/ppppppppp/9/9/2P6/PP1PPPPPP/1B5R1/LNSGKGSNL w - 2",
            "8l/1l+R2P3/p2pBG1pp/kps1p4/Nn1P2G2/P1P1P2PP/1PS6/1KSG3+r1/LN2+p3L w Sbgn3p 124",
            "R8/2K1S1SSk/4B4/9/9/9/9/9/1L1L1L3 b RBGSNLP3g3n17p 1",
            "4k4/9/9/9/9/9/9/9/4K4 w 2P 10",
        ];
        for sfen in cases {
            let pos = Position::from_sfen(sfen).unwrap();
            assert_eq!(pos.to_sfen(), sfen);
        }
    }

    #[test]
    fn test_sfen_rejects_malformed_input() {
        assert!(matches!(Position::from_sfen("9/9/9 b -"), Err(SfenError::Board(_))));
        assert!(matches!(
            Position::from_sfen("4k4/9/9/9/9/9/9/9/9 b - 1"),
            Err(SfenError::KingCount(Color::Black, 0))
        ));
        assert!(matches!(
            Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 x - 1"),
            Err(SfenError::SideToMove(_))
        ));
        assert!(matches!(
            Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 b K 1"),
            Err(SfenError::Hand(_))
        ));
        assert!(matches!(
            Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 b 3R 1"),
            Err(SfenError::Hand(_))
        ));
        // Unpromoted black pawn on the far rank
        assert!(matches!(
            Position::from_sfen("P3k4/9/9/9/9/9/9/9/4K4 b - 1"),
            Err(SfenError::Board(_))
        ));
        assert!(matches!(
            Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 b - x"),
            Err(SfenError::Ply(_))
        ));
        // Black to move while the white king is already attacked
        assert!(matches!(
            Position::from_sfen("4k4/4R4/9/9/9/9/9/9/4K4 b - 1"),
            Err(SfenError::OpponentInCheck)
        ));
        assert!(matches!(Position::from_sfen("9/9"), Err(SfenError::MissingFields(1))));
    }

    #[test]
    fn test_make_unmake_restores_state() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut pos = Position::startpos();
            let mut played = Vec::new();
            let mut snapshots = Vec::new();
            for _ in 0..80 {
                let mut list = MoveList::new();
                generate_legal(&pos, &mut list);
                if list.is_empty() {
                    break;
                }
                let mv = list.get(rng.gen_range(0..list.len()));
                snapshots.push((pos.board().clone(), *pos.state(), pos.side_to_move()));
                pos.make_move(mv);
                assert!(pos.board().is_consistent());
                assert_eq!(pos.hash(), pos.compute_hash());
                played.push(mv);
            }
            while let Some(mv) = played.pop() {
                pos.unmake_move(mv);
                let (board, state, side) = snapshots.pop().unwrap();
                assert!(pos.board() == &board);
                assert_eq!(pos.state(), &state);
                assert_eq!(pos.side_to_move(), side);
            }
            assert_eq!(pos.to_sfen(), SFEN_STARTPOS);
        }
    }

    #[test]
    fn test_null_move_round_trip() {
        let mut pos = Position::startpos();
        let before = *pos.state();
        pos.make_null_move();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.hash(), pos.compute_hash());
        pos.unmake_null_move();
        assert_eq!(pos.state(), &before);
        assert_eq!(pos.side_to_move(), Color::Black);
    }

    #[test]
    fn test_pawn_drop_mate_is_illegal() {
        // Silver and knight box the king in, the gold guards 1b
        let pos = Position::from_sfen("7nk/7s1/8G/9/9/9/9/9/4K4 b P 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(!moves.contains(&"P*1b".to_string()));
        assert!(moves.contains(&"P*1d".to_string()));

        // Same net, the dropped pawn defended by a knight
        let pos = Position::from_sfen("7nk/7s1/9/7N1/9/9/9/9/4K4 b P 1").unwrap();
        assert!(!legal_moves(&pos).contains(&"P*1b".to_string()));
    }

    #[test]
    fn test_pawn_drop_check_with_escape_is_legal() {
        // The king can step to 2b
        let pos = Position::from_sfen("7nk/9/9/7N1/9/9/9/9/4K4 b P 1").unwrap();
        assert!(legal_moves(&pos).contains(&"P*1b".to_string()));
    }

    #[test]
    fn test_nifu_and_dead_squares() {
        let pos = Position::from_sfen("4k4/9/9/9/9/9/P8/9/4K4 b P 1").unwrap();
        let drops: Vec<String> = legal_moves(&pos)
            .into_iter()
            .filter(|m| m.starts_with("P*"))
            .collect();
        assert_eq!(drops.len(), 63);
        assert!(drops.iter().all(|m| !m.starts_with("P*9")));
        assert!(drops.iter().all(|m| !m.ends_with('a')));
    }

    #[test]
    fn test_forced_promotion() {
        let pos = Position::from_sfen("4k4/P8/9/9/9/9/9/9/4K4 b - 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(moves.contains(&"9b9a+".to_string()));
        assert!(!moves.contains(&"9b9a".to_string()));

        // A knight may not stop on either of the last two ranks unpromoted
        let pos = Position::from_sfen("4k4/9/9/N8/9/9/9/9/4K4 b - 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(moves.contains(&"9d8b+".to_string()));
        assert!(!moves.contains(&"9d8b".to_string()));

        // A silver keeps the choice
        let pos = Position::from_sfen("4k4/9/9/S8/9/9/9/9/4K4 b - 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(moves.contains(&"9d9c+".to_string()));
        assert!(moves.contains(&"9d9c".to_string()));
    }

    #[test]
    fn test_pinned_piece_stays_on_line() {
        // The silver on 5g is pinned by the lance on 5c
        let pos = Position::from_sfen("4k4/9/4l4/9/9/9/4S4/9/4K4 b - 1").unwrap();
        let moves = legal_moves(&pos);
        assert!(moves.contains(&"5g5f".to_string()));
        assert!(!moves.contains(&"5g4f".to_string()));
        assert!(!moves.contains(&"5g6h".to_string()));
    }

    #[test]
    fn test_check_evasions() {
        // Rook checks along the file, the king or an interposing drop must answer
        let pos = Position::from_sfen("4k4/9/4r4/9/9/9/9/9/4K4 b G 1").unwrap();
        assert!(pos.in_check());
        let moves = legal_moves(&pos);
        assert!(moves.contains(&"G*5h".to_string()));
        assert!(!moves.contains(&"G*4h".to_string()));
        assert!(moves.contains(&"5i4h".to_string()));
        assert!(!moves.contains(&"5i5h".to_string()));
    }

    #[test]
    fn test_repetition_detection() {
        let mut pos = Position::startpos();
        for text in ["5i4h", "5a4b", "4h5i", "4b5a"] {
            assert_eq!(pos.repetition(), Repetition::None);
            pos.make_move(parse_move(text, Dialect::Usi).unwrap());
        }
        assert_eq!(pos.repetition(), Repetition::Draw);
    }

    #[test]
    fn test_perpetual_check_loses() {
        // The rook checks on every move while the white king shuffles 1a-1b
        let mut pos = Position::from_sfen("8k/6R2/9/9/9/9/9/9/K8 b - 1").unwrap();
        for text in ["3b3a", "1a1b", "3a3b", "1b1a"] {
            let mv = parse_move(text, Dialect::Usi).unwrap();
            assert!(pos.is_pseudo_legal(mv) && pos.is_legal(mv), "{text}");
            pos.make_move(mv);
        }
        assert_eq!(pos.repetition(), Repetition::Loss);

        pos.make_move(parse_move("3b3a", Dialect::Usi).unwrap());
        assert!(pos.in_check());
        assert_eq!(pos.repetition(), Repetition::Win);
    }
}
