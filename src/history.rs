//! Per-thread move ordering statistics.
//!
//! Every table holds `i16` entries updated with a gravity formula that keeps
//! values inside `[-HISTORY_MAX, HISTORY_MAX]` without periodic rescaling.

use crate::position::{Position, StateInfo};
use crate::types::{Color, Move, Piece, PieceType, Square};

pub const HISTORY_MAX: i32 = 16384;
/// Killer slots exist for plies `0..MAX_KILLER_PLY`.
pub const MAX_KILLER_PLY: usize = 256;

const SQUARES: usize = Square::NUM;
const BUTTERFLY_SIZE: usize = Color::NUM * SQUARES * SQUARES;
const DROP_SIZE: usize = Color::NUM * PieceType::HAND_KINDS.len() * SQUARES;
const CAPTURE_SIZE: usize = Piece::NUM * SQUARES * PieceType::NUM;
const CONT_ROWS: usize = Piece::NUM * SQUARES;
/// The mover's color is implied by the row, so columns only need the kind.
const CONT_COLS: usize = PieceType::NUM * SQUARES;

/// A piece and the square it just moved to; selects a continuation history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceTo {
    pub piece: Piece,
    pub to: Square,
}

impl PieceTo {
    #[inline(always)]
    fn row(self) -> usize {
        self.piece.index() * SQUARES + self.to.index()
    }

    fn from_state(st: &StateInfo) -> Option<PieceTo> {
        if !st.last_move.is_ok() {
            return None;
        }
        st.moved_piece.map(|piece| PieceTo {
            piece,
            to: st.last_move.to(),
        })
    }
}

/// The last two moves leading to `pos`, most recent first.
pub fn recent_moves(pos: &Position) -> [Option<PieceTo>; 2] {
    [
        PieceTo::from_state(pos.state()),
        pos.states().back(1).and_then(PieceTo::from_state),
    ]
}

#[inline(always)]
fn apply_gravity(entry: &mut i16, bonus: i32) {
    let bonus = bonus.clamp(-HISTORY_MAX, HISTORY_MAX);
    let value = *entry as i32;
    *entry = (value + bonus - value * bonus.abs() / HISTORY_MAX) as i16;
}

/// Bonus for a move that caused a cutoff at `depth`.
#[inline]
pub fn stat_bonus(depth: i32) -> i32 {
    (depth * depth * 16 + depth * 32).min(1600)
}

pub struct Histories {
    butterfly: Vec<i16>,
    drops: Vec<i16>,
    captures: Vec<i16>,
    continuation: Vec<i16>,
    killers: Vec<[Move; 2]>,
}

impl Histories {
    pub fn new() -> Self {
        Histories {
            butterfly: vec![0; BUTTERFLY_SIZE],
            drops: vec![0; DROP_SIZE],
            captures: vec![0; CAPTURE_SIZE],
            continuation: vec![0; CONT_ROWS * CONT_COLS],
            killers: vec![[Move::NONE; 2]; MAX_KILLER_PLY],
        }
    }

    /// Forget everything. Called between games.
    pub fn clear(&mut self) {
        self.butterfly.fill(0);
        self.drops.fill(0);
        self.captures.fill(0);
        self.continuation.fill(0);
        self.clear_killers();
    }

    pub fn clear_killers(&mut self) {
        self.killers.fill([Move::NONE; 2]);
    }

    #[inline(always)]
    fn quiet_index(color: Color, mv: Move) -> (bool, usize) {
        let to = mv.to().index();
        if mv.is_drop() {
            let kind = mv.dropped_piece().hand_index().unwrap_or(0);
            let idx = (color.index() * PieceType::HAND_KINDS.len() + kind) * SQUARES + to;
            (true, idx)
        } else {
            (false, (color.index() * SQUARES + mv.from().index()) * SQUARES + to)
        }
    }

    /// Butterfly score for board moves, drop score for drops.
    #[inline]
    pub fn quiet(&self, color: Color, mv: Move) -> i32 {
        match Self::quiet_index(color, mv) {
            (true, idx) => self.drops[idx] as i32,
            (false, idx) => self.butterfly[idx] as i32,
        }
    }

    pub fn update_quiet(&mut self, color: Color, mv: Move, bonus: i32) {
        match Self::quiet_index(color, mv) {
            (true, idx) => apply_gravity(&mut self.drops[idx], bonus),
            (false, idx) => apply_gravity(&mut self.butterfly[idx], bonus),
        }
    }

    #[inline(always)]
    fn capture_index(moved: Piece, to: Square, captured: PieceType) -> usize {
        (moved.index() * SQUARES + to.index()) * PieceType::NUM + captured.index()
    }

    #[inline]
    pub fn capture(&self, moved: Piece, to: Square, captured: PieceType) -> i32 {
        self.captures[Self::capture_index(moved, to, captured)] as i32
    }

    pub fn update_capture(&mut self, moved: Piece, to: Square, captured: PieceType, bonus: i32) {
        apply_gravity(&mut self.captures[Self::capture_index(moved, to, captured)], bonus);
    }

    #[inline(always)]
    fn continuation_index(prev: PieceTo, moved: PieceType, to: Square) -> usize {
        prev.row() * CONT_COLS + moved.index() * SQUARES + to.index()
    }

    #[inline]
    pub fn continuation(&self, prev: PieceTo, moved: PieceType, to: Square) -> i32 {
        self.continuation[Self::continuation_index(prev, moved, to)] as i32
    }

    pub fn update_continuation(&mut self, prev: PieceTo, moved: PieceType, to: Square, bonus: i32) {
        apply_gravity(
            &mut self.continuation[Self::continuation_index(prev, moved, to)],
            bonus,
        );
    }

    /// Combined ordering score of a quiet move or drop.
    pub fn quiet_score(&self, color: Color, mv: Move, moved: PieceType, recent: &[Option<PieceTo>; 2]) -> i32 {
        let mut score = 2 * self.quiet(color, mv);
        for prev in recent.iter().flatten() {
            score += self.continuation(*prev, moved, mv.to());
        }
        score
    }

    /// Reward `best` and penalize the quiets tried before it.
    pub fn update_quiet_stats(
        &mut self,
        color: Color,
        best: (Move, PieceType),
        tried: &[(Move, PieceType)],
        recent: &[Option<PieceTo>; 2],
        bonus: i32,
    ) {
        let update = |this: &mut Self, (mv, moved): (Move, PieceType), bonus: i32| {
            this.update_quiet(color, mv, bonus);
            for prev in recent.iter().flatten() {
                this.update_continuation(*prev, moved, mv.to(), bonus);
            }
        };
        update(self, best, bonus);
        for &entry in tried {
            if entry.0 != best.0 {
                update(self, entry, -bonus);
            }
        }
    }

    #[inline]
    pub fn killers(&self, ply: usize) -> [Move; 2] {
        self.killers.get(ply).copied().unwrap_or([Move::NONE; 2])
    }

    /// Store a killer at `ply`; the previous first killer moves to the second slot.
    pub fn store_killer(&mut self, ply: usize, mv: Move) {
        if let Some(slot) = self.killers.get_mut(ply) {
            if slot[0] != mv {
                slot[1] = slot[0];
                slot[0] = mv;
            }
        }
    }

    /// Forget the killers of `ply` before its nodes are searched.
    pub fn reset_killers_at(&mut self, ply: usize) {
        if let Some(slot) = self.killers.get_mut(ply) {
            *slot = [Move::NONE; 2];
        }
    }
}

impl Default for Histories {
    fn default() -> Self {
        Self::new()
    }
}
