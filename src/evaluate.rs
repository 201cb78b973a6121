//! Position evaluation.
//!
//! The search talks to the evaluator only through the [`Evaluator`] trait. The
//! search calls `notify_move` before every make (including null moves) and
//! `notify_unmove` after every unmake, so an implementation can keep per-ply
//! state in step with the position's state stack.

use crate::position::Position;
use crate::types::{Color, Move, PieceType};

/// Scores are bounded well inside the mate range.
pub const MAX_EVAL: i32 = 20_000;

/// Material value by [`PieceType::index`]
pub const PIECE_VALUES: [i32; PieceType::NUM] = [
    90,   // Pawn
    315,  // Lance
    405,  // Knight
    495,  // Silver
    855,  // Bishop
    990,  // Rook
    540,  // ProPawn
    540,  // ProLance
    540,  // ProKnight
    540,  // ProSilver
    945,  // Horse
    1395, // Dragon
    540,  // Gold
    0,    // King
];

#[inline(always)]
pub fn piece_value(pt: PieceType) -> i32 {
    PIECE_VALUES[pt.index()]
}

/// Change in the mover's material caused by `mv`, counting pieces in hand at
/// their unpromoted value.
pub fn material_delta(pos: &Position, mv: Move) -> i32 {
    if !mv.is_ok() || mv.is_drop() {
        return 0;
    }
    let mut delta = 0;
    if let Some(captured) = pos.captured_by(mv) {
        delta += piece_value(captured.piece_type) + piece_value(captured.piece_type.demote());
    }
    if mv.is_promotion() {
        if let Some(piece) = pos.moved_piece(mv) {
            delta += piece_value(piece.piece_type.promote()) - piece_value(piece.piece_type);
        }
    }
    delta
}

pub trait Evaluator: Send {
    /// Score of `pos` from the side to move's point of view.
    fn evaluate(&self, pos: &Position) -> i32;

    /// `mv` is about to be made on `pos`. `Move::NULL` announces a null move.
    fn notify_move(&mut self, pos: &Position, mv: Move);

    /// The last notified move has been taken back.
    fn notify_unmove(&mut self);

    /// Drop all incremental state and resynchronize with `pos`.
    fn reset(&mut self, pos: &Position);

    fn box_clone(&self) -> Box<dyn Evaluator>;
}

impl Clone for Box<dyn Evaluator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Material balance kept incrementally on a stack, one entry per ply.
#[derive(Clone, Debug, Default)]
pub struct MaterialEvaluator {
    /// Balance from Black's point of view
    stack: Vec<i32>,
}

impl MaterialEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Black-minus-White material, computed from scratch.
    pub fn material_balance(pos: &Position) -> i32 {
        let board = pos.board();
        let mut balance = 0;
        for sq in board.occupied() {
            if let Some(piece) = board.piece_on(sq) {
                let value = piece_value(piece.piece_type);
                balance += if piece.color == Color::Black { value } else { -value };
            }
        }
        for pt in PieceType::HAND_KINDS {
            let diff = pos.hand(Color::Black).count(pt) as i32 - pos.hand(Color::White).count(pt) as i32;
            balance += diff * piece_value(pt);
        }
        balance
    }

    fn current_balance(&self, pos: &Position) -> i32 {
        match self.stack.last() {
            Some(&balance) => balance,
            None => Self::material_balance(pos),
        }
    }
}

impl Evaluator for MaterialEvaluator {
    fn evaluate(&self, pos: &Position) -> i32 {
        let balance = self.current_balance(pos);
        let score = match pos.side_to_move() {
            Color::Black => balance,
            Color::White => -balance,
        };
        score.clamp(-MAX_EVAL, MAX_EVAL)
    }

    fn notify_move(&mut self, pos: &Position, mv: Move) {
        let balance = self.current_balance(pos);
        let delta = material_delta(pos, mv);
        let next = match pos.side_to_move() {
            Color::Black => balance + delta,
            Color::White => balance - delta,
        };
        if self.stack.is_empty() {
            self.stack.push(balance);
        }
        self.stack.push(next);
    }

    fn notify_unmove(&mut self) {
        debug_assert!(self.stack.len() > 1, "unmove without a matching move");
        self.stack.pop();
    }

    fn reset(&mut self, pos: &Position) {
        self.stack.clear();
        self.stack.push(Self::material_balance(pos));
    }

    fn box_clone(&self) -> Box<dyn Evaluator> {
        Box::new(self.clone())
    }
}
