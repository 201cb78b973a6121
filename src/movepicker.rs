//! MovePicker - staged move generation for the search.
//!
//! Stages:
//! 1. TT move (from transposition table) - most likely to cause cutoff
//! 2. Captures, ordered by victim value plus capture history
//! 3. Killer moves (quiet moves that caused cutoffs at this ply)
//! 4. Quiet moves and drops, ordered by butterfly/drop and continuation history
//!
//! Most nodes cut off on the first few moves, so quiets are only generated once
//! the captures are exhausted. Moves are returned by value and are only
//! pseudo-legal; the caller filters them with [`Position::is_legal`].

use crate::evaluate::piece_value;
use crate::history::{recent_moves, Histories, PieceTo};
use crate::movegen::{generate_pseudo_legal, GenType};
use crate::movelist::MoveList;
use crate::position::Position;
use crate::types::Move;

/// Generation stages
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    TTMove,
    GenerateCaptures,
    Captures,
    Killer1,
    Killer2,
    GenerateQuiets,
    Quiets,
    Done,
}

/// Weight of the victim's value relative to capture history
const MVV_MULTIPLIER: i32 = 8;

/// MovePicker: lives on the stack at each search node.
pub struct MovePicker {
    moves: MoveList,
    stage: Stage,
    current_idx: usize,
    tt_move: Move,
    killers: [Move; 2],
    recent: [Option<PieceTo>; 2],
    /// Stop after the capture stage (quiescence when not in check)
    captures_only: bool,
}

impl MovePicker {
    /// Picker for the main search.
    pub fn new(pos: &Position, tt_move: Move, killers: [Move; 2]) -> Self {
        Self {
            moves: MoveList::new(),
            stage: if tt_move.is_some() {
                Stage::TTMove
            } else {
                Stage::GenerateCaptures
            },
            current_idx: 0,
            tt_move,
            killers,
            recent: recent_moves(pos),
            captures_only: false,
        }
    }

    /// Picker for quiescence: captures only, or every move when in check so
    /// that a mated position is recognised.
    pub fn new_quiescence(pos: &Position, tt_move: Move) -> Self {
        let captures_only = !pos.in_check();
        let tt_move = if captures_only && tt_move.is_some() && !pos.is_capture(tt_move) {
            Move::NONE
        } else {
            tt_move
        };
        let mut picker = Self::new(pos, tt_move, [Move::NONE; 2]);
        picker.captures_only = captures_only;
        picker
    }

    /// Get the next move to try, or `None` when all moves have been returned.
    pub fn next_move(&mut self, pos: &Position, hist: &Histories) -> Option<Move> {
        loop {
            match self.stage {
                Stage::TTMove => {
                    self.stage = Stage::GenerateCaptures;
                    if pos.is_pseudo_legal(self.tt_move) {
                        return Some(self.tt_move);
                    }
                }

                Stage::GenerateCaptures => {
                    self.moves.clear();
                    generate_pseudo_legal(pos, GenType::Captures, &mut self.moves);
                    self.score_captures(pos, hist);
                    self.stage = Stage::Captures;
                    self.current_idx = 0;
                }

                Stage::Captures => {
                    while self.current_idx < self.moves.len() {
                        let mv = self.moves.pick_best(self.current_idx);
                        self.current_idx += 1;
                        if mv != self.tt_move {
                            return Some(mv);
                        }
                    }
                    self.stage = if self.captures_only {
                        Stage::Done
                    } else {
                        Stage::Killer1
                    };
                }

                Stage::Killer1 => {
                    self.stage = Stage::Killer2;
                    let killer = self.killers[0];
                    if self.is_usable_killer(pos, killer) {
                        return Some(killer);
                    }
                }

                Stage::Killer2 => {
                    self.stage = Stage::GenerateQuiets;
                    let killer = self.killers[1];
                    if killer != self.killers[0] && self.is_usable_killer(pos, killer) {
                        return Some(killer);
                    }
                }

                Stage::GenerateQuiets => {
                    self.moves.clear();
                    generate_pseudo_legal(pos, GenType::Quiets, &mut self.moves);
                    self.score_quiets(pos, hist);
                    self.stage = Stage::Quiets;
                    self.current_idx = 0;
                }

                Stage::Quiets => {
                    while self.current_idx < self.moves.len() {
                        let mv = self.moves.pick_best(self.current_idx);
                        self.current_idx += 1;
                        if mv != self.tt_move && mv != self.killers[0] && mv != self.killers[1] {
                            return Some(mv);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return None,
            }
        }
    }

    #[inline]
    fn is_usable_killer(&self, pos: &Position, killer: Move) -> bool {
        killer.is_some()
            && killer != self.tt_move
            && !pos.is_capture(killer)
            && pos.is_pseudo_legal(killer)
    }

    fn score_captures(&mut self, pos: &Position, hist: &Histories) {
        for i in 0..self.moves.len() {
            let mv = self.moves.get(i);
            let (Some(moved), Some(captured)) = (pos.moved_piece(mv), pos.captured_by(mv)) else {
                continue;
            };
            let mut score = MVV_MULTIPLIER * piece_value(captured.piece_type)
                + hist.capture(moved, mv.to(), captured.piece_type);
            if mv.is_promotion() {
                score += piece_value(moved.piece_type.promote()) - piece_value(moved.piece_type);
            }
            self.moves.set_score(i, score);
        }
    }

    fn score_quiets(&mut self, pos: &Position, hist: &Histories) {
        let us = pos.side_to_move();
        for i in 0..self.moves.len() {
            let mv = self.moves.get(i);
            let Some(moved) = pos.moved_piece(mv) else {
                continue;
            };
            let placed = if mv.is_promotion() {
                moved.piece_type.promote()
            } else {
                moved.piece_type
            };
            let score = hist.quiet_score(us, mv, placed, &self.recent);
            self.moves.set_score(i, score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::legal_moves;
    use crate::notation::{parse_move, Dialect};
    use std::collections::HashSet;

    fn drain(picker: &mut MovePicker, pos: &Position, hist: &Histories) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some(mv) = picker.next_move(pos, hist) {
            out.push(mv);
            assert!(out.len() <= 1024, "picker does not terminate");
        }
        out
    }

    #[test]
    fn test_movepicker_starting_position() {
        let pos = Position::startpos();
        let hist = Histories::new();
        let mut picker = MovePicker::new(&pos, Move::NONE, [Move::NONE; 2]);
        let moves = drain(&mut picker, &pos, &hist);
        let legal: Vec<Move> = moves.into_iter().filter(|&m| pos.is_legal(m)).collect();
        assert_eq!(legal.len(), 30);
    }

    #[test]
    fn test_tt_move_and_killers_come_first_without_duplicates() {
        let mut pos = Position::startpos();
        for text in ["7g7f", "3c3d"] {
            pos.make_move(parse_move(text, Dialect::Usi).unwrap());
        }
        let hist = Histories::new();
        let tt_move = parse_move("8h2b+", Dialect::Usi).unwrap();
        let killer = parse_move("2g2f", Dialect::Usi).unwrap();
        // A capture in a killer slot is skipped in the killer stage
        let capture_killer = parse_move("8h2b", Dialect::Usi).unwrap();
        let mut picker = MovePicker::new(&pos, tt_move, [killer, capture_killer]);
        let moves = drain(&mut picker, &pos, &hist);

        assert_eq!(moves[0], tt_move);
        assert_eq!(moves[1], capture_killer);
        assert_eq!(moves[2], killer);
        let unique: HashSet<Move> = moves.iter().copied().collect();
        assert_eq!(unique.len(), moves.len());

        let mut expected = legal_moves(&pos);
        let mut got: Vec<Move> = moves.into_iter().filter(|&m| pos.is_legal(m)).collect();
        expected.sort_by_key(|m| m.raw());
        got.sort_by_key(|m| m.raw());
        assert_eq!(got, expected);
    }

    #[test]
    fn test_bogus_tt_move_is_skipped() {
        let pos = Position::startpos();
        let hist = Histories::new();
        let bogus = parse_move("5e5d", Dialect::Usi).unwrap();
        let mut picker = MovePicker::new(&pos, bogus, [Move::NONE; 2]);
        assert!(drain(&mut picker, &pos, &hist).iter().all(|&m| m != bogus));
    }

    #[test]
    fn test_quiescence_captures_ordered_by_victim() {
        // The silver on 5e can take a rook on 5d or a pawn on 4d
        let pos = Position::from_sfen("4k4/9/9/4rp3/4S4/9/9/9/4K4 b - 1").unwrap();
        let hist = Histories::new();
        let mut picker = MovePicker::new_quiescence(&pos, Move::NONE);
        let moves = drain(&mut picker, &pos, &hist);
        assert!(!moves.is_empty());
        assert!(moves.iter().all(|&m| pos.is_capture(m)));
        assert_eq!(pos.captured_by(moves[0]).map(|p| p.piece_type), Some(crate::types::PieceType::Rook));
    }

    #[test]
    fn test_quiescence_in_check_returns_evasions() {
        let pos = Position::from_sfen("4k4/9/9/9/9/9/9/4r4/4K4 b G 1").unwrap();
        assert!(pos.in_check());
        let hist = Histories::new();
        let mut picker = MovePicker::new_quiescence(&pos, Move::NONE);
        let legal: Vec<Move> = drain(&mut picker, &pos, &hist)
            .into_iter()
            .filter(|&m| pos.is_legal(m))
            .collect();
        assert_eq!(legal.len(), legal_moves(&pos).len());
    }
}
