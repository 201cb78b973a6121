//! Pseudo-legal and legal move generation.
//!
//! Generation is pseudo-legal: king safety, pins and the pawn-drop-mate rule are
//! left to [`Position::is_legal`]. Promotion rules and the drop restrictions that
//! depend only on the board (occupied squares, dead squares, two pawns on a
//! file) are enforced here.

use crate::bitboard::{attacks_from, dead_end_squares, Bitboard, FILE_MASKS};
use crate::movelist::MoveList;
use crate::position::Position;
use crate::types::{Color, Move, PieceType, Square};

/// Which subset of pseudo-legal moves to produce. `Captures` and `Quiets`
/// partition `All`: a move is a capture exactly when its destination holds an
/// enemy piece, and every drop is quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    Captures,
    Quiets,
    All,
}

pub struct MoveGenerator<'a> {
    pos: &'a Position,
    us: Color,
}

impl<'a> MoveGenerator<'a> {
    pub fn new(pos: &'a Position) -> Self {
        Self {
            pos,
            us: pos.side_to_move(),
        }
    }

    /// Append pseudo-legal moves of the requested kind to `list`.
    pub fn generate(&self, gen: GenType, list: &mut MoveList) {
        let board = self.pos.board();
        let targets = match gen {
            GenType::Captures => board.pieces(!self.us),
            GenType::Quiets => !board.occupied(),
            GenType::All => !board.pieces(self.us),
        };
        self.board_moves(targets, list);
        if gen != GenType::Captures {
            self.drops(list);
        }
    }

    fn board_moves(&self, targets: Bitboard, list: &mut MoveList) {
        let board = self.pos.board();
        let occupied = board.occupied();
        for from in board.pieces(self.us) {
            let Some(piece) = board.piece_on(from) else {
                continue;
            };
            for to in attacks_from(piece, from, occupied) & targets {
                self.push_board_move(piece.piece_type, from, to, list);
            }
        }
    }

    #[inline]
    fn push_board_move(&self, pt: PieceType, from: Square, to: Square, list: &mut MoveList) {
        let us = self.us;
        if pt.is_promotable() && (from.in_promotion_zone(us) || to.in_promotion_zone(us)) {
            list.push(Move::new_normal(from, to, true));
            if !dead_end_squares(us, pt).contains(to) {
                list.push(Move::new_normal(from, to, false));
            }
        } else {
            list.push(Move::new_normal(from, to, false));
        }
    }

    fn drops(&self, list: &mut MoveList) {
        let hand = self.pos.hand(self.us);
        if hand.is_empty() {
            return;
        }
        let board = self.pos.board();
        let empty = !board.occupied();

        for pt in PieceType::HAND_KINDS {
            if !hand.has(pt) {
                continue;
            }
            let mut targets = empty & !dead_end_squares(self.us, pt);
            if pt == PieceType::Pawn {
                for pawn in board.pieces_of(self.us, PieceType::Pawn) {
                    targets &= !FILE_MASKS[pawn.file() as usize];
                }
            }
            for to in targets {
                list.push(Move::new_drop(pt, to));
            }
        }
    }
}

pub fn generate_pseudo_legal(pos: &Position, gen: GenType, list: &mut MoveList) {
    MoveGenerator::new(pos).generate(gen, list);
}

/// Every legal move for the side to move.
pub fn generate_legal(pos: &Position, list: &mut MoveList) {
    MoveGenerator::new(pos).generate(GenType::All, list);
    list.retain(|mv| pos.is_legal(mv));
}

/// Legal moves collected into a `Vec`, for callers outside the search.
pub fn legal_moves(pos: &Position) -> Vec<Move> {
    let mut list = MoveList::new();
    generate_legal(pos, &mut list);
    list.iter().collect()
}

pub fn has_legal_move(pos: &Position) -> bool {
    let mut list = MoveList::new();
    MoveGenerator::new(pos).generate(GenType::All, &mut list);
    let found = list.iter().any(|mv| pos.is_legal(mv));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::SFEN_STARTPOS;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    const MAX_MOVES_SFEN: &str = "R8/2K1S1SSk/4B4/9/9/9/9/9/1L1L1L3 b RBGSNLP3g3n17p 1";

    #[test]
    fn test_startpos_has_30_moves() {
        let pos = Position::from_sfen(SFEN_STARTPOS).unwrap();
        assert_eq!(legal_moves(&pos).len(), 30);
        let mut captures = MoveList::new();
        generate_pseudo_legal(&pos, GenType::Captures, &mut captures);
        assert!(captures.is_empty());
    }

    #[test]
    fn test_maximum_move_position() {
        let pos = Position::from_sfen(MAX_MOVES_SFEN).unwrap();
        assert_eq!(legal_moves(&pos).len(), 593);

        let mut pseudo = MoveList::new();
        generate_pseudo_legal(&pos, GenType::All, &mut pseudo);
        assert!(pseudo.len() >= 593 && pseudo.len() < crate::movelist::MAX_MOVES);
    }

    #[test]
    fn test_captures_and_quiets_partition_all() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pos = Position::startpos();
        for _ in 0..60 {
            let mut all = MoveList::new();
            let mut captures = MoveList::new();
            let mut quiets = MoveList::new();
            generate_pseudo_legal(&pos, GenType::All, &mut all);
            generate_pseudo_legal(&pos, GenType::Captures, &mut captures);
            generate_pseudo_legal(&pos, GenType::Quiets, &mut quiets);

            let all_set: HashSet<Move> = all.iter().collect();
            assert_eq!(all_set.len(), all.len(), "duplicate moves generated");
            let mut union: HashSet<Move> = captures.iter().collect();
            assert!(quiets.iter().all(|m| union.insert(m)), "captures and quiets overlap");
            assert_eq!(union, all_set);
            assert!(captures.iter().all(|m| pos.is_capture(m)));
            assert!(all.iter().all(|m| pos.is_pseudo_legal(m)));

            let legal = legal_moves(&pos);
            if legal.is_empty() {
                break;
            }
            pos.make_move(legal[rng.gen_range(0..legal.len())]);
        }
    }

    #[test]
    fn test_legal_moves_never_expose_king() {
        let mut rng = StdRng::seed_from_u64(1234);
        for _ in 0..10 {
            let mut pos = Position::startpos();
            for _ in 0..120 {
                let legal = legal_moves(&pos);
                assert_eq!(has_legal_move(&pos), !legal.is_empty());
                if legal.is_empty() {
                    break;
                }
                for &mv in &legal {
                    let us = pos.side_to_move();
                    pos.make_move(mv);
                    let king = pos.king_square(us);
                    assert!(
                        !pos.board().is_attacked_by(!us, king, pos.board().occupied()),
                        "{mv:?} leaves the king attacked in {}",
                        pos.to_sfen()
                    );
                    pos.unmake_move(mv);
                }
                pos.make_move(legal[rng.gen_range(0..legal.len())]);
            }
        }
    }

    #[test]
    fn test_double_check_allows_only_king_moves() {
        // Rook on 5a and bishop on 3c both check the king on 5e
        let pos = Position::from_sfen("k3r4/9/6b2/9/4K4/9/9/9/9 b G 1").unwrap();
        assert!(pos.checkers().more_than_one());
        let legal = legal_moves(&pos);
        assert!(!legal.is_empty());
        assert!(legal.iter().all(|m| !m.is_drop() && m.from() == pos.king_square(Color::Black)));
    }
}
