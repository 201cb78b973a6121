//! Random playout properties of move generation and make/unmake

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use rust_shogi::movegen::{generate_pseudo_legal, has_legal_move, legal_moves, GenType};
use rust_shogi::movelist::MoveList;
use rust_shogi::notation::{format_move, parse_move, Dialect};
use rust_shogi::position::Position;
use rust_shogi::types::{Color, Move, PieceType};

const GAMES: u64 = 20;
const MAX_PLIES: usize = 200;

/// Play random legal games, calling `check` before every move.
fn random_playouts(seed: u64, mut check: impl FnMut(&mut Position, &[Move])) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..GAMES {
        let mut pos = Position::startpos();
        for _ in 0..MAX_PLIES {
            let legal = legal_moves(&pos);
            check(&mut pos, &legal);
            match legal.choose(&mut rng) {
                Some(&mv) => pos.make_move(mv),
                None => break,
            }
        }
    }
}

#[test]
fn test_make_unmake_restores_everything() {
    random_playouts(1, |pos, legal| {
        let sfen = pos.to_sfen();
        let hash = pos.hash();
        for &mv in legal {
            pos.make_move(mv);
            assert_eq!(pos.hash(), pos.compute_hash(), "incremental hash after {mv:?}");
            pos.unmake_move(mv);
            assert_eq!(pos.hash(), hash);
        }
        assert_eq!(pos.to_sfen(), sfen);
    });
}

#[test]
fn test_null_move_round_trip() {
    random_playouts(2, |pos, _| {
        if pos.in_check() {
            return;
        }
        let sfen = pos.to_sfen();
        let hash = pos.hash();
        pos.make_null_move();
        assert_ne!(pos.hash(), hash);
        assert_eq!(pos.hash(), pos.compute_hash());
        pos.unmake_null_move();
        assert_eq!(pos.hash(), hash);
        assert_eq!(pos.to_sfen(), sfen);
    });
}

#[test]
fn test_sfen_round_trip_along_games() {
    random_playouts(3, |pos, _| {
        let sfen = pos.to_sfen();
        let reloaded = Position::from_sfen(&sfen).unwrap();
        assert_eq!(reloaded.to_sfen(), sfen);
        assert_eq!(reloaded.hash(), pos.hash());
        assert_eq!(reloaded.in_check(), pos.in_check());
    });
}

#[test]
fn test_legal_moves_are_generated_and_accepted() {
    random_playouts(4, |pos, legal| {
        let mut pseudo = MoveList::new();
        generate_pseudo_legal(pos, GenType::All, &mut pseudo);
        let pseudo: HashSet<Move> = pseudo.iter().collect();
        let legal_set: HashSet<Move> = legal.iter().copied().collect();
        assert_eq!(legal_set.len(), legal.len(), "duplicates in {}", pos.to_sfen());
        assert!(legal_set.is_subset(&pseudo));
        assert_eq!(has_legal_move(pos), !legal.is_empty());
        for &mv in legal {
            assert!(pos.is_pseudo_legal(mv) && pos.is_legal(mv), "{mv:?} in {}", pos.to_sfen());
            for dialect in [Dialect::Usi, Dialect::Uci] {
                assert_eq!(parse_move(&format_move(mv, dialect), dialect).unwrap(), mv);
            }
        }
    });
}

#[test]
fn test_no_move_leaves_own_king_attacked() {
    random_playouts(5, |pos, legal| {
        let us = pos.side_to_move();
        for &mv in legal {
            pos.make_move(mv);
            let board = pos.board();
            assert!(!board.is_attacked_by(!us, pos.king_square(us), board.occupied()));
            pos.unmake_move(mv);
        }
    });
}

#[test]
fn test_no_two_pawns_on_a_file() {
    random_playouts(6, |pos, legal| {
        let us = pos.side_to_move();
        for &mv in legal.iter().filter(|m| m.is_drop() && m.dropped_piece() == PieceType::Pawn) {
            let file = mv.to().file();
            let pawns = pos.board().pieces_of(us, PieceType::Pawn);
            assert!(pawns.into_iter().all(|sq| sq.file() != file), "nifu {mv:?} in {}", pos.to_sfen());
        }
    });
}

#[test]
fn test_pawn_drop_mate_is_illegal() {
    // The king is boxed in by its own knights and pawns and the gold guards 5b
    let pos = Position::from_sfen("3nkn3/3p1p3/4G4/9/9/9/9/9/4K4 b P 1").unwrap();
    let legal = legal_moves(&pos);
    assert!(!legal.contains(&parse_move("P*5b", Dialect::Usi).unwrap()));
    assert!(legal.contains(&parse_move("P*5d", Dialect::Usi).unwrap()));
    assert_eq!(pos.side_to_move(), Color::Black);
}
