//! Perft reference counts from the initial position
//!
//! Run with: cargo test --release --test perft_tests -- --include-ignored

use pretty_assertions::assert_eq;

use rust_shogi::perft::{expected_startpos_nodes, perft, perft_divide, perft_parallel};
use rust_shogi::position::Position;

fn check_startpos(depth: u32) {
    let mut pos = Position::startpos();
    let expected = expected_startpos_nodes(depth).unwrap();
    assert_eq!(perft(&mut pos, depth), expected, "depth {depth}");
    assert_eq!(pos.to_sfen(), Position::startpos().to_sfen());
}

#[test]
fn test_perft_depth_1() {
    check_startpos(1);
}

#[test]
fn test_perft_depth_2() {
    check_startpos(2);
}

#[test]
fn test_perft_depth_3() {
    check_startpos(3);
}

#[test]
fn test_perft_depth_4_parallel() {
    let pos = Position::startpos();
    assert_eq!(perft_parallel(&pos, 4), 719_731);
}

#[test]
#[ignore = "slow outside release builds"]
fn test_perft_depth_5() {
    let pos = Position::startpos();
    assert_eq!(perft_parallel(&pos, 5), 19_861_490);
}

#[test]
fn test_divide_totals() {
    let mut pos = Position::startpos();
    let divide = perft_divide(&mut pos, 3);
    assert_eq!(divide.len(), 30);
    assert_eq!(divide.iter().map(|&(_, n)| n).sum::<u64>(), 25_470);
}

#[test]
fn test_perft_with_hands_is_consistent() {
    // Both sides hold pieces, so drops dominate the tree
    let sfen = "lnsgk2nl/1r4g2/p1ppppspp/1p7/7P1/2P6/PP1PPPP1P/1SG4R1/LN2KGSNL b Bb 13";
    let mut pos = Position::from_sfen(sfen).unwrap();
    let serial = perft(&mut pos, 3);
    assert_eq!(perft_parallel(&pos, 3), serial);
    let divide = perft_divide(&mut pos, 3);
    assert_eq!(divide.iter().map(|&(_, n)| n).sum::<u64>(), serial);
    assert_eq!(pos.to_sfen(), sfen);
}
