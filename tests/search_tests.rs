//! Engine-level search behavior and shared table stress

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;

use rust_shogi::engine::Engine;
use rust_shogi::movegen::legal_moves;
use rust_shogi::notation::{parse_move, Dialect};
use rust_shogi::options::EngineOptions;
use rust_shogi::position::Position;
use rust_shogi::search::SearchLimits;
use rust_shogi::tt::{TTFlag, TranspositionTable};
use rust_shogi::types::Move;

const MIDDLEGAME: &str = "ln1g3nl/1r3kg2/p2pppsp1/2ps2p1p/1p7/2P1P1PPP/PPSP1PS2/2GK3R1/LN3G1NL b Bb 31";

fn engine_with_threads(threads: usize) -> Engine {
    Engine::with_options(EngineOptions {
        threads,
        ..EngineOptions::default()
    })
    .unwrap()
}

#[test]
fn test_single_thread_search_is_deterministic() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let mut engine = engine_with_threads(1);
        engine.set_position(Some(MIDDLEGAME), &[], Dialect::Usi).unwrap();
        outcomes.push(engine.search_sync(SearchLimits::with_depth(5)).unwrap());
    }
    assert_eq!(outcomes[0].best_move, outcomes[1].best_move);
    assert_eq!(outcomes[0].score, outcomes[1].score);
    assert_eq!(outcomes[0].pv, outcomes[1].pv);
    assert_eq!(outcomes[0].nodes, outcomes[1].nodes);
}

#[test]
fn test_pv_is_a_legal_line() {
    let mut engine = engine_with_threads(1);
    engine.set_position(Some(MIDDLEGAME), &[], Dialect::Usi).unwrap();
    let outcome = engine.search_sync(SearchLimits::with_depth(6)).unwrap();
    assert_eq!(outcome.pv.first(), Some(&outcome.best_move));
    if outcome.pv.len() > 1 {
        assert_eq!(outcome.ponder_move, outcome.pv[1]);
    }

    let mut pos = Position::from_sfen(MIDDLEGAME).unwrap();
    for &mv in &outcome.pv {
        assert!(legal_moves(&pos).contains(&mv), "{mv:?} in {}", pos.to_sfen());
        pos.make_move(mv);
    }
}

#[test]
fn test_lazy_smp_returns_legal_move() {
    let mut engine = engine_with_threads(4);
    engine.set_position(Some(MIDDLEGAME), &[], Dialect::Usi).unwrap();
    let outcome = engine.search_sync(SearchLimits::with_depth(6)).unwrap();
    let root = Position::from_sfen(MIDDLEGAME).unwrap();
    assert!(legal_moves(&root).contains(&outcome.best_move));
    assert!(outcome.depth >= 6);

    // A second search on the same pool works too
    let again = engine.search_sync(SearchLimits::with_depth(3)).unwrap();
    assert!(legal_moves(&root).contains(&again.best_move));
}

#[test]
fn test_node_limit_is_respected() {
    let mut engine = engine_with_threads(2);
    engine.set_position(Some(MIDDLEGAME), &[], Dialect::Usi).unwrap();
    let outcome = engine.search_sync(SearchLimits::with_nodes(50_000)).unwrap();
    assert!(outcome.best_move.is_some());
    // Workers publish every 1024 nodes, so the overshoot is bounded
    assert!(outcome.nodes < 50_000 + 2 * 4096, "{} nodes", outcome.nodes);
}

#[test]
fn test_search_moves_restricts_root() {
    let mut engine = engine_with_threads(1);
    let only = parse_move("1g1f", Dialect::Usi).unwrap();
    let limits = SearchLimits {
        search_moves: vec![only],
        ..SearchLimits::with_depth(4)
    };
    assert_eq!(engine.search_sync(limits).unwrap().best_move, only);
}

#[test]
fn test_clocked_search_finishes_in_time() {
    let mut engine = engine_with_threads(2);
    let start = std::time::Instant::now();
    let limits = SearchLimits::with_time(engine.position().side_to_move(), 2_000, 0);
    let outcome = engine.search_sync(limits).unwrap();
    assert!(outcome.best_move.is_some());
    assert!(start.elapsed().as_millis() < 2_000);
}

/// The stored move and score are a pure function of the 16-bit key, so any
/// hit must read back exactly what some writer stored for that key.
#[test]
fn test_tt_concurrent_writers_never_tear() {
    fn payload(hash: u64) -> (Move, i32) {
        let key = hash as u16;
        (Move::from_raw(key | 0x80), (key % 2000) as i32 - 1000)
    }

    let tt = Arc::new(TranspositionTable::new(1).unwrap());
    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let tt = Arc::clone(&tt);
            thread::spawn(move || {
                let mut state = 0x2545_F491_4F6C_DD1D_u64 ^ t;
                for i in 0..200_000u64 {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let hash = state;
                    let (hit, data, writer) = tt.probe(hash);
                    if hit {
                        let (mv, score) = payload(hash);
                        assert_eq!((data.mv, data.score), (mv, score));
                    }
                    let (mv, score) = payload(hash);
                    writer.write(hash, score, i % 3 == 0, TTFlag::Exact, (i % 20) as i32, mv);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(tt.hashfull() > 900);
}
