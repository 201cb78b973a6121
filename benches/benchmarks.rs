use criterion::{black_box, criterion_group, criterion_main, Criterion, SamplingMode};
use rust_shogi::engine::Engine;
use rust_shogi::evaluate::{Evaluator, MaterialEvaluator};
use rust_shogi::movegen::{generate_legal, generate_pseudo_legal, GenType};
use rust_shogi::movelist::MoveList;
use rust_shogi::notation::Dialect;
use rust_shogi::perft::perft;
use rust_shogi::position::Position;
use rust_shogi::search::SearchLimits;

const MIDDLEGAME: &str = "ln1g3nl/1r3kg2/p2pppsp1/2ps2p1p/1p7/2P1P1PPP/PPSP1PS2/2GK3R1/LN3G1NL b Bb 31";
/// Lots of pieces in hand, so drop generation dominates
const DROPS: &str = "8l/1l+R2P3/p2pBG1pp/kps1p4/Nn1P2G2/P1P1P2PP/1PS6/1KSG3+r1/LN2+p3L w Sbgn3p 124";

pub fn bench_legal_moves_from_start(c: &mut Criterion) {
    let pos = Position::startpos();
    c.bench_function("legal moves from start", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            generate_legal(black_box(&pos), &mut list);
            list.len()
        })
    });
}

pub fn bench_legal_moves_middlegame(c: &mut Criterion) {
    let pos = Position::from_sfen(MIDDLEGAME).unwrap();
    c.bench_function("legal moves middlegame", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            generate_legal(black_box(&pos), &mut list);
            list.len()
        })
    });
}

pub fn bench_pseudo_legal_drops(c: &mut Criterion) {
    let pos = Position::from_sfen(DROPS).unwrap();
    c.bench_function("pseudo-legal moves with full hands", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            generate_pseudo_legal(black_box(&pos), GenType::All, &mut list);
            list.len()
        })
    });
}

pub fn bench_evaluate_middlegame(c: &mut Criterion) {
    let pos = Position::from_sfen(MIDDLEGAME).unwrap();
    let mut eval = MaterialEvaluator::new();
    eval.reset(&pos);
    c.bench_function("evaluate middlegame", |b| b.iter(|| eval.evaluate(black_box(&pos))));
}

pub fn bench_perft_3(c: &mut Criterion) {
    let mut group = c.benchmark_group("perft");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    let mut pos = Position::startpos();
    group.bench_function("perft 3 from start", |b| b.iter(|| perft(black_box(&mut pos), 3)));
    group.finish();
}

pub fn bench_search_depth_6(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    let mut engine = Engine::new().unwrap();
    group.bench_function("search middlegame 6 ply", |b| {
        b.iter(|| {
            engine.new_game();
            engine.set_position(Some(MIDDLEGAME), &[], Dialect::Usi).unwrap();
            engine.search_sync(SearchLimits::with_depth(black_box(6))).unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_legal_moves_from_start,
    bench_legal_moves_middlegame,
    bench_pseudo_legal_drops,
    bench_evaluate_middlegame,
    bench_perft_3,
    bench_search_depth_6,
);
criterion_main!(benches);
