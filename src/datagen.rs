//! Self-play data generation.
//!
//! Games start from the initial position, play a few random opening plies,
//! then continue with a fixed-depth single-threaded search for both sides.
//! Every searched position becomes a [`PositionRecord`] labelled with the
//! final result once the game is over. Games run in parallel on the rayon
//! pool and are written in index order, so a given seed always produces the
//! same file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::prelude::*;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::evaluate::MaterialEvaluator;
use crate::history::Histories;
use crate::movegen::legal_moves;
use crate::position::{Position, Repetition};
use crate::record::{GameResult, PositionRecord, RecordWriter};
use crate::search::{SearchControl, SearchJob, SearchLimits, Worker, MATE_IN_MAX_PLY};
use crate::threads::WORKER_STACK_SIZE;
use crate::tt::TranspositionTable;

#[derive(Debug, Clone)]
pub struct DatagenConfig {
    pub games: usize,
    pub depth: i32,
    /// Uniformly random plies played before recording starts
    pub random_plies: usize,
    /// Games still running at this ply are scored as draws
    pub max_plies: u32,
    pub seed: u64,
    /// Per-game transposition table size
    pub hash_mb: usize,
    /// Games are adjudicated once a search score reaches this bound
    pub resign_score: i32,
    /// Worker threads; 0 uses one per core
    pub threads: usize,
}

impl Default for DatagenConfig {
    fn default() -> Self {
        DatagenConfig {
            games: 100,
            depth: 4,
            random_plies: 8,
            max_plies: 320,
            seed: 0,
            hash_mb: 4,
            resign_score: 3_000,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatagenStats {
    pub games: u64,
    pub positions: u64,
    pub black_wins: u64,
    pub white_wins: u64,
    pub draws: u64,
}

impl DatagenStats {
    fn add_game(&mut self, records: &[PositionRecord]) {
        self.games += 1;
        self.positions += records.len() as u64;
        match records.first().map(|r| r.result) {
            Some(GameResult::BlackWin) => self.black_wins += 1,
            Some(GameResult::WhiteWin) => self.white_wins += 1,
            Some(GameResult::Draw) => self.draws += 1,
            Some(GameResult::Unknown) | None => {}
        }
    }
}

/// `datagen_<local timestamp>.bin`
pub fn default_output_name(now: DateTime<Local>) -> String {
    format!("datagen_{}.bin", now.format("%Y%m%d_%H%M%S"))
}

fn game_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add(index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Play game number `index` of the run described by `config`.
pub fn play_game(config: &DatagenConfig, index: usize) -> EngineResult<Vec<PositionRecord>> {
    let mut rng = StdRng::seed_from_u64(game_seed(config.seed, index));
    let tt = Arc::new(TranspositionTable::new(config.hash_mb)?);
    let mut eval = MaterialEvaluator::new();
    let mut hist = Histories::new();
    let limits = SearchLimits::with_depth(config.depth);

    let mut pos = Position::startpos();
    for _ in 0..config.random_plies {
        match legal_moves(&pos).choose(&mut rng) {
            Some(&mv) => pos.make_move(mv),
            None => break,
        }
    }

    let mut records = Vec::new();
    let result = loop {
        let us = pos.side_to_move();
        match pos.repetition() {
            Repetition::None => {}
            Repetition::Draw => break GameResult::Draw,
            Repetition::Win => break GameResult::win_for(us),
            Repetition::Loss => break GameResult::win_for(!us),
        }
        if pos.game_ply() >= config.max_plies {
            break GameResult::Draw;
        }
        let root_moves = legal_moves(&pos);
        if root_moves.is_empty() {
            break GameResult::win_for(!us);
        }

        let job = SearchJob {
            root: pos.clone(),
            root_moves,
            limits: limits.clone(),
            tt: Arc::clone(&tt),
            control: Arc::new(SearchControl::new(&limits, us, 0, 1)),
            on_info: None,
            on_finish: None,
        };
        tt.new_search();
        let outcome = Worker::new(0, &job, &mut eval, &mut hist).run();
        if outcome.best_move.is_none() {
            break GameResult::win_for(!us);
        }

        records.push(PositionRecord {
            position: pos.clone(),
            score: outcome.score.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            best_move: outcome.best_move,
            result: GameResult::Unknown,
        });
        if outcome.score >= config.resign_score.min(MATE_IN_MAX_PLY) {
            break GameResult::win_for(us);
        }
        if outcome.score <= -config.resign_score.min(MATE_IN_MAX_PLY) {
            break GameResult::win_for(!us);
        }
        pos.make_move(outcome.best_move);
    };

    debug!("game {index}: {:?} after {} records", result, records.len());
    for record in &mut records {
        record.result = result;
    }
    Ok(records)
}

/// Play `config.games` games and append them to `out`.
pub fn generate<W: Write + Send>(config: &DatagenConfig, out: W) -> EngineResult<DatagenStats> {
    // Same stack size as the search threads
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .stack_size(WORKER_STACK_SIZE)
        .thread_name(|i| format!("datagen-{i}"))
        .build()
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
    pool.install(|| generate_batches(config, out))
}

fn generate_batches<W: Write>(config: &DatagenConfig, out: W) -> EngineResult<DatagenStats> {
    let mut writer = RecordWriter::new(out);
    let mut stats = DatagenStats::default();
    let threads = rayon::current_num_threads();
    let batch = threads * 4;
    let start = Instant::now();

    info!(
        "Generating {} games at depth {} on {} threads (seed {})",
        config.games, config.depth, threads, config.seed
    );
    let mut next = 0;
    while next < config.games {
        let end = (next + batch).min(config.games);
        let games = (next..end)
            .into_par_iter()
            .map(|index| play_game(config, index))
            .collect::<EngineResult<Vec<_>>>()?;
        for records in &games {
            writer.write_game(records)?;
            stats.add_game(records);
        }
        next = end;

        let secs = start.elapsed().as_secs_f64().max(1e-3);
        info!(
            "{}/{} games, {} positions ({:.1} pos/s), +{} ={} -{}",
            stats.games,
            config.games,
            stats.positions,
            stats.positions as f64 / secs,
            stats.black_wins,
            stats.draws,
            stats.white_wins
        );
    }
    writer.flush()?;
    Ok(stats)
}

/// [`generate`] into a new file at `path`.
pub fn generate_to_file(config: &DatagenConfig, path: &Path) -> EngineResult<DatagenStats> {
    let file = File::create(path)?;
    let stats = generate(config, BufWriter::new(file))?;
    info!("Wrote {} positions to {}", stats.positions, path.display());
    Ok(stats)
}
