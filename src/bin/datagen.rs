//! Self-play training data generator
//!
//! Usage:
//!   cargo run --release --bin datagen -- --games 1000 --depth 6 --seed 42
//!
//! Writes `datagen_<timestamp>.bin` in the current directory unless `--output`
//! is given.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use log::info;

use rust_shogi::datagen::{default_output_name, generate_to_file, DatagenConfig};

#[derive(Parser, Debug)]
#[command(name = "datagen")]
#[command(about = "Generate self-play position records")]
struct Args {
    #[arg(short, long, default_value_t = 100)]
    games: usize,

    /// Fixed search depth for every move
    #[arg(short, long, default_value_t = 4)]
    depth: i32,

    /// Random plies played before recording
    #[arg(long, default_value_t = 8)]
    random_plies: usize,

    /// Game length after which a game is scored as a draw
    #[arg(long, default_value_t = 320)]
    max_plies: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Per-game hash size in MiB
    #[arg(long, default_value_t = 4)]
    hash: usize,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Score at which a game is adjudicated
    #[arg(long, default_value_t = 3000)]
    resign_score: i32,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = DatagenConfig {
        games: args.games,
        depth: args.depth.max(1),
        random_plies: args.random_plies,
        max_plies: args.max_plies,
        seed: args.seed,
        hash_mb: args.hash.max(1),
        resign_score: args.resign_score,
        threads: args.threads,
    };
    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(default_output_name(Local::now())));

    let start = Instant::now();
    let stats = generate_to_file(&config, &path)?;
    info!(
        "Done in {:.1}s: {} games, {} positions, +{} ={} -{}",
        start.elapsed().as_secs_f64(),
        stats.games,
        stats.positions,
        stats.black_wins,
        stats.draws,
        stats.white_wins
    );
    Ok(())
}
