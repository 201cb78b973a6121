//! Protocol binary: speaks USI by default, or the UCI-style dialect with `--uci`.
//!
//! Usage:
//!   cargo run --release -- --hash 256 --threads 4
//!
//! Logs go to stderr (`RUST_LOG=debug` for search details); stdout carries
//! protocol output only.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::info;

use rust_shogi::engine::Engine;
use rust_shogi::notation::Dialect;
use rust_shogi::options::{
    EngineOptions, DEFAULT_HASH_MB, DEFAULT_MOVE_OVERHEAD_MS, DEFAULT_THREADS, MAX_HASH_MB, MAX_MOVE_OVERHEAD_MS,
    MAX_THREADS,
};
use rust_shogi::protocol::{Protocol, SharedWriter, ENGINE_NAME};

#[derive(Parser, Debug)]
#[command(name = "rust_shogi")]
#[command(about = "Shogi engine speaking USI (or UCI-style with --uci)")]
struct Args {
    /// Start in the UCI-style dialect instead of USI
    #[arg(long)]
    uci: bool,

    /// Transposition table size in MiB
    #[arg(long, default_value_t = DEFAULT_HASH_MB)]
    hash: usize,

    /// Search threads
    #[arg(short, long, default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// Milliseconds reserved per move for transport lag
    #[arg(long, default_value_t = DEFAULT_MOVE_OVERHEAD_MS)]
    move_overhead: u64,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let options = EngineOptions {
        hash_mb: args.hash.clamp(1, MAX_HASH_MB),
        threads: args.threads.clamp(1, MAX_THREADS),
        move_overhead_ms: args.move_overhead.min(MAX_MOVE_OVERHEAD_MS),
        ..EngineOptions::default()
    };
    let engine = Engine::with_options(options)?;
    let dialect = if args.uci { Dialect::Uci } else { Dialect::Usi };
    info!(
        "{ENGINE_NAME} ready ({dialect:?}, {} MiB hash, {} threads)",
        engine.hash_size_mb(),
        engine.thread_count()
    );

    let out: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut protocol = Protocol::new(engine, dialect, Arc::clone(&out));
    protocol.run(io::stdin().lock())?;

    if let Ok(mut stdout) = out.lock() {
        stdout.flush()?;
    }
    Ok(())
}
