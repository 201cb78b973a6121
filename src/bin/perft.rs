//! Perft runner
//!
//! Usage:
//!   cargo run --release --bin perft -- --depth 5
//!   cargo run --release --bin perft -- --sfen "<sfen>" --depth 3 --divide

use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::eyre;
use log::info;

use rust_shogi::notation::{format_move, Dialect};
use rust_shogi::perft::{expected_startpos_nodes, perft_divide, perft_parallel};
use rust_shogi::position::Position;

#[derive(Parser, Debug)]
#[command(name = "perft")]
#[command(about = "Count legal move tree leaves")]
struct Args {
    /// Position to count from; the initial position when omitted
    #[arg(long)]
    sfen: Option<String>,

    #[arg(short, long, default_value_t = 4)]
    depth: u32,

    /// Print the count below every root move
    #[arg(long)]
    divide: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut pos = match &args.sfen {
        Some(sfen) => Position::from_sfen(sfen)?,
        None => Position::startpos(),
    };
    info!("perft {} from {}", args.depth, pos.to_sfen());

    let start = Instant::now();
    let nodes = if args.divide {
        let divide = perft_divide(&mut pos, args.depth);
        for (mv, count) in &divide {
            println!("{}: {}", format_move(*mv, Dialect::Usi), count);
        }
        divide.iter().map(|&(_, count)| count).sum()
    } else {
        perft_parallel(&pos, args.depth)
    };
    let elapsed = start.elapsed();
    let nps = (nodes as f64 / elapsed.as_secs_f64().max(1e-6)) as u64;
    println!("Nodes: {nodes}");
    println!("Time:  {elapsed:?} ({nps} nps)");

    if args.sfen.is_none() {
        if let Some(expected) = expected_startpos_nodes(args.depth) {
            if expected != nodes {
                return Err(eyre!("expected {expected} nodes at depth {}, counted {nodes}", args.depth));
            }
            info!("Matches the reference count");
        }
    }
    Ok(())
}
