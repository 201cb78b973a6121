//! Line-based command loop for the USI protocol and its UCI-style dialect.
//!
//! Example session:
//!   > usi
//!   < id name RustShogi
//!   < id author RustShogi developers
//!   < option name USI_Hash type spin default 16 min 1 max 65536
//!   < usiok
//!   > isready
//!   < readyok
//!   > position startpos moves 7g7f 3c3d
//!   > go btime 60000 wtime 60000 byoyomi 1000
//!   < info depth 1 seldepth 2 score cp 90 nodes 45 nps 45000 hashfull 0 time 1 pv 8h2b+
//!   < bestmove 8h2b+ ponder 3a2b
//!
//! Both dialects read the same SFEN position text. In the UCI-style dialect the
//! first player (Black) is "white", so `wtime`/`winc` belong to Black there.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::notation::{format_move, parse_move, Dialect};
use crate::options::EngineOptions;
use crate::perft::perft_divide;
use crate::search::{FinishCallback, InfoCallback, SearchInfo, SearchLimits, SearchOutcome};
use crate::types::Color;

pub const ENGINE_NAME: &str = "RustShogi";
pub const ENGINE_AUTHOR: &str = "RustShogi developers";

/// Output shared between the command loop and the search threads.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn emit(out: &SharedWriter, line: &str) -> io::Result<()> {
    let mut writer = out
        .lock()
        .map_err(|_| io::Error::other("protocol writer poisoned"))?;
    writeln!(writer, "{line}")?;
    writer.flush()
}

/// `bestmove <move> [ponder <move>]`; no legal move prints `resign` (USI) or `0000`.
pub fn format_bestmove(outcome: &SearchOutcome, dialect: Dialect) -> String {
    let mut line = format!("bestmove {}", format_move(outcome.best_move, dialect));
    if outcome.best_move.is_some() && outcome.ponder_move.is_some() {
        line.push_str(&format!(" ponder {}", format_move(outcome.ponder_move, dialect)));
    }
    line
}

pub struct Protocol {
    engine: Engine,
    dialect: Dialect,
    out: SharedWriter,
}

impl Protocol {
    pub fn new(engine: Engine, dialect: Dialect, out: SharedWriter) -> Self {
        Protocol { engine, dialect, out }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Read commands until `quit` or end of input.
    pub fn run<R: BufRead>(&mut self, input: R) -> EngineResult<()> {
        for line in input.lines() {
            let line = line?;
            if self.handle_line(&line)? == Flow::Quit {
                return Ok(());
            }
        }
        // Input closed: finish any running search so its bestmove is written.
        self.engine.stop();
        self.engine.wait();
        Ok(())
    }

    /// Execute one command. Malformed commands are logged and ignored; only
    /// output failures are returned as errors.
    pub fn handle_line(&mut self, line: &str) -> EngineResult<Flow> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };
        debug!("< {line}");

        match command {
            "usi" => self.handshake(Dialect::Usi)?,
            "uci" => self.handshake(Dialect::Uci)?,
            "isready" => self.send("readyok")?,
            "setoption" => self.set_option(args),
            "usinewgame" | "ucinewgame" => self.engine.new_game(),
            "position" => self.position(args),
            "go" => self.go(args),
            "stop" | "gameover" => {
                self.engine.stop();
                self.engine.wait();
            }
            "ponderhit" => self.engine.ponderhit(),
            "quit" => {
                self.engine.stop();
                self.engine.wait();
                return Ok(Flow::Quit);
            }
            "d" => {
                let text = self.engine.position().to_string();
                self.send(&text)?;
            }
            "perft" => self.perft(args)?,
            _ => warn!("Unknown command: {line}"),
        }
        Ok(Flow::Continue)
    }

    fn send(&self, line: &str) -> EngineResult<()> {
        emit(&self.out, line)?;
        Ok(())
    }

    fn handshake(&mut self, dialect: Dialect) -> EngineResult<()> {
        self.dialect = dialect;
        self.send(&format!("id name {ENGINE_NAME}"))?;
        self.send(&format!("id author {ENGINE_AUTHOR}"))?;
        for line in EngineOptions::describe(dialect) {
            self.send(&line)?;
        }
        self.send(match dialect {
            Dialect::Usi => "usiok",
            Dialect::Uci => "uciok",
        })
    }

    /// `setoption name <name...> [value <value...>]`
    fn set_option(&mut self, args: &[&str]) {
        let value_at = args.iter().position(|&t| t == "value");
        let name_tokens = match (args.first(), value_at) {
            (Some(&"name"), Some(v)) => &args[1..v],
            (Some(&"name"), None) => &args[1..],
            _ => {
                warn!("Malformed setoption: {}", args.join(" "));
                return;
            }
        };
        let name = name_tokens.join(" ");
        let value = value_at.map(|v| args[v + 1..].join(" ")).unwrap_or_default();
        match self.engine.set_option(&name, &value) {
            Ok(()) => info!("Option {name} set to {value}"),
            Err(err) => warn!("setoption rejected: {err}"),
        }
    }

    /// `position (startpos | sfen <board> <side> <hand> [ply]) [moves ...]`
    fn position(&mut self, args: &[&str]) {
        let moves_at = args.iter().position(|&t| t == "moves").unwrap_or(args.len());
        let (setup, moves) = (&args[..moves_at], args.get(moves_at + 1..).unwrap_or(&[]));
        let sfen = match setup.split_first() {
            Some((&"startpos", _)) => None,
            Some((&"sfen", fields)) => Some(fields.join(" ")),
            _ => {
                warn!("Malformed position command: {}", args.join(" "));
                return;
            }
        };
        if let Err(err) = self.engine.set_position(sfen.as_deref(), moves, self.dialect) {
            warn!("position rejected: {err}");
        }
    }

    fn go(&mut self, args: &[&str]) {
        let limits = match parse_go(args, self.dialect) {
            Ok(limits) => limits,
            Err(err) => {
                warn!("go rejected: {err}");
                return;
            }
        };

        let dialect = self.dialect;
        let info_out = Arc::clone(&self.out);
        let on_info: InfoCallback = Box::new(move |info: SearchInfo| {
            if let Err(err) = emit(&info_out, &info.to_protocol(dialect)) {
                warn!("Failed to write info: {err}");
            }
        });
        let finish_out = Arc::clone(&self.out);
        let on_finish: FinishCallback = Box::new(move |outcome: &SearchOutcome| {
            if let Err(err) = emit(&finish_out, &format_bestmove(outcome, dialect)) {
                warn!("Failed to write bestmove: {err}");
            }
        });

        if let Err(err) = self.engine.go(limits, Some(on_info), Some(on_finish)) {
            warn!("go rejected: {err}");
        }
    }

    /// `perft <depth>`: per-move counts, then the total.
    fn perft(&mut self, args: &[&str]) -> EngineResult<()> {
        let Some(depth) = args.first().and_then(|t| t.parse::<u32>().ok()) else {
            warn!("perft needs a depth");
            return Ok(());
        };
        let start = Instant::now();
        let mut pos = self.engine.position().clone();
        let divide = perft_divide(&mut pos, depth);
        let mut total = 0;
        for (mv, nodes) in &divide {
            self.send(&format!("{}: {}", format_move(*mv, self.dialect), nodes))?;
            total += nodes;
        }
        self.send("")?;
        self.send(&format!("Nodes searched: {total}"))?;
        info!("perft {depth}: {total} nodes in {:?}", start.elapsed());
        Ok(())
    }
}

/// Parse the arguments of `go`.
pub fn parse_go(args: &[&str], dialect: Dialect) -> EngineResult<SearchLimits> {
    fn number<T: std::str::FromStr>(name: &str, value: Option<&&str>) -> EngineResult<T> {
        value
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| EngineError::InvalidOptionValue {
                name: name.to_string(),
                value: value.map(|v| v.to_string()).unwrap_or_default(),
            })
    }

    // Which color the `b`/`w` prefixed clock fields belong to
    let (b_color, w_color) = match dialect {
        Dialect::Usi => (Color::Black, Color::White),
        Dialect::Uci => (Color::White, Color::Black),
    };

    let mut limits = SearchLimits::default();
    let mut iter = args.iter();
    while let Some(&token) = iter.next() {
        match token {
            "btime" => limits.time[b_color.index()] = Some(number(token, iter.next())?),
            "wtime" => limits.time[w_color.index()] = Some(number(token, iter.next())?),
            "binc" => limits.increment[b_color.index()] = number(token, iter.next())?,
            "winc" => limits.increment[w_color.index()] = number(token, iter.next())?,
            "byoyomi" => limits.byoyomi = number(token, iter.next())?,
            "movestogo" => limits.movestogo = Some(number(token, iter.next())?),
            "movetime" => limits.movetime = Some(number(token, iter.next())?),
            "depth" => limits.depth = Some(number(token, iter.next())?),
            "nodes" => limits.nodes = Some(number(token, iter.next())?),
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            "searchmoves" => {
                // Consumes the rest of the line
                for &text in iter.by_ref() {
                    limits.search_moves.push(parse_move(text, dialect)?);
                }
            }
            other => debug!("Ignoring go argument {other}"),
        }
    }
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::mate_in;
    use crate::types::Move;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_go_usi_clock() {
        let args = ["btime", "30000", "wtime", "20000", "byoyomi", "1000", "binc", "5"];
        let limits = parse_go(&args, Dialect::Usi).unwrap();
        assert_eq!(limits.time[Color::Black.index()], Some(30_000));
        assert_eq!(limits.time[Color::White.index()], Some(20_000));
        assert_eq!(limits.increment[Color::Black.index()], 5);
        assert_eq!(limits.byoyomi, 1000);
    }

    #[test]
    fn test_parse_go_uci_clock_belongs_to_first_player() {
        let limits = parse_go(&["wtime", "1000", "btime", "2000"], Dialect::Uci).unwrap();
        assert_eq!(limits.time[Color::Black.index()], Some(1000));
        assert_eq!(limits.time[Color::White.index()], Some(2000));
    }

    #[test]
    fn test_parse_go_flags_and_searchmoves() {
        let limits = parse_go(&["depth", "6", "infinite", "searchmoves", "7g7f", "P*5e"], Dialect::Usi).unwrap();
        assert_eq!(limits.depth, Some(6));
        assert!(limits.infinite);
        assert_eq!(limits.search_moves.len(), 2);
        assert!(parse_go(&["depth", "x"], Dialect::Usi).is_err());
        assert!(parse_go(&["nodes"], Dialect::Usi).is_err());
    }

    #[test]
    fn test_bestmove_formatting() {
        let outcome = SearchOutcome {
            best_move: parse_move("7g7f", Dialect::Usi).unwrap(),
            ponder_move: parse_move("3c3d", Dialect::Usi).unwrap(),
            score: mate_in(3),
            depth: 4,
            nodes: 10,
            pv: Vec::new(),
        };
        assert_eq!(format_bestmove(&outcome, Dialect::Usi), "bestmove 7g7f ponder 3c3d");
        assert_eq!(format_bestmove(&outcome, Dialect::Uci), "bestmove c3c4 ponder g7g6");

        let resign = SearchOutcome {
            best_move: Move::NONE,
            ponder_move: Move::NONE,
            ..outcome
        };
        assert_eq!(format_bestmove(&resign, Dialect::Usi), "bestmove resign");
        assert_eq!(format_bestmove(&resign, Dialect::Uci), "bestmove 0000");
    }
}
