//! Engine configuration set through `setoption`.

use log::warn;

use crate::error::EngineError;
use crate::notation::Dialect;

pub const DEFAULT_HASH_MB: usize = 16;
pub const MAX_HASH_MB: usize = 65_536;
pub const DEFAULT_THREADS: usize = 1;
pub const MAX_THREADS: usize = 256;
pub const DEFAULT_MOVE_OVERHEAD_MS: u64 = 10;
pub const MAX_MOVE_OVERHEAD_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub hash_mb: usize,
    pub threads: usize,
    /// Subtracted from every time budget to cover GUI and transport lag
    pub move_overhead_ms: u64,
    /// Whether the GUI may send `go ponder`
    pub ponder: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            hash_mb: DEFAULT_HASH_MB,
            threads: DEFAULT_THREADS,
            move_overhead_ms: DEFAULT_MOVE_OVERHEAD_MS,
            ponder: false,
        }
    }
}

/// Which option a successful [`EngineOptions::set`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionChange {
    Hash,
    Threads,
    MoveOverhead,
    Ponder,
}

fn parse_spin(name: &str, value: &str, min: u64, max: u64) -> Result<u64, EngineError> {
    let parsed: u64 = value.trim().parse().map_err(|_| EngineError::InvalidOptionValue {
        name: name.to_string(),
        value: value.to_string(),
    })?;
    if !(min..=max).contains(&parsed) {
        warn!("{name} = {parsed} is outside {min}..={max}, clamping");
    }
    Ok(parsed.clamp(min, max))
}

fn parse_check(name: &str, value: &str) -> Result<bool, EngineError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EngineError::InvalidOptionValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl EngineOptions {
    /// Apply `setoption name <name> value <value>`. Names are case-insensitive
    /// and accepted with or without the `USI_` prefix where USI defines one.
    pub fn set(&mut self, name: &str, value: &str) -> Result<OptionChange, EngineError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hash" | "usi_hash" => {
                self.hash_mb = parse_spin(name, value, 1, MAX_HASH_MB as u64)? as usize;
                Ok(OptionChange::Hash)
            }
            "threads" => {
                self.threads = parse_spin(name, value, 1, MAX_THREADS as u64)? as usize;
                Ok(OptionChange::Threads)
            }
            "moveoverhead" | "move overhead" => {
                self.move_overhead_ms = parse_spin(name, value, 0, MAX_MOVE_OVERHEAD_MS)?;
                Ok(OptionChange::MoveOverhead)
            }
            "ponder" | "usi_ponder" => {
                self.ponder = parse_check(name, value)?;
                Ok(OptionChange::Ponder)
            }
            _ => Err(EngineError::UnknownOption(name.to_string())),
        }
    }

    /// The `option ...` lines announced after `usi` / `uci`.
    pub fn describe(dialect: Dialect) -> Vec<String> {
        let (hash, ponder) = match dialect {
            Dialect::Usi => ("USI_Hash", "USI_Ponder"),
            Dialect::Uci => ("Hash", "Ponder"),
        };
        vec![
            format!("option name {hash} type spin default {DEFAULT_HASH_MB} min 1 max {MAX_HASH_MB}"),
            format!("option name Threads type spin default {DEFAULT_THREADS} min 1 max {MAX_THREADS}"),
            format!(
                "option name MoveOverhead type spin default {DEFAULT_MOVE_OVERHEAD_MS} min 0 max {MAX_MOVE_OVERHEAD_MS}"
            ),
            format!("option name {ponder} type check default false"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.hash_mb, 16);
        assert_eq!(options.threads, 1);
        assert_eq!(options.move_overhead_ms, 10);
    }

    #[test]
    fn test_set_accepts_both_spellings() {
        let mut options = EngineOptions::default();
        assert_eq!(options.set("USI_Hash", "64").unwrap(), OptionChange::Hash);
        assert_eq!(options.hash_mb, 64);
        assert_eq!(options.set("hash", "32").unwrap(), OptionChange::Hash);
        assert_eq!(options.hash_mb, 32);
        assert_eq!(options.set("Threads", "4").unwrap(), OptionChange::Threads);
        assert_eq!(options.threads, 4);
        assert_eq!(options.set("USI_Ponder", "true").unwrap(), OptionChange::Ponder);
        assert!(options.ponder);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let mut options = EngineOptions::default();
        options.set("Threads", "100000").unwrap();
        assert_eq!(options.threads, MAX_THREADS);
        options.set("Hash", "0").unwrap();
        assert_eq!(options.hash_mb, 1);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        let mut options = EngineOptions::default();
        assert!(matches!(
            options.set("Hash", "lots"),
            Err(EngineError::InvalidOptionValue { .. })
        ));
        assert!(matches!(
            options.set("Contempt", "10"),
            Err(EngineError::UnknownOption(_))
        ));
        assert_eq!(options, EngineOptions::default());
    }

    #[test]
    fn test_describe_uses_dialect_names() {
        let usi = EngineOptions::describe(Dialect::Usi);
        assert!(usi[0].starts_with("option name USI_Hash type spin"));
        let uci = EngineOptions::describe(Dialect::Uci);
        assert!(uci[0].starts_with("option name Hash type spin"));
        assert_eq!(usi.len(), uci.len());
    }
}
