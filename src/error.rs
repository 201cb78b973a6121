//! Error types for position text, move text and engine configuration.

use crate::types::Color;

/// Problems found while reading SFEN position text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SfenError {
    #[error("SFEN must have at least 3 fields, got {0}")]
    MissingFields(usize),

    #[error("Invalid board: {0}")]
    Board(String),

    #[error("Invalid side to move: {0:?}")]
    SideToMove(String),

    #[error("Invalid hand: {0}")]
    Hand(String),

    #[error("Invalid ply: {0:?}")]
    Ply(String),

    #[error("Expected exactly one {0:?} king, found {1}")]
    KingCount(Color, usize),

    #[error("The side to move can capture the opposing king")]
    OpponentInCheck,
}

/// Problems found while reading move text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("Invalid move text: {0:?}")]
    Malformed(String),

    #[error("Invalid square: {0:?}")]
    Square(String),

    #[error("Invalid piece letter: {0:?}")]
    Piece(char),
}

/// Errors surfaced by the engine façade and the record tools.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Sfen(#[from] SfenError),

    #[error(transparent)]
    MoveParse(#[from] MoveParseError),

    #[error("Illegal move {0} in this position")]
    IllegalMove(String),

    #[error("Unknown option {0:?}")]
    UnknownOption(String),

    #[error("Invalid value {value:?} for option {name}")]
    InvalidOptionValue { name: String, value: String },

    #[error("Could not allocate a {0} MiB hash table")]
    HashAllocation(usize),

    #[error("A search is already running")]
    SearchInProgress,

    #[error("Malformed record: {0}")]
    Record(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
