pub mod types;
pub mod bitboard;
pub mod board;
pub mod zobrist;
pub mod position;
pub mod notation;
pub mod movelist;
pub mod movegen;
pub mod tt;
pub mod history;
pub mod movepicker;
pub mod evaluate;
pub mod search;
pub mod threads;
pub mod options;
pub mod engine;
pub mod protocol;
pub mod perft;
pub mod record;
pub mod datagen;
pub mod error;
