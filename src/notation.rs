//! Move and square text for the two protocol dialects.
//!
//! USI names squares by file digit then rank letter (`7g`, file 1 on the right).
//! The UCI-style dialect uses a chess-like grid: file letters `a`..`i` from the
//! left (USI file 9 is `a`) and rank digits `1`..`9` from Black's side (USI rank
//! `i` is `1`). So USI `7g7f` is `c3c4`, and `P*5e` is `P*e5`.

use itertools::Itertools;

use crate::error::MoveParseError;
use crate::types::{Move, PieceType, Square};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Usi,
    Uci,
}

pub fn format_square(sq: Square, dialect: Dialect) -> String {
    let (file, rank) = (sq.file(), sq.rank());
    match dialect {
        Dialect::Usi => format!("{}{}", file + 1, (b'a' + rank) as char),
        Dialect::Uci => format!("{}{}", (b'a' + (8 - file)) as char, 9 - rank),
    }
}

pub fn parse_square(text: &str, dialect: Dialect) -> Result<Square, MoveParseError> {
    let bytes = text.as_bytes();
    if bytes.len() != 2 {
        return Err(MoveParseError::Square(text.to_string()));
    }
    let (file, rank) = match dialect {
        Dialect::Usi => (bytes[0].wrapping_sub(b'1'), bytes[1].wrapping_sub(b'a')),
        Dialect::Uci => (
            8u8.wrapping_sub(bytes[0].wrapping_sub(b'a')),
            9u8.wrapping_sub(bytes[1].wrapping_sub(b'0')),
        ),
    };
    if file < 9 && rank < 9 {
        Ok(Square::new(file, rank))
    } else {
        Err(MoveParseError::Square(text.to_string()))
    }
}

pub fn format_move(mv: Move, dialect: Dialect) -> String {
    if mv.is_none() {
        return match dialect {
            Dialect::Usi => "resign".to_string(),
            Dialect::Uci => "0000".to_string(),
        };
    }
    if mv.is_drop() {
        format!("{}*{}", mv.dropped_piece().to_char(), format_square(mv.to(), dialect))
    } else {
        format!(
            "{}{}{}",
            format_square(mv.from(), dialect),
            format_square(mv.to(), dialect),
            if mv.is_promotion() { "+" } else { "" }
        )
    }
}

/// Parse move text into a [`Move`]. Only the syntax is checked; legality is up
/// to the caller.
pub fn parse_move(text: &str, dialect: Dialect) -> Result<Move, MoveParseError> {
    let malformed = || MoveParseError::Malformed(text.to_string());
    if !text.is_ascii() {
        return Err(malformed());
    }

    let bytes = text.as_bytes();
    if bytes.len() == 4 && (bytes[1] == b'*' || (dialect == Dialect::Uci && bytes[1] == b'@')) {
        let letter = bytes[0] as char;
        let pt = PieceType::from_char(letter)
            .filter(|pt| letter.is_ascii_uppercase() && pt.hand_index().is_some())
            .ok_or(MoveParseError::Piece(letter))?;
        let to = parse_square(&text[2..4], dialect)?;
        return Ok(Move::new_drop(pt, to));
    }

    let promote = match bytes.len() {
        4 => false,
        5 if bytes[4] == b'+' => true,
        _ => return Err(malformed()),
    };
    let from = parse_square(&text[0..2], dialect)?;
    let to = parse_square(&text[2..4], dialect)?;
    if from == to {
        return Err(malformed());
    }
    Ok(Move::new_normal(from, to, promote))
}

/// Space separated move list, as printed after `pv`.
pub fn format_moves(moves: &[Move], dialect: Dialect) -> String {
    moves.iter().map(|&mv| format_move(mv, dialect)).join(" ")
}
