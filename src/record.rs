//! Packed self-play records.
//!
//! Every position is stored in a fixed 64-byte little-endian record:
//!
//! | Bytes  | Contents                                                        |
//! | ------ | --------------------------------------------------------------- |
//! | 0..16  | Black occupancy (bits 0-80), side to move (81), result (82-83), Black hand (84-104) |
//! | 16..32 | White occupancy (bits 0-80), White hand (81-101)                |
//! | 32..52 | Piece kinds, 4 bits each, in ascending square order             |
//! | 52..54 | Score (`i16`, side to move)                                     |
//! | 54..56 | Game ply (`u16`)                                                |
//! | 56..58 | Best move (`u16`)                                               |
//! | 58..64 | Zero                                                            |
//!
//! A game is a run of records followed by an all-zero terminator. The
//! terminator has no kings, so it never decodes as a position.

use std::io::{self, Read, Write};

use crate::bitboard::Bitboard;
use crate::board::Board;
use crate::error::{EngineError, EngineResult};
use crate::position::Position;
use crate::types::{Color, Hand, Move, Piece, PieceType};

pub const RECORD_SIZE: usize = 64;
pub const TERMINATOR: [u8; RECORD_SIZE] = [0; RECORD_SIZE];

/// At most 40 pieces are ever on the board.
const MAX_BOARD_PIECES: usize = 40;
const PIECES_OFFSET: usize = 32;
const SIDE_BIT: u32 = 81;
const RESULT_SHIFT: u32 = 82;
const BLACK_HAND_SHIFT: u32 = 84;
const WHITE_HAND_SHIFT: u32 = 81;
const HAND_MASK: u128 = (1 << 21) - 1;

/// Final result of the game a record was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameResult {
    /// Still being played, or abandoned
    #[default]
    Unknown,
    BlackWin,
    WhiteWin,
    Draw,
}

impl GameResult {
    pub fn win_for(color: Color) -> GameResult {
        match color {
            Color::Black => GameResult::BlackWin,
            Color::White => GameResult::WhiteWin,
        }
    }

    /// 1 for a win, 0 for a draw and -1 for a loss, seen from `color`.
    pub fn relative_to(self, color: Color) -> Option<i8> {
        match (self, color) {
            (GameResult::Unknown, _) => None,
            (GameResult::Draw, _) => Some(0),
            (GameResult::BlackWin, Color::Black) | (GameResult::WhiteWin, Color::White) => Some(1),
            _ => Some(-1),
        }
    }

    fn to_bits(self) -> u128 {
        match self {
            GameResult::Unknown => 0,
            GameResult::BlackWin => 1,
            GameResult::WhiteWin => 2,
            GameResult::Draw => 3,
        }
    }

    fn from_bits(bits: u128) -> GameResult {
        match bits & 3 {
            1 => GameResult::BlackWin,
            2 => GameResult::WhiteWin,
            3 => GameResult::Draw,
            _ => GameResult::Unknown,
        }
    }
}

#[derive(Clone)]
pub struct PositionRecord {
    pub position: Position,
    /// Search score from the side to move's point of view
    pub score: i16,
    pub best_move: Move,
    pub result: GameResult,
}

impl PositionRecord {
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let pos = &self.position;
        let board = pos.board();
        let black = board.pieces(Color::Black).0;
        let white = board.pieces(Color::White).0;

        let side = match pos.side_to_move() {
            Color::Black => 0u128,
            Color::White => 1u128,
        };
        let a = black
            | side << SIDE_BIT
            | self.result.to_bits() << RESULT_SHIFT
            | (pos.hand(Color::Black).raw() as u128 & HAND_MASK) << BLACK_HAND_SHIFT;
        let b = white | (pos.hand(Color::White).raw() as u128 & HAND_MASK) << WHITE_HAND_SHIFT;

        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..16].copy_from_slice(&a.to_le_bytes());
        bytes[16..32].copy_from_slice(&b.to_le_bytes());
        for (i, sq) in board.occupied().into_iter().take(MAX_BOARD_PIECES).enumerate() {
            let kind = board.piece_on(sq).map_or(0, |p| p.piece_type.index() as u8);
            bytes[PIECES_OFFSET + i / 2] |= kind << (4 * (i % 2));
        }
        let ply = pos.game_ply().min(u16::MAX as u32) as u16;
        bytes[52..54].copy_from_slice(&self.score.to_le_bytes());
        bytes[54..56].copy_from_slice(&ply.to_le_bytes());
        bytes[56..58].copy_from_slice(&self.best_move.raw().to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> EngineResult<PositionRecord> {
        let mut word = [0u8; 16];
        word.copy_from_slice(&bytes[0..16]);
        let a = u128::from_le_bytes(word);
        word.copy_from_slice(&bytes[16..32]);
        let b = u128::from_le_bytes(word);

        let black = Bitboard(a & Bitboard::ALL.0);
        let white = Bitboard(b & Bitboard::ALL.0);
        if (black & white).is_nonempty() {
            return Err(malformed("a square is claimed by both colors"));
        }
        let occupied = black | white;
        if occupied.count() as usize > MAX_BOARD_PIECES {
            return Err(malformed(format!("{} pieces on the board", occupied.count())));
        }

        let mut board = Board::empty();
        for (i, sq) in occupied.into_iter().enumerate() {
            let nibble = (bytes[PIECES_OFFSET + i / 2] >> (4 * (i % 2))) & 0x0F;
            let piece_type = PieceType::from_index(nibble as usize)
                .ok_or_else(|| malformed(format!("piece code {nibble}")))?;
            let color = if black.contains(sq) { Color::Black } else { Color::White };
            board.put_piece(Piece::new(color, piece_type), sq);
        }

        let side = if a >> SIDE_BIT & 1 == 0 { Color::Black } else { Color::White };
        let hands = [
            decode_hand((a >> BLACK_HAND_SHIFT) & HAND_MASK)?,
            decode_hand((b >> WHITE_HAND_SHIFT) & HAND_MASK)?,
        ];
        let ply = u16::from_le_bytes([bytes[54], bytes[55]]).max(1);
        let position = Position::from_parts(board, side, hands, ply as u32)?;

        Ok(PositionRecord {
            position,
            score: i16::from_le_bytes([bytes[52], bytes[53]]),
            best_move: Move::from_raw(u16::from_le_bytes([bytes[56], bytes[57]])),
            result: GameResult::from_bits(a >> RESULT_SHIFT),
        })
    }
}

fn malformed(reason: impl Into<String>) -> EngineError {
    EngineError::Record(reason.into())
}

fn decode_hand(raw: u128) -> EngineResult<Hand> {
    let hand = Hand::from_raw(raw as u32);
    for (i, pt) in PieceType::HAND_KINDS.into_iter().enumerate() {
        if hand.count(pt) > Hand::MAX_COUNTS[i] {
            return Err(malformed(format!("{} {:?} in hand", hand.count(pt), pt)));
        }
    }
    Ok(hand)
}

pub fn is_terminator(bytes: &[u8; RECORD_SIZE]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// Appends whole games to a byte stream.
pub struct RecordWriter<W: Write> {
    inner: W,
    games: u64,
    positions: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        RecordWriter {
            inner,
            games: 0,
            positions: 0,
        }
    }

    pub fn write_game(&mut self, records: &[PositionRecord]) -> EngineResult<()> {
        for record in records {
            self.inner.write_all(&record.encode())?;
        }
        self.inner.write_all(&TERMINATOR)?;
        self.games += 1;
        self.positions += records.len() as u64;
        Ok(())
    }

    pub fn games_written(&self) -> u64 {
        self.games
    }

    pub fn positions_written(&self) -> u64 {
        self.positions
    }

    pub fn flush(&mut self) -> EngineResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads games back, one `Vec` of records per terminator.
pub struct RecordReader<R: Read> {
    inner: R,
    failed: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        RecordReader { inner, failed: false }
    }

    /// `Ok(None)` at a clean end of stream.
    pub fn read_game(&mut self) -> EngineResult<Option<Vec<PositionRecord>>> {
        let mut game = Vec::new();
        loop {
            match self.read_chunk()? {
                None if game.is_empty() => return Ok(None),
                None => return Err(malformed("game is missing its terminator")),
                Some(chunk) if is_terminator(&chunk) => return Ok(Some(game)),
                Some(chunk) => game.push(PositionRecord::decode(&chunk)?),
            }
        }
    }

    fn read_chunk(&mut self) -> EngineResult<Option<[u8; RECORD_SIZE]>> {
        let mut chunk = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_SIZE => Ok(Some(chunk)),
            n => Err(malformed(format!("truncated record ({n} of {RECORD_SIZE} bytes)"))),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = EngineResult<Vec<PositionRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let game = self.read_game();
        self.failed = game.is_err();
        game.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{parse_move, Dialect};
    use pretty_assertions::assert_eq;

    const MIDDLEGAME: &str = "lnsgk2nl/1r4g2/p1ppppspp/1p7/7P1/2P6/PP1PPPP1P/1SG4R1/LN2KGSNL w Bb 14";

    fn record(sfen: &str, score: i16, mv: &str, result: GameResult) -> PositionRecord {
        PositionRecord {
            position: Position::from_sfen(sfen).unwrap(),
            score,
            best_move: parse_move(mv, Dialect::Usi).unwrap(),
            result,
        }
    }

    #[test]
    fn test_encode_decode_preserves_position() {
        for original in [
            record(crate::position::SFEN_STARTPOS, 35, "7g7f", GameResult::BlackWin),
            record(MIDDLEGAME, -120, "B*5e", GameResult::Draw),
            record("4k4/9/4P4/9/9/9/9/9/4K4 b 2G9Pr2b 101", 31_000, "G*5b", GameResult::Unknown),
        ] {
            let bytes = original.encode();
            assert!(bytes[58..].iter().all(|&b| b == 0));
            let decoded = PositionRecord::decode(&bytes).unwrap();
            assert_eq!(decoded.position.to_sfen(), original.position.to_sfen());
            assert_eq!(decoded.position.hash(), original.position.hash());
            assert_eq!(decoded.score, original.score);
            assert_eq!(decoded.best_move, original.best_move);
            assert_eq!(decoded.result, original.result);
        }
    }

    #[test]
    fn test_terminator_never_decodes() {
        assert!(is_terminator(&TERMINATOR));
        assert!(PositionRecord::decode(&TERMINATOR).is_err());
        let encoded = record(MIDDLEGAME, 0, "2b3c", GameResult::Unknown).encode();
        assert!(!is_terminator(&encoded));
    }

    #[test]
    fn test_corrupt_records_are_rejected() {
        let good = record(MIDDLEGAME, 0, "2b3c", GameResult::Unknown).encode();

        let mut overlap = good;
        overlap[16..32].copy_from_slice(&good[0..16]);
        assert!(matches!(PositionRecord::decode(&overlap), Err(EngineError::Record(_))));

        let mut bad_kind = good;
        bad_kind[PIECES_OFFSET] |= 0x0F;
        assert!(matches!(PositionRecord::decode(&bad_kind), Err(EngineError::Record(_))));
    }

    #[test]
    fn test_result_perspective() {
        assert_eq!(GameResult::win_for(Color::White), GameResult::WhiteWin);
        assert_eq!(GameResult::BlackWin.relative_to(Color::Black), Some(1));
        assert_eq!(GameResult::BlackWin.relative_to(Color::White), Some(-1));
        assert_eq!(GameResult::Draw.relative_to(Color::White), Some(0));
        assert_eq!(GameResult::Unknown.relative_to(Color::Black), None);
    }

    #[test]
    fn test_stream_round_trip() {
        let first = vec![
            record(crate::position::SFEN_STARTPOS, 10, "7g7f", GameResult::WhiteWin),
            record(MIDDLEGAME, -5, "2b3c", GameResult::WhiteWin),
        ];
        let second = vec![record(MIDDLEGAME, 0, "B*5e", GameResult::Draw)];

        let mut writer = RecordWriter::new(Vec::new());
        writer.write_game(&first).unwrap();
        writer.write_game(&second).unwrap();
        assert_eq!(writer.games_written(), 2);
        assert_eq!(writer.positions_written(), 3);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 5 * RECORD_SIZE);

        let games: Vec<_> = RecordReader::new(bytes.as_slice())
            .collect::<EngineResult<_>>()
            .unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].len(), 2);
        assert_eq!(games[1][0].position.to_sfen(), second[0].position.to_sfen());
        assert_eq!(games[0][1].score, -5);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_game(&[record(MIDDLEGAME, 0, "2b3c", GameResult::Unknown)])
            .unwrap();
        let bytes = writer.into_inner();

        let mut reader = RecordReader::new(&bytes[..RECORD_SIZE + 10]);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());

        let mut reader = RecordReader::new(&bytes[..RECORD_SIZE]);
        assert!(matches!(reader.read_game(), Err(EngineError::Record(_))));
    }
}
