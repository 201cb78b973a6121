//! Piece placement: per-kind and per-color bitboards plus a square lookup.
//!
//! `Board` knows nothing about side to move, hands or history; it is the
//! authoritative placement that [`crate::position::Position`] mutates during
//! make/unmake. Every mutation keeps the three views (kind masks, color masks,
//! mailbox) in agreement, checked with debug assertions.

use std::fmt;

use crate::bitboard::{
    bishop_attacks, between, gold_attacks, king_attacks, knight_attacks, lance_attacks,
    pawn_attacks, rook_attacks, silver_attacks, Bitboard,
};
use crate::types::{Color, Piece, PieceType, Square};

#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    by_type: [Bitboard; PieceType::NUM],
    by_color: [Bitboard; Color::NUM],
    squares: [Option<Piece>; Square::NUM],
}

impl Board {
    pub fn empty() -> Self {
        Board {
            by_type: [Bitboard::EMPTY; PieceType::NUM],
            by_color: [Bitboard::EMPTY; Color::NUM],
            squares: [None; Square::NUM],
        }
    }

    #[inline(always)]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    #[inline(always)]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    #[inline(always)]
    pub fn pieces(&self, color: Color) -> Bitboard {
        self.by_color[color.index()]
    }

    #[inline(always)]
    pub fn pieces_of_type(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    #[inline(always)]
    pub fn pieces_of(&self, color: Color, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()] & self.by_color[color.index()]
    }

    /// Gold and every promoted minor piece.
    #[inline]
    pub fn gold_movers(&self) -> Bitboard {
        self.by_type[PieceType::Gold.index()]
            | self.by_type[PieceType::ProPawn.index()]
            | self.by_type[PieceType::ProLance.index()]
            | self.by_type[PieceType::ProKnight.index()]
            | self.by_type[PieceType::ProSilver.index()]
    }

    #[inline]
    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces_of(color, PieceType::King).lsb()
    }

    /// Place a piece on an empty square.
    #[inline]
    pub fn put_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(sq.is_on_board());
        debug_assert!(self.squares[sq.index()].is_none(), "put_piece on occupied {sq:?}");
        let bb = Bitboard::from_square(sq);
        self.by_type[piece.piece_type.index()] |= bb;
        self.by_color[piece.color.index()] |= bb;
        self.squares[sq.index()] = Some(piece);
    }

    /// Remove and return the piece on `sq`. The square must be occupied.
    #[inline]
    pub fn remove_piece(&mut self, sq: Square) -> Option<Piece> {
        let piece = self.squares[sq.index()].take();
        debug_assert!(piece.is_some(), "remove_piece on empty {sq:?}");
        if let Some(p) = piece {
            let bb = Bitboard::from_square(sq);
            self.by_type[p.piece_type.index()] ^= bb;
            self.by_color[p.color.index()] ^= bb;
        }
        piece
    }

    /// Every piece of `color` attacking `sq` given `occupied`.
    pub fn attackers_to_by(&self, color: Color, sq: Square, occupied: Bitboard) -> Bitboard {
        // A `color` piece attacks `sq` exactly when the mirrored step from `sq` reaches it.
        let them = !color;
        let ours = self.pieces(color);
        let step = (pawn_attacks(them, sq) & self.by_type[PieceType::Pawn.index()])
            | (knight_attacks(them, sq) & self.by_type[PieceType::Knight.index()])
            | (silver_attacks(them, sq) & self.by_type[PieceType::Silver.index()])
            | (gold_attacks(them, sq) & self.gold_movers())
            | (king_attacks(sq)
                & (self.by_type[PieceType::King.index()]
                    | self.by_type[PieceType::Horse.index()]
                    | self.by_type[PieceType::Dragon.index()]));
        let sliders = (lance_attacks(them, sq, occupied) & self.by_type[PieceType::Lance.index()])
            | (bishop_attacks(sq, occupied)
                & (self.by_type[PieceType::Bishop.index()] | self.by_type[PieceType::Horse.index()]))
            | (rook_attacks(sq, occupied)
                & (self.by_type[PieceType::Rook.index()] | self.by_type[PieceType::Dragon.index()]));
        (step | sliders) & ours
    }

    /// Attackers of both colors.
    pub fn attackers_to(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.attackers_to_by(Color::Black, sq, occupied)
            | self.attackers_to_by(Color::White, sq, occupied)
    }

    #[inline]
    pub fn is_attacked_by(&self, color: Color, sq: Square, occupied: Bitboard) -> bool {
        self.attackers_to_by(color, sq, occupied).is_nonempty()
    }

    /// Pieces standing alone between `king_color`'s king and an enemy slider,
    /// and the enemy sliders doing the pinning.
    ///
    /// Returns `(blockers, pinners)`. Blockers of either color are reported;
    /// a slider only counts as a pinner when the lone blocker belongs to the king's side.
    pub fn slider_blockers(&self, king_color: Color, king_sq: Square) -> (Bitboard, Bitboard) {
        let them = !king_color;
        let rooks = self.pieces_of(them, PieceType::Rook) | self.pieces_of(them, PieceType::Dragon);
        let bishops =
            self.pieces_of(them, PieceType::Bishop) | self.pieces_of(them, PieceType::Horse);
        let lances = self.pieces_of(them, PieceType::Lance);

        let snipers = (rook_attacks(king_sq, Bitboard::EMPTY) & rooks)
            | (bishop_attacks(king_sq, Bitboard::EMPTY) & bishops)
            | (lance_attacks(king_color, king_sq, Bitboard::EMPTY) & lances);

        let occupied = self.occupied() ^ snipers;
        let mut blockers = Bitboard::EMPTY;
        let mut pinners = Bitboard::EMPTY;
        for sniper in snipers {
            let b = between(sniper, king_sq) & occupied;
            if b.is_nonempty() && !b.more_than_one() {
                blockers |= b;
                if (b & self.pieces(king_color)).is_nonempty() {
                    pinners.set(sniper);
                }
            }
        }
        (blockers, pinners)
    }

    /// Check that the kind masks, color masks and mailbox agree.
    pub fn is_consistent(&self) -> bool {
        if (self.by_color[0] & self.by_color[1]).is_nonempty() {
            return false;
        }
        let mut union = Bitboard::EMPTY;
        for (i, &bb) in self.by_type.iter().enumerate() {
            if (union & bb).is_nonempty() {
                return false;
            }
            union |= bb;
            for sq in bb {
                match self.squares[sq.index()] {
                    Some(p) if p.piece_type.index() == i && self.pieces(p.color).contains(sq) => {}
                    _ => return false,
                }
            }
        }
        union == self.occupied()
            && Square::all().all(|sq| self.squares[sq.index()].is_some() == union.contains(sq))
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

/// Text diagram, White's side on top, file 9 on the left.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  9  8  7  6  5  4  3  2  1")?;
        writeln!(f, "+---------------------------+")?;
        for rank in 0..9u8 {
            write!(f, "|")?;
            for file in (0..9u8).rev() {
                match self.piece_on(Square::new(file, rank)) {
                    Some(p) => write!(f, "{:>3}", p.to_sfen())?,
                    None => write!(f, "  .")?,
                }
            }
            writeln!(f, "| {}", (b'a' + rank) as char)?;
        }
        write!(f, "+---------------------------+")
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        fmt::Display::fmt(self, f)
    }
}
