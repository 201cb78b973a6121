//! Bitboard representation and precomputed attack tables for fast move generation.
//!
//! A bitboard is a 128-bit integer where the low 81 bits each represent one square
//! of the shogi board, indexed as `file * 9 + rank` (see [`Square`]). Bits at
//! positions 81 and above are always zero.
//!
//! Step-piece attacks are computed at compile time. Sliding attacks (rook, bishop,
//! lance) are looked up in flat tables indexed by extracting the occupancy bits
//! under a per-square relevant-blocker mask into a dense integer ("pext" indexing).

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};

use once_cell::sync::Lazy;

use crate::types::{Color, Piece, PieceType, Square};

const BOARD_MASK: u128 = (1u128 << 81) - 1;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bitboard(pub u128);

impl Bitboard {
    pub const EMPTY: Bitboard = Bitboard(0);
    pub const ALL: Bitboard = Bitboard(BOARD_MASK);

    #[inline(always)]
    pub const fn from_square(sq: Square) -> Bitboard {
        Bitboard(1u128 << sq.index())
    }

    #[inline(always)]
    pub const fn contains(self, sq: Square) -> bool {
        self.0 & (1u128 << sq.index()) != 0
    }

    #[inline(always)]
    pub fn set(&mut self, sq: Square) {
        self.0 |= 1u128 << sq.index();
    }

    #[inline(always)]
    pub fn clear(&mut self, sq: Square) {
        self.0 &= !(1u128 << sq.index());
    }

    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_nonempty(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[inline(always)]
    pub const fn more_than_one(self) -> bool {
        self.0 & self.0.wrapping_sub(1) != 0
    }

    /// Lowest set square, if any.
    #[inline(always)]
    pub fn lsb(self) -> Option<Square> {
        if self.0 == 0 {
            None
        } else {
            Some(Square::from_index(self.0.trailing_zeros() as u8))
        }
    }

    /// Remove and return the lowest set square. The bitboard must be non-empty.
    #[inline(always)]
    pub fn pop_lsb(&mut self) -> Square {
        debug_assert!(self.0 != 0, "pop_lsb on empty bitboard");
        let sq = Square::from_index(self.0.trailing_zeros() as u8);
        self.0 &= self.0 - 1;
        sq
    }

    /// Shift every square one step in `dir`, dropping squares that fall off the board.
    #[inline]
    pub const fn shift(self, dir: Direction) -> Bitboard {
        let b = self.0;
        let shifted = match dir {
            Direction::N => (b >> 1) & !RANK_MASKS[8].0,
            Direction::S => (b << 1) & !RANK_MASKS[0].0,
            Direction::E => b >> 9,
            Direction::W => b << 9,
            Direction::NE => (b >> 10) & !RANK_MASKS[8].0,
            Direction::NW => (b << 8) & !RANK_MASKS[8].0,
            Direction::SE => (b >> 8) & !RANK_MASKS[0].0,
            Direction::SW => (b << 10) & !RANK_MASKS[0].0,
        };
        Bitboard(shifted & BOARD_MASK)
    }

    pub fn iter(self) -> BitboardIter {
        BitboardIter(self.0)
    }
}

impl IntoIterator for Bitboard {
    type Item = Square;
    type IntoIter = BitboardIter;

    fn into_iter(self) -> BitboardIter {
        BitboardIter(self.0)
    }
}

impl BitAnd for Bitboard {
    type Output = Bitboard;
    #[inline(always)]
    fn bitand(self, rhs: Bitboard) -> Bitboard {
        Bitboard(self.0 & rhs.0)
    }
}

impl BitOr for Bitboard {
    type Output = Bitboard;
    #[inline(always)]
    fn bitor(self, rhs: Bitboard) -> Bitboard {
        Bitboard(self.0 | rhs.0)
    }
}

impl BitXor for Bitboard {
    type Output = Bitboard;
    #[inline(always)]
    fn bitxor(self, rhs: Bitboard) -> Bitboard {
        Bitboard(self.0 ^ rhs.0)
    }
}

impl Not for Bitboard {
    type Output = Bitboard;
    #[inline(always)]
    fn not(self) -> Bitboard {
        Bitboard(!self.0 & BOARD_MASK)
    }
}

impl BitAndAssign for Bitboard {
    #[inline(always)]
    fn bitand_assign(&mut self, rhs: Bitboard) {
        self.0 &= rhs.0;
    }
}

impl BitOrAssign for Bitboard {
    #[inline(always)]
    fn bitor_assign(&mut self, rhs: Bitboard) {
        self.0 |= rhs.0;
    }
}

impl BitXorAssign for Bitboard {
    #[inline(always)]
    fn bitxor_assign(&mut self, rhs: Bitboard) {
        self.0 ^= rhs.0;
    }
}

impl fmt::Debug for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for rank in 0..9 {
            for file in (0..9).rev() {
                let c = if self.contains(Square::new(file, rank)) { 'x' } else { '.' };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Iterate over set bits in a bitboard, returning squares
pub struct BitboardIter(pub u128);

impl Iterator for BitboardIter {
    type Item = Square;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.0 == 0 {
            None
        } else {
            let sq = Square::from_index(self.0.trailing_zeros() as u8);
            self.0 &= self.0 - 1;
            Some(sq)
        }
    }
}

/// The eight board directions. North points towards rank `a` (White's side),
/// east towards file `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// (file delta, rank delta)
    pub const fn delta(self) -> (i8, i8) {
        match self {
            Direction::N => (0, -1),
            Direction::NE => (-1, -1),
            Direction::E => (-1, 0),
            Direction::SE => (-1, 1),
            Direction::S => (0, 1),
            Direction::SW => (1, 1),
            Direction::W => (1, 0),
            Direction::NW => (1, -1),
        }
    }
}

const fn build_file_masks() -> [Bitboard; 9] {
    let mut masks = [Bitboard(0); 9];
    let mut file = 0;
    while file < 9 {
        masks[file] = Bitboard(0x1FFu128 << (file * 9));
        file += 1;
    }
    masks
}

const fn build_rank_masks() -> [Bitboard; 9] {
    let mut masks = [Bitboard(0); 9];
    let mut rank = 0;
    while rank < 9 {
        let mut bits = 0u128;
        let mut file = 0;
        while file < 9 {
            bits |= 1u128 << (file * 9 + rank);
            file += 1;
        }
        masks[rank] = Bitboard(bits);
        rank += 1;
    }
    masks
}

/// One mask per file, index 0 is the USI file `1`.
pub const FILE_MASKS: [Bitboard; 9] = build_file_masks();
/// One mask per rank, index 0 is the USI rank `a`.
pub const RANK_MASKS: [Bitboard; 9] = build_rank_masks();

/// The three ranks where `color` may promote.
#[inline(always)]
pub const fn promotion_zone(color: Color) -> Bitboard {
    match color {
        Color::Black => Bitboard(RANK_MASKS[0].0 | RANK_MASKS[1].0 | RANK_MASKS[2].0),
        Color::White => Bitboard(RANK_MASKS[6].0 | RANK_MASKS[7].0 | RANK_MASKS[8].0),
    }
}

/// Squares where a `color` piece of kind `pt` would have no legal move left,
/// so it may neither be dropped there nor arrive there unpromoted.
#[inline(always)]
pub const fn dead_end_squares(color: Color, pt: PieceType) -> Bitboard {
    let (last, second) = match color {
        Color::Black => (RANK_MASKS[0].0, RANK_MASKS[1].0),
        Color::White => (RANK_MASKS[8].0, RANK_MASKS[7].0),
    };
    match pt {
        PieceType::Pawn | PieceType::Lance => Bitboard(last),
        PieceType::Knight => Bitboard(last | second),
        _ => Bitboard(0),
    }
}

// ============================================================================
// STEP ATTACK TABLES
// ============================================================================

/// Precomputed attack tables for step pieces and unobstructed rays
pub struct AttackTables {
    /// Pawn attacks: pawn[color][square]
    pub pawn: [[Bitboard; 81]; 2],
    pub knight: [[Bitboard; 81]; 2],
    pub silver: [[Bitboard; 81]; 2],
    /// Also used for every promoted minor piece
    pub gold: [[Bitboard; 81]; 2],
    pub king: [Bitboard; 81],
    /// Ray in each [`Direction`] from each square, on an empty board
    pub rays: [[Bitboard; 81]; 8],
}

const PAWN_DELTAS: [(i8, i8); 1] = [(0, -1)];
const KNIGHT_DELTAS: [(i8, i8); 2] = [(-1, -2), (1, -2)];
const SILVER_DELTAS: [(i8, i8); 5] = [(-1, -1), (0, -1), (1, -1), (-1, 1), (1, 1)];
const GOLD_DELTAS: [(i8, i8); 6] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (0, 1)];
const KING_DELTAS: [(i8, i8); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0),           (1, 0),
    (-1, 1),  (0, 1),  (1, 1),
];

/// Deltas are written from Black's point of view; White mirrors the rank delta.
const fn step_mask(sq: usize, deltas: &[(i8, i8)], color: Color) -> Bitboard {
    let file = (sq / 9) as i8;
    let rank = (sq % 9) as i8;
    let flip: i8 = match color {
        Color::Black => 1,
        Color::White => -1,
    };
    let mut bits = 0u128;
    let mut i = 0;
    while i < deltas.len() {
        let (df, dr) = deltas[i];
        let nf = file + df;
        let nr = rank + dr * flip;
        if nf >= 0 && nf < 9 && nr >= 0 && nr < 9 {
            bits |= 1u128 << (nf * 9 + nr);
        }
        i += 1;
    }
    Bitboard(bits)
}

impl AttackTables {
    /// Initialize all step tables at compile time
    pub const fn new() -> Self {
        let mut pawn = [[Bitboard(0); 81]; 2];
        let mut knight = [[Bitboard(0); 81]; 2];
        let mut silver = [[Bitboard(0); 81]; 2];
        let mut gold = [[Bitboard(0); 81]; 2];
        let mut king = [Bitboard(0); 81];
        let mut rays = [[Bitboard(0); 81]; 8];

        let mut sq = 0;
        while sq < 81 {
            let mut c = 0;
            while c < 2 {
                let color = if c == 0 { Color::Black } else { Color::White };
                pawn[c][sq] = step_mask(sq, &PAWN_DELTAS, color);
                knight[c][sq] = step_mask(sq, &KNIGHT_DELTAS, color);
                silver[c][sq] = step_mask(sq, &SILVER_DELTAS, color);
                gold[c][sq] = step_mask(sq, &GOLD_DELTAS, color);
                c += 1;
            }
            king[sq] = step_mask(sq, &KING_DELTAS, Color::Black);

            let mut d = 0;
            while d < 8 {
                let (df, dr) = Direction::ALL[d].delta();
                let mut f = (sq / 9) as i8 + df;
                let mut r = (sq % 9) as i8 + dr;
                let mut bits = 0u128;
                while f >= 0 && f < 9 && r >= 0 && r < 9 {
                    bits |= 1u128 << (f * 9 + r);
                    f += df;
                    r += dr;
                }
                rays[d][sq] = Bitboard(bits);
                d += 1;
            }
            sq += 1;
        }

        AttackTables { pawn, knight, silver, gold, king, rays }
    }
}

impl Default for AttackTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Global precomputed step tables
pub static ATTACK_TABLES: AttackTables = AttackTables::new();

// ============================================================================
// SLIDER TABLES (PEXT INDEXED)
// ============================================================================

/// Extract the bits of `value` selected by `mask` into a dense integer.
#[inline(always)]
pub fn pext(value: u128, mask: u128) -> usize {
    #[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
    {
        use std::arch::x86_64::_pext_u64;
        let lo_mask = mask as u64;
        let hi_mask = (mask >> 64) as u64;
        // SAFETY: this branch is only compiled when BMI2 is enabled for the target.
        let (lo, hi) = unsafe {
            (
                _pext_u64(value as u64, lo_mask),
                _pext_u64((value >> 64) as u64, hi_mask),
            )
        };
        (lo as u128 | ((hi as u128) << lo_mask.count_ones())) as usize
    }
    #[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
    {
        let mut result = 0usize;
        let mut bit = 1usize;
        let mut m = mask;
        while m != 0 {
            let lowest = m & m.wrapping_neg();
            if value & lowest != 0 {
                result |= bit;
            }
            m ^= lowest;
            bit <<= 1;
        }
        result
    }
}

/// Attack table for one family of sliding directions.
pub struct SliderTable {
    /// Relevant blocker squares for each origin: the rays minus their final edge square
    masks: Vec<Bitboard>,
    /// Start of each origin's block inside `attacks`
    offsets: Vec<usize>,
    attacks: Vec<Bitboard>,
}

impl SliderTable {
    fn build(directions: &[Direction]) -> Self {
        let mut masks = Vec::with_capacity(Square::NUM);
        let mut offsets = Vec::with_capacity(Square::NUM);
        let mut attacks = Vec::new();

        for sq in Square::all() {
            let mask = Self::relevant_mask(sq, directions);
            offsets.push(attacks.len());
            attacks.resize(attacks.len() + (1usize << mask.count()), Bitboard::EMPTY);
            let base = offsets[sq.index()];
            for occupied in all_subsets(mask.0) {
                let index = base + pext(occupied, mask.0);
                attacks[index] = sliding_attacks_slow(sq, Bitboard(occupied), directions);
            }
            masks.push(mask);
        }

        SliderTable { masks, offsets, attacks }
    }

    /// Squares whose occupancy can change the attack set from `sq`.
    fn relevant_mask(sq: Square, directions: &[Direction]) -> Bitboard {
        let mut mask = Bitboard::EMPTY;
        for &dir in directions {
            let (df, dr) = dir.delta();
            let mut cur = sq.offset(df, dr);
            while let Some(s) = cur {
                let next = s.offset(df, dr);
                if next.is_none() {
                    break;
                }
                mask.set(s);
                cur = next;
            }
        }
        mask
    }

    #[inline(always)]
    pub fn attacks(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        let i = sq.index();
        self.attacks[self.offsets[i] + pext(occupied.0, self.masks[i].0)]
    }

    pub fn len(&self) -> usize {
        self.attacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attacks.is_empty()
    }
}

/// Generate all subsets of a mask using the Carry-Rippler technique
fn all_subsets(mask: u128) -> impl Iterator<Item = u128> {
    let mut subset = 0u128;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let current = subset;
        subset = subset.wrapping_sub(mask) & mask;
        if subset == 0 {
            done = true;
        }
        Some(current)
    })
}

/// Ray-cast attacks, stopping at (and including) the first blocker in each direction.
fn sliding_attacks_slow(sq: Square, occupied: Bitboard, directions: &[Direction]) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;
    for &dir in directions {
        let (df, dr) = dir.delta();
        let mut cur = sq.offset(df, dr);
        while let Some(s) = cur {
            attacks.set(s);
            if occupied.contains(s) {
                break;
            }
            cur = s.offset(df, dr);
        }
    }
    attacks
}

/// Slider attack tables for rooks, bishops and lances
pub struct MagicTables {
    pub rook: SliderTable,
    pub bishop: SliderTable,
    /// Indexed by color: a lance only slides forward
    pub lance: [SliderTable; 2],
}

impl MagicTables {
    pub fn new() -> Self {
        MagicTables {
            rook: SliderTable::build(&[Direction::N, Direction::E, Direction::S, Direction::W]),
            bishop: SliderTable::build(&[Direction::NE, Direction::SE, Direction::SW, Direction::NW]),
            lance: [SliderTable::build(&[Direction::N]), SliderTable::build(&[Direction::S])],
        }
    }
}

impl Default for MagicTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Global slider tables (built on first use)
static MAGIC_TABLES: Lazy<MagicTables> = Lazy::new(MagicTables::new);

/// Squares between and through aligned square pairs.
struct LineTables {
    between: Vec<Bitboard>,
    line: Vec<Bitboard>,
}

impl LineTables {
    fn new() -> Self {
        let mut between = vec![Bitboard::EMPTY; Square::NUM * Square::NUM];
        let mut line = vec![Bitboard::EMPTY; Square::NUM * Square::NUM];

        for from in Square::all() {
            for (d, dir) in Direction::ALL.iter().enumerate() {
                let opposite = (d + 4) % 8;
                let full = ATTACK_TABLES.rays[d][from.index()]
                    | ATTACK_TABLES.rays[opposite][from.index()]
                    | Bitboard::from_square(from);
                let (df, dr) = dir.delta();
                let mut gap = Bitboard::EMPTY;
                let mut cur = from.offset(df, dr);
                while let Some(to) = cur {
                    between[from.index() * Square::NUM + to.index()] = gap;
                    line[from.index() * Square::NUM + to.index()] = full;
                    gap.set(to);
                    cur = to.offset(df, dr);
                }
            }
        }
        LineTables { between, line }
    }
}

static LINE_TABLES: Lazy<LineTables> = Lazy::new(LineTables::new);

/// Force construction of every lazily built table. Call once at process start so
/// the first search does not pay for it.
pub fn init() {
    Lazy::force(&MAGIC_TABLES);
    Lazy::force(&LINE_TABLES);
}

// ============================================================================
// LOOKUPS
// ============================================================================

#[inline(always)]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    ATTACK_TABLES.pawn[color.index()][sq.index()]
}

#[inline(always)]
pub fn knight_attacks(color: Color, sq: Square) -> Bitboard {
    ATTACK_TABLES.knight[color.index()][sq.index()]
}

#[inline(always)]
pub fn silver_attacks(color: Color, sq: Square) -> Bitboard {
    ATTACK_TABLES.silver[color.index()][sq.index()]
}

#[inline(always)]
pub fn gold_attacks(color: Color, sq: Square) -> Bitboard {
    ATTACK_TABLES.gold[color.index()][sq.index()]
}

#[inline(always)]
pub fn king_attacks(sq: Square) -> Bitboard {
    ATTACK_TABLES.king[sq.index()]
}

#[inline(always)]
pub fn lance_attacks(color: Color, sq: Square, occupied: Bitboard) -> Bitboard {
    MAGIC_TABLES.lance[color.index()].attacks(sq, occupied)
}

#[inline(always)]
pub fn bishop_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    MAGIC_TABLES.bishop.attacks(sq, occupied)
}

#[inline(always)]
pub fn rook_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    MAGIC_TABLES.rook.attacks(sq, occupied)
}

#[inline(always)]
pub fn horse_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    bishop_attacks(sq, occupied) | king_attacks(sq)
}

#[inline(always)]
pub fn dragon_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    rook_attacks(sq, occupied) | king_attacks(sq)
}

/// Squares attacked by `piece` standing on `sq` given the board occupancy.
#[inline]
pub fn attacks_from(piece: Piece, sq: Square, occupied: Bitboard) -> Bitboard {
    let c = piece.color;
    match piece.piece_type {
        PieceType::Pawn => pawn_attacks(c, sq),
        PieceType::Lance => lance_attacks(c, sq, occupied),
        PieceType::Knight => knight_attacks(c, sq),
        PieceType::Silver => silver_attacks(c, sq),
        PieceType::Bishop => bishop_attacks(sq, occupied),
        PieceType::Rook => rook_attacks(sq, occupied),
        PieceType::Gold
        | PieceType::ProPawn
        | PieceType::ProLance
        | PieceType::ProKnight
        | PieceType::ProSilver => gold_attacks(c, sq),
        PieceType::Horse => horse_attacks(sq, occupied),
        PieceType::Dragon => dragon_attacks(sq, occupied),
        PieceType::King => king_attacks(sq),
    }
}

/// Squares strictly between two aligned squares; empty when not aligned.
#[inline(always)]
pub fn between(a: Square, b: Square) -> Bitboard {
    LINE_TABLES.between[a.index() * Square::NUM + b.index()]
}

/// The full line through two aligned squares (edge to edge); empty when not aligned.
#[inline(always)]
pub fn line(a: Square, b: Square) -> Bitboard {
    LINE_TABLES.line[a.index() * Square::NUM + b.index()]
}

/// Squares in front of `sq` from `color`'s point of view, up to the board edge.
#[inline(always)]
pub fn forward_ray(color: Color, sq: Square) -> Bitboard {
    match color {
        Color::Black => ATTACK_TABLES.rays[0][sq.index()],
        Color::White => ATTACK_TABLES.rays[4][sq.index()],
    }
}

/// Squares behind `sq` from `color`'s point of view.
#[inline(always)]
pub fn backward_ray(color: Color, sq: Square) -> Bitboard {
    forward_ray(!color, sq)
}

#[inline(always)]
pub fn ray(dir: Direction, sq: Square) -> Bitboard {
    ATTACK_TABLES.rays[dir as usize][sq.index()]
}
