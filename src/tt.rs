//! Transposition table shared by every search thread.
//!
//! The table is an array of clusters, each holding three entries. An entry is
//! packed into a single `AtomicU64`, so a reader sees either the old or the new
//! entry, never a mix of the two. Different positions can still share a cluster
//! and a 16-bit key fragment; callers must treat the stored move as a hint and
//! validate it against the position before playing it.
//!
//! Entry layout (low to high): key16, move16, score16, depth8, genbound8.
//! `genbound8` holds the generation in its upper five bits, the PV flag in bit 2
//! and the bound in bits 0-1.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::EngineError;
use crate::types::Move;

/// Transposition table entry flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TTFlag {
    /// Score is an upper bound (all node - failed low)
    UpperBound = 1,
    /// Score is a lower bound (cut node - failed high)
    LowerBound = 2,
    /// Exact score (PV node)
    Exact = 3,
}

impl TTFlag {
    fn from_bits(bits: u8) -> Option<TTFlag> {
        match bits & 3 {
            1 => Some(TTFlag::UpperBound),
            2 => Some(TTFlag::LowerBound),
            3 => Some(TTFlag::Exact),
            _ => None,
        }
    }
}

/// Stored depth is `depth + DEPTH_OFFSET`, so a zero byte marks an empty slot.
pub const DEPTH_OFFSET: i32 = 3;
const ENTRIES_PER_CLUSTER: usize = 3;
const GENERATION_BITS: u32 = 3;
const GENERATION_DELTA: u8 = 1 << GENERATION_BITS;
const GENERATION_CYCLE: u16 = 255 + GENERATION_DELTA as u16;
const GENERATION_MASK: u16 = (0xFF << GENERATION_BITS) & 0xFF;

/// A decoded table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TTData {
    pub mv: Move,
    pub score: i32,
    pub depth: i32,
    pub flag: Option<TTFlag>,
    pub is_pv: bool,
}

impl TTData {
    const EMPTY: TTData = TTData {
        mv: Move::NONE,
        score: 0,
        depth: -DEPTH_OFFSET,
        flag: None,
        is_pv: false,
    };
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct PackedEntry(u64);

impl PackedEntry {
    #[inline(always)]
    fn key16(self) -> u16 {
        self.0 as u16
    }

    #[inline(always)]
    fn mv(self) -> Move {
        Move::from_raw((self.0 >> 16) as u16)
    }

    #[inline(always)]
    fn score(self) -> i16 {
        (self.0 >> 32) as u16 as i16
    }

    #[inline(always)]
    fn depth8(self) -> u8 {
        (self.0 >> 48) as u8
    }

    #[inline(always)]
    fn genbound8(self) -> u8 {
        (self.0 >> 56) as u8
    }

    #[inline(always)]
    fn is_empty(self) -> bool {
        self.depth8() == 0
    }

    fn pack(key16: u16, mv: Move, score: i16, depth8: u8, genbound8: u8) -> PackedEntry {
        PackedEntry(
            key16 as u64
                | (mv.raw() as u64) << 16
                | (score as u16 as u64) << 32
                | (depth8 as u64) << 48
                | (genbound8 as u64) << 56,
        )
    }

    /// Generations elapsed since this entry was written, in units of `GENERATION_DELTA`.
    #[inline(always)]
    fn relative_age(self, generation: u8) -> i32 {
        ((GENERATION_CYCLE + generation as u16 - self.genbound8() as u16) & GENERATION_MASK) as i32
    }

    fn data(self) -> TTData {
        TTData {
            mv: self.mv(),
            score: self.score() as i32,
            depth: self.depth8() as i32 - DEPTH_OFFSET,
            flag: TTFlag::from_bits(self.genbound8()),
            is_pv: self.genbound8() & 4 != 0,
        }
    }
}

#[repr(align(32))]
#[derive(Default)]
struct Cluster {
    entries: [AtomicU64; ENTRIES_PER_CLUSTER],
    _padding: u64,
}

/// Handle to the slot chosen by [`TranspositionTable::probe`].
pub struct TTWriter<'a> {
    entry: &'a AtomicU64,
    generation: u8,
}

impl TTWriter<'_> {
    /// Store a search result, keeping the old entry when it is clearly more valuable.
    pub fn write(&self, hash: u64, score: i32, is_pv: bool, flag: TTFlag, depth: i32, mv: Move) {
        let old = PackedEntry(self.entry.load(Ordering::Relaxed));
        let key16 = hash as u16;
        let same_position = !old.is_empty() && old.key16() == key16;

        let mv = if mv.is_none() && same_position { old.mv() } else { mv };

        let depth8 = (depth + DEPTH_OFFSET).clamp(1, 255);
        if flag == TTFlag::Exact
            || !same_position
            || depth8 + 2 * is_pv as i32 > old.depth8() as i32 - 4
            || old.relative_age(self.generation) != 0
        {
            let genbound8 = self.generation | (is_pv as u8) << 2 | flag as u8;
            let score = score.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            let packed = PackedEntry::pack(key16, mv, score, depth8 as u8, genbound8);
            self.entry.store(packed.0, Ordering::Relaxed);
        } else if mv != old.mv() {
            let packed = PackedEntry::pack(key16, mv, old.score(), old.depth8(), old.genbound8());
            self.entry.store(packed.0, Ordering::Relaxed);
        }
    }
}

/// Transposition table for caching search results
pub struct TranspositionTable {
    clusters: Vec<Cluster>,
    generation: AtomicU8,
}

impl TranspositionTable {
    /// Create a table using about `size_mb` megabytes.
    pub fn new(size_mb: usize) -> Result<Self, EngineError> {
        let clusters = Self::allocate(size_mb)?;
        Ok(TranspositionTable {
            clusters,
            generation: AtomicU8::new(0),
        })
    }

    fn allocate(size_mb: usize) -> Result<Vec<Cluster>, EngineError> {
        let count = (size_mb.max(1) * 1024 * 1024 / std::mem::size_of::<Cluster>()).max(1);
        let mut clusters = Vec::new();
        if clusters.try_reserve_exact(count).is_err() {
            warn!("failed to allocate a {size_mb} MiB transposition table");
            return Err(EngineError::HashAllocation(size_mb));
        }
        clusters.resize_with(count, Cluster::default);
        debug!("transposition table: {size_mb} MiB, {count} clusters");
        Ok(clusters)
    }

    /// Replace the table with a freshly cleared one of a new size. On failure
    /// the current table is left untouched.
    pub fn resize(&mut self, size_mb: usize) -> Result<(), EngineError> {
        self.clusters = Self::allocate(size_mb)?;
        self.generation.store(0, Ordering::Relaxed);
        Ok(())
    }

    pub fn size_mb(&self) -> usize {
        self.clusters.len() * std::mem::size_of::<Cluster>() / (1024 * 1024)
    }

    #[inline(always)]
    fn cluster(&self, hash: u64) -> &Cluster {
        let index = ((hash as u128 * self.clusters.len() as u128) >> 64) as usize;
        &self.clusters[index]
    }

    #[inline(always)]
    fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Start a new search generation. Called once per `go`.
    pub fn new_search(&self) {
        self.generation.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    /// Look up `hash`. Returns whether a matching entry was found, its contents,
    /// and a writer for the slot to update (the match, an empty slot, or the
    /// least valuable entry in the cluster).
    pub fn probe(&self, hash: u64) -> (bool, TTData, TTWriter<'_>) {
        let cluster = self.cluster(hash);
        let key16 = hash as u16;
        let generation = self.generation();

        for slot in &cluster.entries {
            let entry = PackedEntry(slot.load(Ordering::Relaxed));
            if !entry.is_empty() && entry.key16() == key16 {
                // Refresh the generation so the entry survives this search.
                let refreshed = (entry.0 & !(0xF8u64 << 56)) | ((generation as u64) << 56);
                if refreshed != entry.0 {
                    slot.store(refreshed, Ordering::Relaxed);
                }
                return (true, entry.data(), TTWriter { entry: slot, generation });
            }
        }

        let mut replace = &cluster.entries[0];
        let mut replace_value = i32::MAX;
        for slot in &cluster.entries {
            let entry = PackedEntry(slot.load(Ordering::Relaxed));
            if entry.is_empty() {
                return (false, TTData::EMPTY, TTWriter { entry: slot, generation });
            }
            let value = entry.depth8() as i32 - entry.relative_age(generation);
            if value < replace_value {
                replace_value = value;
                replace = slot;
            }
        }
        (false, TTData::EMPTY, TTWriter { entry: replace, generation })
    }

    /// Zero every entry, in parallel.
    pub fn clear(&self) {
        self.clusters.par_iter().for_each(|cluster| {
            for slot in &cluster.entries {
                slot.store(0, Ordering::Relaxed);
            }
        });
        self.generation.store(0, Ordering::Relaxed);
    }

    /// Per-mille of sampled entries written during the current search.
    pub fn hashfull(&self) -> usize {
        let generation = self.generation();
        let sample = self.clusters.len().min(1000);
        let used: usize = self.clusters[..sample]
            .iter()
            .map(|cluster| {
                cluster
                    .entries
                    .iter()
                    .map(|slot| PackedEntry(slot.load(Ordering::Relaxed)))
                    .filter(|e| !e.is_empty() && e.relative_age(generation) == 0)
                    .count()
            })
            .sum();
        used * 1000 / (sample * ENTRIES_PER_CLUSTER).max(1)
    }

    /// Visit every live entry as `(key16, data)`.
    pub fn for_each_entry<F: FnMut(u16, TTData)>(&self, mut f: F) {
        for cluster in &self.clusters {
            for slot in &cluster.entries {
                let entry = PackedEntry(slot.load(Ordering::Relaxed));
                if !entry.is_empty() {
                    f(entry.key16(), entry.data());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PieceType, Square};

    fn some_move() -> Move {
        Move::new_drop(PieceType::Gold, Square::new(4, 4))
    }

    #[test]
    fn test_store_and_probe() {
        let tt = TranspositionTable::new(1).unwrap();
        let hash = 0x1234_5678_9ABC_DEF0;

        let (found, _, writer) = tt.probe(hash);
        assert!(!found);
        writer.write(hash, -150, true, TTFlag::LowerBound, 7, some_move());

        let (found, data, _) = tt.probe(hash);
        assert!(found);
        assert_eq!(data.score, -150);
        assert_eq!(data.depth, 7);
        assert_eq!(data.flag, Some(TTFlag::LowerBound));
        assert_eq!(data.mv, some_move());
        assert!(data.is_pv);
    }

    #[test]
    fn test_shallow_write_keeps_deeper_entry_move() {
        let tt = TranspositionTable::new(1).unwrap();
        let hash = 0xDEAD_BEEF_0000_0001;
        tt.probe(hash).2.write(hash, 10, false, TTFlag::LowerBound, 12, some_move());
        // A shallow bound without a move does not overwrite the deep entry
        tt.probe(hash).2.write(hash, 99, false, TTFlag::UpperBound, 1, Move::NONE);
        let (found, data, _) = tt.probe(hash);
        assert!(found);
        assert_eq!(data.depth, 12);
        assert_eq!(data.score, 10);
        assert_eq!(data.mv, some_move());
    }

    #[test]
    fn test_replacement_prefers_shallow_and_old_entries() {
        let tt = TranspositionTable::new(1).unwrap();
        // Same cluster (identical high bits), different key fragments
        let base = 0x4000_0000_0000_0000u64;
        let hashes = [base | 1, base | 2, base | 3];
        for (i, &h) in hashes.iter().enumerate() {
            tt.probe(h).2.write(h, 0, false, TTFlag::Exact, 10 - i as i32 * 4, Move::NONE);
        }
        let newcomer = base | 4;
        tt.probe(newcomer).2.write(newcomer, 0, false, TTFlag::Exact, 5, Move::NONE);
        // The depth-2 entry was the cheapest to lose
        assert!(!tt.probe(base | 3).0);
        assert!(tt.probe(base | 1).0);
        assert!(tt.probe(newcomer).0);

        // After a few generations even the deepest entry becomes replaceable
        for _ in 0..4 {
            tt.new_search();
        }
        let fresh = base | 5;
        let (_, _, writer) = tt.probe(fresh);
        writer.write(fresh, 0, false, TTFlag::Exact, 1, Move::NONE);
        assert!(tt.probe(fresh).0);
    }

    #[test]
    fn test_clear_and_hashfull() {
        let tt = TranspositionTable::new(1).unwrap();
        assert_eq!(tt.hashfull(), 0);
        for i in 0..200_000u64 {
            let h = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            tt.probe(h).2.write(h, 1, false, TTFlag::Exact, 3, Move::NONE);
        }
        assert!(tt.hashfull() > 500);
        tt.clear();
        assert_eq!(tt.hashfull(), 0);
        assert!(!tt.probe(0x9E37_79B9_7F4A_7C15).0);
    }

    #[test]
    fn test_resize_keeps_table_usable() {
        let mut tt = TranspositionTable::new(1).unwrap();
        tt.resize(2).unwrap();
        assert_eq!(tt.size_mb(), 2);
        let (found, _, writer) = tt.probe(42);
        assert!(!found);
        writer.write(42, 5, false, TTFlag::Exact, 1, Move::NONE);
        assert!(tt.probe(42).0);
    }

    #[test]
    fn test_concurrent_writes_are_never_torn() {
        let tt = TranspositionTable::new(1).unwrap();
        // Every field is derived from the key fragment, so any entry whose
        // fields disagree with its own key would reveal a torn write.
        let derive = |key16: u16| (key16 as i16 as i32 / 4, Move::from_raw(key16 | 0x8000));
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let tt = &tt;
                s.spawn(move || {
                    let mut h = 0x0123_4567_89AB_CDEFu64.wrapping_add(t);
                    for _ in 0..100_000 {
                        h ^= h << 13;
                        h ^= h >> 7;
                        h ^= h << 17;
                        let (score, mv) = derive(h as u16);
                        tt.probe(h).2.write(h, score, t % 2 == 0, TTFlag::Exact, (h % 20) as i32, mv);
                    }
                });
            }
        });
        let mut live = 0;
        tt.for_each_entry(|key16, data| {
            let (score, mv) = derive(key16);
            assert_eq!(data.score, score);
            assert_eq!(data.mv, mv);
            live += 1;
        });
        assert!(live > 0);
    }
}
