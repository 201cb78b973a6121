//! Fixed-capacity move buffer used by generation and the move picker.
//!
//! Lives on the stack of every search node, so it never allocates.

use std::fmt;

use crate::types::Move;

/// Capacity of a move list. The largest known legal move count in shogi is
/// 593, and pseudo-legal generation for that position stays below this cap.
pub const MAX_MOVES: usize = 1024;

/// A move and its ordering key.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoredMove {
    pub mv: Move,
    pub score: i32,
}

#[derive(Clone)]
pub struct MoveList {
    entries: [ScoredMove; MAX_MOVES],
    len: usize,
}

impl MoveList {
    #[inline(always)]
    pub const fn new() -> Self {
        MoveList {
            entries: [ScoredMove { mv: Move::NONE, score: 0 }; MAX_MOVES],
            len: 0,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, mv: Move) {
        debug_assert!(self.len < MAX_MOVES, "move list overflow");
        self.entries[self.len] = ScoredMove { mv, score: 0 };
        self.len += 1;
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> Move {
        self.entries[..self.len][idx].mv
    }

    #[inline(always)]
    pub fn score(&self, idx: usize) -> i32 {
        self.entries[..self.len][idx].score
    }

    #[inline(always)]
    pub fn set_score(&mut self, idx: usize, score: i32) {
        self.entries[..self.len][idx].score = score;
    }

    /// Swap the highest-scored entry in `start..` into `start` and return its move.
    /// Ties keep generation order.
    #[inline]
    pub fn pick_best(&mut self, start: usize) -> Move {
        let tail = &mut self.entries[start..self.len];
        let mut best = 0;
        for (i, entry) in tail.iter().enumerate().skip(1) {
            if entry.score > tail[best].score {
                best = i;
            }
        }
        tail.swap(0, best);
        tail[0].mv
    }

    /// Drop every move `keep` rejects, preserving order and scores.
    pub fn retain<F: FnMut(Move) -> bool>(&mut self, mut keep: F) {
        let mut kept = 0;
        for i in 0..self.len {
            let entry = self.entries[i];
            if keep(entry.mv) {
                self.entries[kept] = entry;
                kept += 1;
            }
        }
        self.len = kept;
    }

    pub fn contains(&self, mv: Move) -> bool {
        self.iter().any(|m| m == mv)
    }

    /// Moves by value, so the list can be walked while the position changes.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Move> + '_ {
        self.entries[..self.len].iter().map(|entry| entry.mv)
    }
}

impl Default for MoveList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MoveList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
