//! Alpha-beta search.
//!
//! One [`Worker`] runs per thread. Each worker owns its position, evaluator and
//! histories, and shares only the transposition table and the
//! [`SearchControl`] with the others. Nodes are specialised at compile time by
//! [`NodeType`]: the root, principal-variation nodes searched with a full
//! window, and null-window nodes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use once_cell::sync::Lazy;

use crate::evaluate::{piece_value, Evaluator};
use crate::history::{recent_moves, stat_bonus, Histories};
use crate::movepicker::MovePicker;
use crate::notation::{format_moves, Dialect};
use crate::position::{Position, Repetition};
use crate::tt::{TTData, TTFlag, TranspositionTable};
use crate::types::{Color, Move, Piece, PieceType};

pub const MAX_PLY: usize = 128;
pub const MATE: i32 = 32_000;
pub const INFINITE: i32 = 32_001;
pub const DRAW: i32 = 0;
/// Scores at or beyond this magnitude are mates.
pub const MATE_IN_MAX_PLY: i32 = MATE - MAX_PLY as i32;
/// Depth recorded for quiescence entries in the transposition table
pub const DEPTH_QS: i32 = 0;

/// Nodes between publishing the node count and checking limits
const NODE_CHECK_INTERVAL: u64 = 1024;
const ASPIRATION_DELTA: i32 = 30;
const RFP_MAX_DEPTH: i32 = 7;
const RFP_MARGIN: i32 = 110;
const LMP_MAX_DEPTH: i32 = 3;
const QS_FUTILITY_MARGIN: i32 = 150;
const MAX_TRIED: usize = 48;

/// Depth pattern that keeps helper threads off the main thread's schedule
const SKIP_SIZE: [i32; 20] = [1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];
const SKIP_PHASE: [i32; 20] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7];

static REDUCTIONS: Lazy<[[i32; 64]; 64]> = Lazy::new(|| {
    let mut table = [[0; 64]; 64];
    for (depth, row) in table.iter_mut().enumerate().skip(1) {
        for (count, r) in row.iter_mut().enumerate().skip(1) {
            *r = (0.5 + (depth as f64).ln() * (count as f64).ln() / 2.25) as i32;
        }
    }
    table
});

#[inline]
fn reduction(depth: i32, move_count: usize) -> i32 {
    REDUCTIONS[(depth.max(0) as usize).min(63)][move_count.min(63)]
}

#[inline]
fn late_move_threshold(depth: i32) -> usize {
    (8 + 4 * depth * depth) as usize
}

#[inline(always)]
pub const fn mate_in(ply: usize) -> i32 {
    MATE - ply as i32
}

#[inline(always)]
pub const fn mated_in(ply: usize) -> i32 {
    -MATE + ply as i32
}

/// Mate scores are stored relative to the node rather than the root.
#[inline]
pub fn value_to_tt(score: i32, ply: usize) -> i32 {
    if score >= MATE_IN_MAX_PLY {
        score + ply as i32
    } else if score <= -MATE_IN_MAX_PLY {
        score - ply as i32
    } else {
        score
    }
}

#[inline]
pub fn value_from_tt(score: i32, ply: usize) -> i32 {
    if score >= MATE_IN_MAX_PLY {
        score - ply as i32
    } else if score <= -MATE_IN_MAX_PLY {
        score + ply as i32
    } else {
        score
    }
}

/// Whether a stored bound settles the window without searching.
#[inline]
fn tt_cutoff(data: &TTData, score: i32, alpha: i32, beta: i32) -> bool {
    match data.flag {
        Some(TTFlag::Exact) => true,
        Some(TTFlag::LowerBound) => score >= beta,
        Some(TTFlag::UpperBound) => score <= alpha,
        None => false,
    }
}

// =============================================================================
// Limits and time management
// =============================================================================

/// Limits for one `go` command.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Remaining clock time per color (ms)
    pub time: [Option<u64>; Color::NUM],
    /// Increment per move per color (ms)
    pub increment: [u64; Color::NUM],
    /// Time granted per move once the main time is used up (ms)
    pub byoyomi: u64,
    pub movestogo: Option<u32>,
    /// Exact time to search (ms)
    pub movetime: Option<u64>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    /// Search until stopped
    pub infinite: bool,
    /// Search on the opponent's time until `ponderhit` or `stop`
    pub ponder: bool,
    /// Restrict the root to these moves
    pub search_moves: Vec<Move>,
}

impl SearchLimits {
    pub fn with_depth(depth: i32) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    pub fn with_nodes(nodes: u64) -> Self {
        Self {
            nodes: Some(nodes),
            ..Default::default()
        }
    }

    pub fn with_movetime(ms: u64) -> Self {
        Self {
            movetime: Some(ms),
            ..Default::default()
        }
    }

    pub fn with_time(us: Color, time_left: u64, increment: u64) -> Self {
        let mut limits = Self::default();
        limits.time[us.index()] = Some(time_left);
        limits.increment[us.index()] = increment;
        limits
    }

    pub fn is_timed(&self) -> bool {
        self.movetime.is_some() || self.time.iter().any(Option::is_some) || self.byoyomi > 0
    }
}

/// Calculate time allocation for a move given clock state.
/// Returns `(soft_limit_ms, hard_limit_ms)`, or `None` for untimed searches.
pub fn allocate_time(limits: &SearchLimits, us: Color, overhead_ms: u64) -> Option<(u64, u64)> {
    if let Some(movetime) = limits.movetime {
        let budget = movetime.saturating_sub(overhead_ms).max(1);
        return Some((budget, budget));
    }
    if !limits.is_timed() {
        return None;
    }
    let time_left = limits.time[us.index()].unwrap_or(0);
    let increment = limits.increment[us.index()];
    let byoyomi = limits.byoyomi;
    let available = (time_left + byoyomi).saturating_sub(overhead_ms).max(1);

    // Estimate moves remaining in game
    let moves_to_go = limits.movestogo.unwrap_or(30).max(1) as u64;
    let base = time_left / moves_to_go + increment * 3 / 4;

    // Soft limit: target time for this move; hard limit: never exceed
    let soft = base.min(time_left / 4) + byoyomi;
    let hard = (soft * 3).min(time_left / 3 + byoyomi);

    Some((soft.clamp(1, available), hard.clamp(1, available)))
}

/// State shared by every worker of one search: stop signal, clock and node counters.
#[derive(Debug)]
pub struct SearchControl {
    stop: AtomicBool,
    pondering: AtomicBool,
    start_time: Instant,
    /// Milliseconds after `start_time` at which our clock started (moved by `ponderhit`)
    clock_origin_ms: AtomicU64,
    soft_limit_ms: Option<u64>,
    hard_limit_ms: Option<u64>,
    node_limit: Option<u64>,
    nodes: Vec<AtomicU64>,
}

impl SearchControl {
    pub fn new(limits: &SearchLimits, us: Color, overhead_ms: u64, threads: usize) -> Self {
        let budget = allocate_time(limits, us, overhead_ms);
        Self {
            stop: AtomicBool::new(false),
            pondering: AtomicBool::new(limits.ponder),
            start_time: Instant::now(),
            clock_origin_ms: AtomicU64::new(0),
            soft_limit_ms: budget.map(|(soft, _)| soft),
            hard_limit_ms: budget.map(|(_, hard)| hard),
            node_limit: limits.nodes,
            nodes: (0..threads.max(1)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Signal every worker to stop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_pondering(&self) -> bool {
        self.pondering.load(Ordering::Acquire)
    }

    /// The opponent played the expected move: our clock starts now.
    pub fn ponderhit(&self) {
        self.clock_origin_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        self.pondering.store(false, Ordering::Release);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn clock_ms(&self) -> u64 {
        self.elapsed_ms()
            .saturating_sub(self.clock_origin_ms.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn publish_nodes(&self, worker: usize, nodes: u64) {
        if let Some(counter) = self.nodes.get(worker) {
            counter.store(nodes, Ordering::Relaxed);
        }
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes.iter().map(|n| n.load(Ordering::Relaxed)).sum()
    }

    pub fn node_limit_reached(&self) -> bool {
        self.node_limit.is_some_and(|limit| self.total_nodes() >= limit)
    }

    pub fn hard_limit_reached(&self) -> bool {
        !self.is_pondering() && self.hard_limit_ms.is_some_and(|hard| self.clock_ms() >= hard)
    }

    pub fn soft_limit_reached(&self) -> bool {
        !self.is_pondering() && self.soft_limit_ms.is_some_and(|soft| self.clock_ms() >= soft)
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Callback for `info` output during search
pub type InfoCallback = Box<dyn Fn(SearchInfo) + Send + Sync>;
/// Called once with the final result of a search
pub type FinishCallback = Box<dyn Fn(&SearchOutcome) + Send + Sync>;

/// Format a score as `cp <n>` or `mate <n>`. USI counts mate distance in
/// plies, the UCI-style dialect in moves.
pub fn format_score(score: i32, dialect: Dialect) -> String {
    if score.abs() < MATE_IN_MAX_PLY {
        return format!("cp {score}");
    }
    let plies = MATE - score.abs();
    let distance = match dialect {
        Dialect::Usi => plies,
        Dialect::Uci => (plies + 1) / 2,
    };
    if score > 0 {
        format!("mate {distance}")
    } else {
        format!("mate -{distance}")
    }
}

/// Information about search progress
#[derive(Clone, Debug)]
pub struct SearchInfo {
    pub depth: i32,
    pub sel_depth: usize,
    pub score: i32,
    pub nodes: u64,
    pub time_ms: u64,
    pub nps: u64,
    pub hashfull: usize,
    pub pv: Vec<Move>,
}

impl SearchInfo {
    pub fn to_protocol(&self, dialect: Dialect) -> String {
        format!(
            "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} time {} pv {}",
            self.depth,
            self.sel_depth,
            format_score(self.score, dialect),
            self.nodes,
            self.nps,
            self.hashfull,
            self.time_ms,
            format_moves(&self.pv, dialect)
        )
    }
}

/// Final answer of a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOutcome {
    /// `Move::NONE` when there is no legal move
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: i32,
    pub depth: i32,
    pub nodes: u64,
    pub pv: Vec<Move>,
}

/// What one worker found at its deepest completed iteration.
#[derive(Clone, Debug)]
pub struct WorkerResult {
    pub id: usize,
    pub best_move: Move,
    pub score: i32,
    pub depth: i32,
    pub sel_depth: usize,
    pub pv: Vec<Move>,
    pub nodes: u64,
}

/// Everything the workers need for one search. Shared through an `Arc`.
pub struct SearchJob {
    pub root: Position,
    /// Legal root moves, already filtered by `searchmoves`
    pub root_moves: Vec<Move>,
    pub limits: SearchLimits,
    pub tt: Arc<TranspositionTable>,
    pub control: Arc<SearchControl>,
    pub on_info: Option<InfoCallback>,
    pub on_finish: Option<FinishCallback>,
}

// =============================================================================
// Node types
// =============================================================================

pub trait NodeType {
    const PV: bool;
    const ROOT: bool;
}

pub struct Root;
pub struct Pv;
pub struct NonPv;

impl NodeType for Root {
    const PV: bool = true;
    const ROOT: bool = true;
}

impl NodeType for Pv {
    const PV: bool = true;
    const ROOT: bool = false;
}

impl NodeType for NonPv {
    const PV: bool = false;
    const ROOT: bool = false;
}

#[derive(Debug, Clone)]
pub struct RootMove {
    pub mv: Move,
    pub score: i32,
    pub previous_score: i32,
    /// Running average of this move's scores across iterations
    pub average_score: i32,
    pub sel_depth: usize,
    pub pv: Vec<Move>,
}

impl RootMove {
    fn new(mv: Move) -> Self {
        RootMove {
            mv,
            score: -INFINITE,
            previous_score: -INFINITE,
            average_score: -INFINITE,
            sel_depth: 0,
            pv: vec![mv],
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

pub struct Worker<'a> {
    id: usize,
    job: &'a SearchJob,
    pos: Position,
    eval: &'a mut (dyn Evaluator + 'static),
    hist: &'a mut Histories,
    root_moves: Vec<RootMove>,
    pv_table: Box<[[Move; MAX_PLY + 1]; MAX_PLY + 1]>,
    pv_len: [usize; MAX_PLY + 1],
    nodes: u64,
    sel_depth: usize,
}

impl<'a> Worker<'a> {
    pub fn new(
        id: usize,
        job: &'a SearchJob,
        eval: &'a mut (dyn Evaluator + 'static),
        hist: &'a mut Histories,
    ) -> Self {
        let pos = job.root.clone();
        eval.reset(&pos);
        hist.clear_killers();
        Worker {
            id,
            job,
            pos,
            eval,
            hist,
            root_moves: job.root_moves.iter().map(|&mv| RootMove::new(mv)).collect(),
            pv_table: Box::new([[Move::NONE; MAX_PLY + 1]; MAX_PLY + 1]),
            pv_len: [0; MAX_PLY + 1],
            nodes: 0,
            sel_depth: 0,
        }
    }

    #[inline(always)]
    fn is_main(&self) -> bool {
        self.id == 0
    }

    #[inline(always)]
    fn stopped(&self) -> bool {
        self.job.control.is_stopped()
    }

    #[inline]
    fn count_node(&mut self) {
        self.nodes += 1;
        if self.nodes % NODE_CHECK_INTERVAL == 0 {
            let control = &self.job.control;
            control.publish_nodes(self.id, self.nodes);
            // Every worker enforces the node budget; only the main thread watches the clock.
            if control.node_limit_reached() || (self.is_main() && control.hard_limit_reached()) {
                control.stop();
            }
        }
    }

    #[inline]
    fn evaluate(&self) -> i32 {
        self.eval.evaluate(&self.pos)
    }

    fn update_pv(&mut self, ply: usize, mv: Move) {
        let child_len = self.pv_len[ply + 1].max(ply + 1);
        let (upper, lower) = self.pv_table.split_at_mut(ply + 1);
        upper[ply][ply] = mv;
        upper[ply][ply + 1..child_len].copy_from_slice(&lower[0][ply + 1..child_len]);
        self.pv_len[ply] = child_len;
    }

    /// Iterative deepening. Returns the result of the deepest completed iteration.
    pub fn run(&mut self) -> WorkerResult {
        let mut result = WorkerResult {
            id: self.id,
            best_move: Move::NONE,
            score: mated_in(0),
            depth: 0,
            sel_depth: 0,
            pv: Vec::new(),
            nodes: 0,
        };
        if self.root_moves.is_empty() {
            return result;
        }

        let max_depth = self
            .job
            .limits
            .depth
            .unwrap_or(MAX_PLY as i32 - 1)
            .clamp(1, MAX_PLY as i32 - 1);
        let mut previous_score = -INFINITE;

        for root_depth in 1..=max_depth {
            if self.stopped() {
                break;
            }
            if !self.is_main() {
                let i = (self.id - 1) % SKIP_SIZE.len();
                if ((root_depth + SKIP_PHASE[i]) / SKIP_SIZE[i]) % 2 != 0 {
                    continue;
                }
            }

            self.sel_depth = 0;
            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }

            let mut delta = ASPIRATION_DELTA;
            let (mut alpha, mut beta) = if root_depth >= 4 && previous_score.abs() < MATE_IN_MAX_PLY {
                (previous_score - delta, previous_score + delta)
            } else {
                (-INFINITE, INFINITE)
            };

            loop {
                let score = self.search::<Root>(root_depth, alpha, beta, 0, false);
                // Stable: moves that were not searched keep their previous order
                self.root_moves.sort_by(|a, b| b.score.cmp(&a.score));
                if self.stopped() {
                    break;
                }
                if score <= alpha {
                    beta = (alpha + beta) / 2;
                    alpha = (score - delta).max(-INFINITE);
                } else if score >= beta {
                    beta = (score + delta).min(INFINITE);
                } else {
                    break;
                }
                delta += delta / 2;
            }

            if self.stopped() {
                break;
            }

            let best = &self.root_moves[0];
            previous_score = best.score;
            result = WorkerResult {
                id: self.id,
                best_move: best.mv,
                score: best.score,
                depth: root_depth,
                sel_depth: best.sel_depth,
                pv: best.pv.clone(),
                nodes: self.nodes,
            };

            if self.is_main() {
                self.report(&result);
                if self.should_stop_after_iteration() {
                    self.job.control.stop();
                }
            }
        }

        self.job.control.publish_nodes(self.id, self.nodes);
        result.nodes = self.nodes;
        result
    }

    fn should_stop_after_iteration(&self) -> bool {
        let control = &self.job.control;
        let limits = &self.job.limits;
        if limits.infinite || control.is_pondering() {
            return false;
        }
        control.soft_limit_reached() || (limits.is_timed() && self.root_moves.len() == 1)
    }

    fn report(&self, result: &WorkerResult) {
        let control = &self.job.control;
        control.publish_nodes(self.id, self.nodes);
        let nodes = control.total_nodes();
        let time_ms = control.elapsed_ms();
        debug!(
            "depth {} score {} nodes {} best {:?}",
            result.depth, result.score, nodes, result.best_move
        );
        if let Some(on_info) = &self.job.on_info {
            on_info(SearchInfo {
                depth: result.depth,
                sel_depth: result.sel_depth,
                score: result.score,
                nodes,
                time_ms,
                nps: nodes * 1000 / time_ms.max(1),
                hashfull: self.job.tt.hashfull(),
                pv: result.pv.clone(),
            });
        }
    }

    fn search<N: NodeType>(
        &mut self,
        depth: i32,
        mut alpha: i32,
        mut beta: i32,
        ply: usize,
        cut_node: bool,
    ) -> i32 {
        if depth <= 0 {
            return if N::PV {
                self.qsearch::<Pv>(alpha, beta, ply)
            } else {
                self.qsearch::<NonPv>(alpha, beta, ply)
            };
        }
        if self.stopped() {
            return DRAW;
        }
        self.count_node();
        if N::PV {
            self.pv_len[ply] = ply;
            self.sel_depth = self.sel_depth.max(ply + 1);
        }
        let in_check = self.pos.in_check();

        if !N::ROOT {
            if ply >= MAX_PLY {
                return if in_check { DRAW } else { self.evaluate() };
            }
            match self.pos.repetition() {
                Repetition::None => {}
                Repetition::Draw => return DRAW,
                Repetition::Win => return mate_in(ply),
                Repetition::Loss => return mated_in(ply),
            }
            // Mate distance pruning
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let job = self.job;
        let hash = self.pos.hash();
        let (tt_hit, tt_data, tt_writer) = job.tt.probe(hash);
        let tt_score = value_from_tt(tt_data.score, ply);
        let tt_move = if N::ROOT {
            self.root_moves[0].mv
        } else if tt_hit {
            tt_data.mv
        } else {
            Move::NONE
        };

        if !N::PV && tt_hit && tt_data.depth >= depth && tt_cutoff(&tt_data, tt_score, alpha, beta) {
            return tt_score;
        }

        if !N::PV && !in_check {
            let static_eval = self.evaluate();
            let eval = match tt_data.flag {
                Some(TTFlag::Exact) => tt_score,
                Some(TTFlag::LowerBound) if tt_score > static_eval => tt_score,
                Some(TTFlag::UpperBound) if tt_score < static_eval => tt_score,
                _ => static_eval,
            };

            // Reverse futility pruning
            if depth <= RFP_MAX_DEPTH && eval - RFP_MARGIN * depth >= beta && eval < MATE_IN_MAX_PLY {
                return eval;
            }

            // Null move pruning
            if depth >= 3
                && eval >= beta
                && beta > -MATE_IN_MAX_PLY
                && self.pos.last_move() != Move::NULL
            {
                let r = 3 + depth / 4;
                self.eval.notify_move(&self.pos, Move::NULL);
                self.pos.make_null_move();
                let score = -self.search::<NonPv>(depth - r, -beta, -beta + 1, ply + 1, !cut_node);
                self.pos.unmake_null_move();
                self.eval.notify_unmove();
                if self.stopped() {
                    return DRAW;
                }
                if score >= beta {
                    return if score >= MATE_IN_MAX_PLY { beta } else { score };
                }
            }
        }

        self.hist.reset_killers_at(ply + 1);
        let us = self.pos.side_to_move();
        let recent = recent_moves(&self.pos);
        let mut picker = MovePicker::new(&self.pos, tt_move, self.hist.killers(ply));
        let mut quiets_tried = [(Move::NONE, PieceType::Pawn); MAX_TRIED];
        let mut quiet_count = 0;
        let mut captures_tried = [(Move::NONE, Piece::new(us, PieceType::Pawn), PieceType::Pawn); MAX_TRIED];
        let mut capture_count = 0;

        let original_alpha = alpha;
        let mut best_score = -INFINITE;
        let mut best_move = Move::NONE;
        let mut move_count = 0usize;

        while let Some(mv) = picker.next_move(&self.pos, &*self.hist) {
            if N::ROOT {
                if !self.root_moves.iter().any(|rm| rm.mv == mv) {
                    continue;
                }
            } else if !self.pos.is_legal(mv) {
                continue;
            }
            let Some(moved) = self.pos.moved_piece(mv) else {
                continue;
            };
            move_count += 1;
            let captured = self.pos.captured_by(mv);
            let placed = if mv.is_promotion() {
                moved.piece_type.promote()
            } else {
                moved.piece_type
            };

            // Late move pruning
            if !N::PV
                && !in_check
                && captured.is_none()
                && depth <= LMP_MAX_DEPTH
                && best_score > -MATE_IN_MAX_PLY
                && move_count > late_move_threshold(depth)
            {
                continue;
            }

            if N::PV {
                self.pv_len[ply + 1] = ply + 1;
            }

            self.eval.notify_move(&self.pos, mv);
            self.pos.make_move(mv);
            let gives_check = self.pos.in_check();
            let new_depth = depth - 1;

            let mut score = -INFINITE;
            let full_depth_null_window;
            if depth >= 3
                && move_count > 1 + N::ROOT as usize
                && captured.is_none()
                && !in_check
                && !gives_check
            {
                let mut r = reduction(depth, move_count);
                if !N::PV {
                    r += 1;
                }
                if cut_node {
                    r += 1;
                }
                let reduced = (new_depth - r).clamp(1, new_depth);
                score = -self.search::<NonPv>(reduced, -(alpha + 1), -alpha, ply + 1, true);
                full_depth_null_window = score > alpha && reduced < new_depth;
            } else {
                full_depth_null_window = !N::PV || move_count > 1;
            }

            if full_depth_null_window {
                score = -self.search::<NonPv>(new_depth, -(alpha + 1), -alpha, ply + 1, !cut_node);
            }

            // Principal variation search: full window for the first move and for
            // null-window results that land inside the window
            if N::PV && (move_count == 1 || (score > alpha && (N::ROOT || score < beta))) {
                score = -self.search::<Pv>(new_depth, -beta, -alpha, ply + 1, false);
            }

            self.pos.unmake_move(mv);
            self.eval.notify_unmove();

            if self.stopped() {
                return DRAW;
            }

            if N::ROOT {
                let pv_tail = &self.pv_table[1][1..self.pv_len[1].max(1)];
                if let Some(rm) = self.root_moves.iter_mut().find(|rm| rm.mv == mv) {
                    rm.average_score = if rm.average_score == -INFINITE {
                        score
                    } else {
                        (rm.average_score + score) / 2
                    };
                    if move_count == 1 || score > alpha {
                        rm.score = score;
                        rm.sel_depth = self.sel_depth;
                        rm.pv.clear();
                        rm.pv.push(mv);
                        rm.pv.extend_from_slice(pv_tail);
                    } else {
                        rm.score = -INFINITE;
                    }
                }
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    best_move = mv;
                    if N::PV {
                        self.update_pv(ply, mv);
                    }
                    if score >= beta {
                        break;
                    }
                    alpha = score;
                }
            }

            if mv != best_move {
                match captured {
                    None if quiet_count < MAX_TRIED => {
                        quiets_tried[quiet_count] = (mv, placed);
                        quiet_count += 1;
                    }
                    Some(victim) if capture_count < MAX_TRIED => {
                        captures_tried[capture_count] = (mv, moved, victim.piece_type);
                        capture_count += 1;
                    }
                    _ => {}
                }
            }
        }

        // No legal move: checkmate. Shogi has no stalemate.
        if move_count == 0 {
            return mated_in(ply);
        }

        if best_score >= beta {
            let bonus = stat_bonus(depth);
            if let Some(moved) = self.pos.moved_piece(best_move) {
                match self.pos.captured_by(best_move) {
                    None => {
                        let placed = if best_move.is_promotion() {
                            moved.piece_type.promote()
                        } else {
                            moved.piece_type
                        };
                        self.hist.store_killer(ply, best_move);
                        self.hist.update_quiet_stats(
                            us,
                            (best_move, placed),
                            &quiets_tried[..quiet_count],
                            &recent,
                            bonus,
                        );
                    }
                    Some(victim) => {
                        self.hist.update_capture(moved, best_move.to(), victim.piece_type, bonus);
                    }
                }
            }
            for &(mv, piece, victim) in &captures_tried[..capture_count] {
                self.hist.update_capture(piece, mv.to(), victim, -bonus);
            }
        }

        let flag = if best_score >= beta {
            TTFlag::LowerBound
        } else if N::PV && best_score > original_alpha {
            TTFlag::Exact
        } else {
            TTFlag::UpperBound
        };
        tt_writer.write(hash, value_to_tt(best_score, ply), N::PV, flag, depth, best_move);

        best_score
    }

    /// Quiescence search: stand pat on the static evaluation and resolve
    /// captures. Every move is searched when in check.
    fn qsearch<N: NodeType>(&mut self, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if self.stopped() {
            return DRAW;
        }
        self.count_node();
        if N::PV {
            self.pv_len[ply] = ply;
            self.sel_depth = self.sel_depth.max(ply + 1);
        }
        let in_check = self.pos.in_check();
        if ply >= MAX_PLY {
            return if in_check { DRAW } else { self.evaluate() };
        }
        match self.pos.repetition() {
            Repetition::None => {}
            Repetition::Draw => return DRAW,
            Repetition::Win => return mate_in(ply),
            Repetition::Loss => return mated_in(ply),
        }

        let job = self.job;
        let hash = self.pos.hash();
        let (tt_hit, tt_data, tt_writer) = job.tt.probe(hash);
        let tt_score = value_from_tt(tt_data.score, ply);
        if !N::PV && tt_hit && tt_data.depth >= DEPTH_QS && tt_cutoff(&tt_data, tt_score, alpha, beta) {
            return tt_score;
        }

        let original_alpha = alpha;
        let mut best_score = -INFINITE;
        let mut futility_base = -INFINITE;
        if !in_check {
            best_score = self.evaluate();
            if best_score >= beta {
                if !tt_hit {
                    tt_writer.write(hash, value_to_tt(best_score, ply), false, TTFlag::LowerBound, DEPTH_QS, Move::NONE);
                }
                return best_score;
            }
            alpha = alpha.max(best_score);
            futility_base = best_score + QS_FUTILITY_MARGIN;
        }

        let tt_move = if tt_hit { tt_data.mv } else { Move::NONE };
        let mut picker = MovePicker::new_quiescence(&self.pos, tt_move);
        let mut best_move = Move::NONE;
        let mut move_count = 0usize;

        while let Some(mv) = picker.next_move(&self.pos, &*self.hist) {
            if !self.pos.is_legal(mv) {
                continue;
            }
            move_count += 1;

            // Skip captures that cannot lift the score to alpha
            if !in_check && !mv.is_promotion() {
                if let Some(victim) = self.pos.captured_by(mv) {
                    let gain = piece_value(victim.piece_type) + piece_value(victim.piece_type.demote());
                    let futility = futility_base + gain;
                    if futility <= alpha {
                        best_score = best_score.max(futility);
                        continue;
                    }
                }
            }

            if N::PV {
                self.pv_len[ply + 1] = ply + 1;
            }
            self.eval.notify_move(&self.pos, mv);
            self.pos.make_move(mv);
            let score = -self.qsearch::<N>(-beta, -alpha, ply + 1);
            self.pos.unmake_move(mv);
            self.eval.notify_unmove();

            if self.stopped() {
                return DRAW;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    best_move = mv;
                    if N::PV {
                        self.update_pv(ply, mv);
                    }
                    if score >= beta {
                        break;
                    }
                    alpha = score;
                }
            }
        }

        if in_check && move_count == 0 {
            return mated_in(ply);
        }

        let flag = if best_score >= beta {
            TTFlag::LowerBound
        } else if N::PV && best_score > original_alpha {
            TTFlag::Exact
        } else {
            TTFlag::UpperBound
        };
        tt_writer.write(hash, value_to_tt(best_score, ply), N::PV, flag, DEPTH_QS, best_move);
        best_score
    }
}
