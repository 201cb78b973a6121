//! Unified engine interface
//!
//! [`Engine`] owns everything that outlives a single search: the current
//! position, the options, the transposition table and the thread pool. The
//! protocol loop and the command-line tools talk only to this type.

use std::sync::Arc;

use log::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::evaluate::{Evaluator, MaterialEvaluator};
use crate::movegen::legal_moves;
use crate::notation::{parse_move, Dialect};
use crate::options::{EngineOptions, OptionChange};
use crate::position::Position;
use crate::search::{FinishCallback, InfoCallback, SearchControl, SearchJob, SearchLimits, SearchOutcome};
use crate::threads::ThreadPool;
use crate::tt::TranspositionTable;

pub struct Engine {
    options: EngineOptions,
    position: Position,
    tt: Arc<TranspositionTable>,
    pool: ThreadPool,
    evaluator: Box<dyn Evaluator>,
    /// Control block of the running search, if any
    control: Option<Arc<SearchControl>>,
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new() -> EngineResult<Self> {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> EngineResult<Self> {
        Self::with_evaluator(options, Box::new(MaterialEvaluator::new()))
    }

    /// Every search thread gets its own clone of `evaluator`.
    pub fn with_evaluator(options: EngineOptions, evaluator: Box<dyn Evaluator>) -> EngineResult<Self> {
        let tt = Arc::new(TranspositionTable::new(options.hash_mb)?);
        let pool = ThreadPool::new(options.threads, evaluator.as_ref())?;
        Ok(Engine {
            options,
            position: Position::startpos(),
            tt,
            pool,
            evaluator,
            control: None,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn hash_size_mb(&self) -> usize {
        self.tt.size_mb()
    }

    pub fn thread_count(&self) -> usize {
        self.pool.size()
    }

    /// Load `sfen` (or the initial position) and play `moves`. Nothing changes
    /// unless every move parses and is legal.
    pub fn set_position(&mut self, sfen: Option<&str>, moves: &[&str], dialect: Dialect) -> EngineResult<()> {
        let mut pos = match sfen {
            Some(text) => Position::from_sfen(text)?,
            None => Position::startpos(),
        };
        for &text in moves {
            let mv = parse_move(text, dialect)?;
            if !(pos.is_pseudo_legal(mv) && pos.is_legal(mv)) {
                return Err(EngineError::IllegalMove(text.to_string()));
            }
            pos.make_move(mv);
        }
        self.position = pos;
        Ok(())
    }

    /// Start searching the current position. Returns immediately; the result
    /// arrives through `on_finish` and [`Engine::wait`].
    pub fn go(
        &mut self,
        limits: SearchLimits,
        on_info: Option<InfoCallback>,
        on_finish: Option<FinishCallback>,
    ) -> EngineResult<()> {
        if self.pool.try_collect().is_some() {
            self.control = None;
        }
        if self.pool.is_searching() {
            return Err(EngineError::SearchInProgress);
        }

        let mut root_moves = legal_moves(&self.position);
        if !limits.search_moves.is_empty() {
            root_moves.retain(|mv| limits.search_moves.contains(mv));
        }
        let control = Arc::new(SearchControl::new(
            &limits,
            self.position.side_to_move(),
            self.options.move_overhead_ms,
            self.pool.size(),
        ));
        debug!("go: {} root moves, {:?}", root_moves.len(), limits);

        let job = SearchJob {
            root: self.position.clone(),
            root_moves,
            limits,
            tt: Arc::clone(&self.tt),
            control: Arc::clone(&control),
            on_info,
            on_finish,
        };
        self.pool.start_search(Arc::new(job))?;
        self.control = Some(control);
        Ok(())
    }

    /// Ask the running search to stop. Does not wait for it.
    pub fn stop(&self) {
        if let Some(control) = &self.control {
            control.stop();
        }
    }

    /// The opponent played the move we were pondering on.
    pub fn ponderhit(&self) {
        if let Some(control) = &self.control {
            control.ponderhit();
        }
    }

    /// Block until the running search finishes.
    pub fn wait(&mut self) -> Option<SearchOutcome> {
        let outcome = self.pool.wait();
        self.control = None;
        outcome
    }

    pub fn is_searching(&mut self) -> bool {
        if self.pool.try_collect().is_some() {
            self.control = None;
        }
        self.pool.is_searching()
    }

    /// Search and block for the answer.
    pub fn search_sync(&mut self, limits: SearchLimits) -> EngineResult<SearchOutcome> {
        self.go(limits, None, None)?;
        self.wait()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("search thread is gone")))
    }

    fn halt(&mut self) {
        self.stop();
        self.wait();
    }

    /// Forget everything learned in the previous game.
    pub fn new_game(&mut self) {
        self.halt();
        self.tt.clear();
        self.pool.clear();
        self.position = Position::startpos();
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> EngineResult<()> {
        let mut options = self.options.clone();
        match options.set(name, value)? {
            OptionChange::Hash => self.resize_hash(options.hash_mb)?,
            OptionChange::Threads => {
                self.halt();
                self.pool = ThreadPool::new(options.threads, self.evaluator.as_ref())?;
            }
            OptionChange::MoveOverhead | OptionChange::Ponder => {}
        }
        self.options = options;
        Ok(())
    }

    /// On allocation failure the current table stays in place.
    fn resize_hash(&mut self, size_mb: usize) -> EngineResult<()> {
        self.halt();
        match Arc::get_mut(&mut self.tt) {
            Some(tt) => tt.resize(size_mb)?,
            None => self.tt = Arc::new(TranspositionTable::new(size_mb)?),
        }
        info!("Hash resized to {size_mb} MiB");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.halt();
    }
}
