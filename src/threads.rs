//! Lazy SMP thread pool.
//!
//! Every worker thread blocks on its own command channel. A search starts by
//! handing the job to worker 0, the main thread, which ages the transposition
//! table, wakes the helpers, runs its own iterative deepening and, once it is
//! done, stops the helpers and collects their results. The helpers share
//! nothing with the main thread except the table and the stop flag, so they
//! drift apart naturally and fill the table with useful entries.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::EngineError;
use crate::evaluate::Evaluator;
use crate::history::Histories;
use crate::search::{mated_in, SearchJob, SearchOutcome, Worker, WorkerResult, DRAW};
use crate::types::Move;

/// Search recursion keeps a move list and a picker on every frame.
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

enum Command {
    Search(Arc<SearchJob>),
    Clear(Sender<()>),
    Quit,
}

struct WorkerHandle {
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

pub struct ThreadPool {
    workers: Vec<WorkerHandle>,
    finished: Receiver<SearchOutcome>,
    searching: bool,
}

fn spawn_worker<F>(id: usize, body: F) -> Result<JoinHandle<()>, EngineError>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("search-{id}"))
        .stack_size(WORKER_STACK_SIZE)
        .spawn(body)?;
    Ok(handle)
}

impl ThreadPool {
    /// Spawn `threads` workers, each with its own copy of `evaluator`.
    pub fn new(threads: usize, evaluator: &dyn Evaluator) -> Result<Self, EngineError> {
        let threads = threads.max(1);
        let (result_tx, result_rx) = mpsc::channel::<WorkerResult>();
        let (finished_tx, finished_rx) = mpsc::channel::<SearchOutcome>();

        let mut workers = Vec::with_capacity(threads);
        let mut helper_commands = Vec::with_capacity(threads - 1);
        for id in 1..threads {
            let (tx, rx) = mpsc::channel();
            let eval = evaluator.box_clone();
            let results = result_tx.clone();
            let handle = spawn_worker(id, move || helper_loop(id, rx, eval, results))?;
            helper_commands.push(tx.clone());
            workers.push(WorkerHandle {
                commands: tx,
                handle: Some(handle),
            });
        }
        drop(result_tx);

        let (tx, rx) = mpsc::channel();
        let main = MainThread {
            commands: rx,
            helpers: helper_commands,
            results: result_rx,
            finished: finished_tx,
        };
        let eval = evaluator.box_clone();
        let handle = spawn_worker(0, move || main.run(eval))?;
        workers.insert(
            0,
            WorkerHandle {
                commands: tx,
                handle: Some(handle),
            },
        );

        info!("Thread pool started with {threads} worker(s)");
        Ok(ThreadPool {
            workers,
            finished: finished_rx,
            searching: false,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// A search was started and its outcome has not been collected yet.
    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// Hand a job to the main thread. Returns immediately.
    pub fn start_search(&mut self, job: Arc<SearchJob>) -> Result<(), EngineError> {
        if self.searching {
            return Err(EngineError::SearchInProgress);
        }
        self.workers[0]
            .commands
            .send(Command::Search(job))
            .map_err(|_| EngineError::Io(std::io::Error::other("search thread is gone")))?;
        self.searching = true;
        Ok(())
    }

    /// Block until the running search reports its outcome.
    pub fn wait(&mut self) -> Option<SearchOutcome> {
        if !self.searching {
            return None;
        }
        self.searching = false;
        self.finished.recv().ok()
    }

    /// Collect the outcome if the search already finished.
    pub fn try_collect(&mut self) -> Option<SearchOutcome> {
        if !self.searching {
            return None;
        }
        match self.finished.try_recv() {
            Ok(outcome) => {
                self.searching = false;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.searching = false;
                None
            }
        }
    }

    /// Reset every worker's histories. Must not be called during a search.
    pub fn clear(&mut self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        let mut pending = 0;
        for worker in &self.workers {
            if worker.commands.send(Command::Clear(ack_tx.clone())).is_ok() {
                pending += 1;
            }
        }
        drop(ack_tx);
        for _ in 0..pending {
            if ack_rx.recv().is_err() {
                break;
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.commands.send(Command::Quit);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("A search thread panicked");
                }
            }
        }
    }
}

fn helper_loop(id: usize, commands: Receiver<Command>, mut eval: Box<dyn Evaluator>, results: Sender<WorkerResult>) {
    let mut hist = Histories::new();
    while let Ok(command) = commands.recv() {
        match command {
            Command::Search(job) => {
                let result = Worker::new(id, &job, eval.as_mut(), &mut hist).run();
                if results.send(result).is_err() {
                    break;
                }
            }
            Command::Clear(ack) => {
                hist.clear();
                let _ = ack.send(());
            }
            Command::Quit => break,
        }
    }
    debug!("Helper {id} exiting");
}

struct MainThread {
    commands: Receiver<Command>,
    helpers: Vec<Sender<Command>>,
    results: Receiver<WorkerResult>,
    finished: Sender<SearchOutcome>,
}

impl MainThread {
    fn run(self, mut eval: Box<dyn Evaluator>) {
        let mut hist = Histories::new();
        while let Ok(command) = self.commands.recv() {
            match command {
                Command::Search(job) => {
                    let outcome = self.search(&job, eval.as_mut(), &mut hist);
                    if let Some(on_finish) = &job.on_finish {
                        on_finish(&outcome);
                    }
                    if self.finished.send(outcome).is_err() {
                        break;
                    }
                }
                Command::Clear(ack) => {
                    hist.clear();
                    let _ = ack.send(());
                }
                Command::Quit => break,
            }
        }
        debug!("Main search thread exiting");
    }

    fn search(&self, job: &Arc<SearchJob>, eval: &mut (dyn Evaluator + 'static), hist: &mut Histories) -> SearchOutcome {
        job.tt.new_search();
        let helpers = self
            .helpers
            .iter()
            .filter(|helper| helper.send(Command::Search(Arc::clone(job))).is_ok())
            .count();

        let own = Worker::new(0, job, eval, hist).run();

        // Under `go infinite` or while pondering, the answer waits for `stop` or `ponderhit`.
        while (job.limits.infinite || job.control.is_pondering()) && !job.control.is_stopped() {
            thread::sleep(Duration::from_millis(1));
        }
        job.control.stop();

        let mut results = Vec::with_capacity(helpers + 1);
        results.push(own);
        for _ in 0..helpers {
            match self.results.recv() {
                Ok(result) => results.push(result),
                Err(_) => break,
            }
        }

        let outcome = build_outcome(job, &results);
        debug!(
            "Search finished: {:?} depth {} score {} nodes {}",
            outcome.best_move, outcome.depth, outcome.score, outcome.nodes
        );
        outcome
    }
}

/// The deepest completed iteration wins; equal depths go to the higher score.
pub fn select_best(results: &[WorkerResult]) -> Option<&WorkerResult> {
    results
        .iter()
        .filter(|r| r.best_move.is_some() && r.depth > 0)
        .max_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(a.score.cmp(&b.score))
                .then(b.id.cmp(&a.id))
        })
}

fn build_outcome(job: &SearchJob, results: &[WorkerResult]) -> SearchOutcome {
    let nodes = results.iter().map(|r| r.nodes).sum();
    match select_best(results) {
        Some(best) => SearchOutcome {
            best_move: best.best_move,
            ponder_move: best.pv.get(1).copied().unwrap_or(Move::NONE),
            score: best.score,
            depth: best.depth,
            nodes,
            pv: best.pv.clone(),
        },
        // Stopped before the first iteration completed
        None => {
            let best_move = job.root_moves.first().copied().unwrap_or(Move::NONE);
            SearchOutcome {
                best_move,
                ponder_move: Move::NONE,
                score: if best_move.is_some() { DRAW } else { mated_in(0) },
                depth: 0,
                nodes,
                pv: if best_move.is_some() { vec![best_move] } else { Vec::new() },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::MaterialEvaluator;
    use crate::movegen::legal_moves;
    use crate::position::Position;
    use crate::search::{SearchControl, SearchLimits};
    use crate::tt::TranspositionTable;
    use std::sync::Mutex;

    fn result(id: usize, depth: i32, score: i32, mv: Move) -> WorkerResult {
        WorkerResult {
            id,
            best_move: mv,
            score,
            depth,
            sel_depth: 0,
            pv: vec![mv],
            nodes: 10,
        }
    }

    fn make_job(pos: Position, limits: SearchLimits, threads: usize) -> SearchJob {
        SearchJob {
            root_moves: legal_moves(&pos),
            control: Arc::new(SearchControl::new(&limits, pos.side_to_move(), 0, threads)),
            root: pos,
            limits,
            tt: Arc::new(TranspositionTable::new(4).unwrap()),
            on_info: None,
            on_finish: None,
        }
    }

    #[test]
    fn test_select_best_prefers_depth_then_score() {
        let a = Move::from_raw(0x1234);
        let b = Move::from_raw(0x0456);
        let c = Move::from_raw(0x0789);
        let results = vec![result(0, 6, 40, a), result(1, 7, -20, b), result(2, 7, 15, c)];
        assert_eq!(select_best(&results).map(|r| r.best_move), Some(c));

        let tied = vec![result(0, 5, 10, a), result(1, 5, 10, b)];
        assert_eq!(select_best(&tied).map(|r| r.id), Some(0));
    }

    #[test]
    fn test_outcome_falls_back_to_first_legal_move() {
        let job = make_job(Position::startpos(), SearchLimits::default(), 1);
        let unfinished = vec![result(0, 0, 0, Move::NONE)];
        let outcome = build_outcome(&job, &unfinished);
        assert_eq!(outcome.best_move, job.root_moves[0]);
        assert_eq!(outcome.depth, 0);
    }

    #[test]
    fn test_pool_search_with_helpers() {
        let mut pool = ThreadPool::new(3, &MaterialEvaluator::new()).unwrap();
        assert_eq!(pool.size(), 3);
        let finished = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&finished);
        let mut job = make_job(Position::startpos(), SearchLimits::with_depth(4), 3);
        job.on_finish = Some(Box::new(move |outcome: &SearchOutcome| {
            *sink.lock().unwrap() = Some(outcome.best_move);
        }));
        let legal = job.root_moves.clone();

        pool.start_search(Arc::new(job)).unwrap();
        let outcome = pool.wait().unwrap();
        assert!(legal.contains(&outcome.best_move));
        assert!(outcome.depth >= 4);
        assert_eq!(*finished.lock().unwrap(), Some(outcome.best_move));
        assert!(!pool.is_searching());
    }

    #[test]
    fn test_second_search_is_rejected_while_running() {
        let mut pool = ThreadPool::new(1, &MaterialEvaluator::new()).unwrap();
        let mut limits = SearchLimits::default();
        limits.infinite = true;
        let job = Arc::new(make_job(Position::startpos(), limits, 1));
        pool.start_search(Arc::clone(&job)).unwrap();
        assert!(matches!(
            pool.start_search(Arc::clone(&job)),
            Err(EngineError::SearchInProgress)
        ));
        assert!(pool.try_collect().is_none());
        job.control.stop();
        let outcome = pool.wait().unwrap();
        assert!(outcome.best_move.is_some());
        pool.clear();
    }
}
