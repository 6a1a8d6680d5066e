//! Debounced, id-keyed coalescing timer.
//!
//! Work scheduled under an id waits until the current debounce window
//! closes. The window opens with the first schedule call after the previous
//! one fired and is never extended. Scheduling an id that is already
//! pending replaces its work in place, so only the latest registration for
//! an id runs, and every distinct id pending at the deadline runs exactly
//! once, in the order the ids were first registered.
//!
//! All work runs on one dedicated worker thread, so jobs never overlap.

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    id: String,
    job: Job,
}

#[derive(Default)]
struct State {
    pending: Vec<Pending>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    runs: AtomicU64,
}

/// A coalescing timer with a single worker thread.
pub struct Rescheduler {
    shared: Arc<Shared>,
    interval: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Rescheduler {
    /// Starts a rescheduler with the given debounce window.
    ///
    /// # Errors
    ///
    /// Fails if the worker thread cannot be spawned.
    pub fn new(config: &TrackerConfig) -> TrackerResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            runs: AtomicU64::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(&worker_shared))
            .map_err(|e| TrackerError::scheduler(e.to_string()))?;
        Ok(Self {
            shared,
            interval: config.debounce(),
            worker: Some(worker),
        })
    }

    /// The debounce window.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedules `work` under `id`; `callback` receives its result on the
    /// worker thread once the window closes.
    pub fn schedule<T, W, C>(&self, id: impl Into<String>, work: W, callback: C)
    where
        T: 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let id = id.into();
        let job: Job = Box::new(move || callback(work()));
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        match state.pending.iter_mut().find(|p| p.id == id) {
            Some(slot) => {
                trace!(id = %slot.id, "replacing pending work");
                slot.job = job;
            }
            None => state.pending.push(Pending { id, job }),
        }
        if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + self.interval);
            self.shared.wake.notify_one();
        }
    }

    /// Drops the pending work of `id` without running it. Returns true if
    /// something was pending.
    pub fn cancel(&self, id: &str) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.pending.len();
        state.pending.retain(|p| p.id != id);
        let removed = state.pending.len() != before;
        if state.pending.is_empty() {
            state.deadline = None;
        }
        removed
    }

    /// Disarms the timer and drops all pending work without running it.
    pub fn done(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.deadline = None;
        if dropped > 0 {
            debug!(dropped, "rescheduler done, pending work dropped");
        }
    }

    /// Returns true if work is pending under `id`.
    pub fn is_pending(&self, id: &str) -> bool {
        self.shared.state.lock().pending.iter().any(|p| p.id == id)
    }

    /// Number of ids with pending work.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of jobs run so far.
    pub fn runs(&self) -> u64 {
        self.shared.runs.load(Ordering::Relaxed)
    }
}

impl Drop for Rescheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending.clear();
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                warn!("rescheduler worker panicked");
            }
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => shared.wake.wait(&mut state),
            Some(deadline) if Instant::now() < deadline => {
                shared.wake.wait_until(&mut state, deadline);
            }
            Some(_) => {
                state.deadline = None;
                let batch = std::mem::take(&mut state.pending);
                MutexGuard::unlocked(&mut state, || fire(shared, batch));
            }
        }
    }
}

fn fire(shared: &Shared, batch: Vec<Pending>) {
    debug!(count = batch.len(), "debounce window closed");
    for Pending { id, job } in batch {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(id = %id, "scheduled work panicked");
        }
        shared.runs.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn rescheduler(ms: u64) -> Rescheduler {
        Rescheduler::new(&TrackerConfig::default().with_debounce(Duration::from_millis(ms))).unwrap()
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn latest_wins_for_an_id() {
        let r = rescheduler(30);
        let (tx, rx) = mpsc::channel();
        let tx_a = tx.clone();
        r.schedule("x", || "a", move |v| tx_a.send(v).unwrap());
        r.schedule("x", || "b", move |v| tx.send(v).unwrap());
        assert_eq!(r.pending_len(), 1);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "b");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(r.runs(), 1);
    }

    #[test]
    fn every_distinct_id_runs_once_in_order() {
        let r = rescheduler(30);
        let (tx, rx) = mpsc::channel();
        for id in ["x", "y", "z"] {
            let tx = tx.clone();
            r.schedule(id, move || id, move |v| tx.send(v).unwrap());
        }
        // Replacing keeps the original slot.
        let tx_x = tx.clone();
        r.schedule("x", || "x2", move |v| tx_x.send(v).unwrap());

        let fired: Vec<&str> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(fired, vec!["x2", "y", "z"]);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn done_drops_pending_work() {
        let r = rescheduler(50);
        let (tx, rx) = mpsc::channel::<()>();
        r.schedule("x", || (), move |()| tx.send(()).unwrap());
        r.done();
        assert_eq!(r.pending_len(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(r.runs(), 0);
    }

    #[test]
    fn cancel_one_id() {
        let r = rescheduler(30);
        let (tx, rx) = mpsc::channel();
        let tx_x = tx.clone();
        r.schedule("x", || "x", move |v| tx_x.send(v).unwrap());
        r.schedule("y", || "y", move |v| tx.send(v).unwrap());

        assert!(r.cancel("x"));
        assert!(!r.cancel("x"));
        assert!(r.is_pending("y"));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "y");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn rearms_after_firing() {
        let r = rescheduler(10);
        let (tx, rx) = mpsc::channel();
        let first = tx.clone();
        r.schedule("x", || 1, move |v| first.send(v).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);

        r.schedule("x", || 2, move |v| tx.send(v).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
        assert_eq!(r.runs(), 2);
    }

    #[test]
    fn panicking_work_does_not_stop_the_worker() {
        let r = rescheduler(10);
        let (tx, rx) = mpsc::channel();
        r.schedule("boom", || panic!("scheduled panic"), |()| {});
        r.schedule("ok", || 7, move |v| tx.send(v).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    }

    #[test]
    fn drop_joins_worker() {
        let r = rescheduler(1000);
        r.schedule("x", || (), |()| {});
        drop(r);
    }
}
