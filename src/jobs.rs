//! Speculative work off the main timeline.
//!
//! Jobs run on bevy's async compute pool and own everything they touch.
//! Their results come back through a single completion queue that the
//! owner drains once per tick, so nothing a job produces is observed while
//! the live state is being mutated.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use bevy::tasks::{AsyncComputeTaskPool, TaskPool};

/// Shared cancellation flag, checked by workers between integration steps.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Count of jobs that have been spawned but not yet delivered.
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        InFlightGuard(self.0.clone())
    }
}

/// Decrements the in-flight count when the job is done, panicking or not.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Many-producer, single-consumer queue of job results.
///
/// The receiver sits behind a `Mutex` only so the owner can live in a
/// `Sync` resource; draining goes through `get_mut` and never locks.
pub struct CompletionQueue<T> {
    tx: Sender<T>,
    rx: Mutex<Receiver<T>>,
}

impl<T> CompletionQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx: Mutex::new(rx) }
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Everything delivered since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<T> {
        match self.rx.get_mut() {
            Ok(rx) => rx.try_iter().collect(),
            Err(poisoned) => poisoned.into_inner().try_iter().collect(),
        }
    }
}

impl<T> Default for CompletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns jobs and collects their results.
pub struct JobRunner<T> {
    queue: CompletionQueue<T>,
    in_flight: InFlight,
}

impl<T: Send + 'static> JobRunner<T> {
    pub fn new() -> Self {
        Self {
            queue: CompletionQueue::new(),
            in_flight: InFlight::default(),
        }
    }

    /// Run `work` on the async compute pool.
    ///
    /// A panic inside `work` is caught and turned into a result with
    /// `on_panic`, so the pool never loses a worker and the owner always
    /// hears back.
    pub fn spawn<W, P>(&self, work: W, on_panic: P)
    where
        W: FnOnce() -> T + Send + 'static,
        P: FnOnce(String) -> T + Send + 'static,
    {
        let tx = self.queue.sender();
        let guard = self.in_flight.enter();
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        pool.spawn(async move {
            let message = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(message) => message,
                Err(payload) => on_panic(panic_message(payload.as_ref())),
            };
            // Leave the count before the result becomes visible to the owner
            drop(guard);
            // The owner may already be gone; nothing to deliver to then
            let _ = tx.send(message);
        })
        .detach();
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }
}

impl<T: Send + 'static> Default for JobRunner<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
