//! engine::scheduler
//!
//! The single-worker operation queue.
//!
//! # Architecture
//!
//! One named thread drains an unbounded FIFO. Every mutating repository
//! operation runs here, one at a time, in submission order; this is what
//! keeps two writers off the repository handle.
//!
//! ```text
//! caller ──schedule(task)──► [ FIFO ] ──► worker thread ──► task()
//!    ▲                                          │
//!    └─────────── TaskHandle (oneshot) ◄────────┘
//! ```
//!
//! # Failure Semantics
//!
//! A task that panics is caught, logged, and reported through its handle
//! as [`SchedulerError::Panicked`]. The worker keeps going with the next
//! task.
//!
//! # Shutdown
//!
//! [`Scheduler::shutdown`] closes the queue (later submissions fail with
//! [`SchedulerError::Closed`]), then either drains what is queued or
//! discards everything that has not started. An in-flight task always
//! runs to completion. An optional teardown hook runs on the worker after
//! the last task, so resources the tasks share are released only once
//! nothing can be using them.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::error::SchedulerError;

const WORKER_NAME: &str = "stagehand-worker";

pub type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// What to do with queued tasks at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every queued task first.
    #[default]
    Drain,
    /// Drop tasks that have not started. Their handles resolve to
    /// [`SchedulerError::Discarded`].
    DiscardPending,
}

struct Job {
    seq: u64,
    label: &'static str,
    run: Box<dyn FnOnce() + Send + 'static>,
}

struct Shared {
    queued: AtomicUsize,
    discard: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

/// The single-worker queue.
pub struct Scheduler {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("closed", &self.is_closed())
            .field("queued", &self.queued())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    /// Start the worker thread.
    pub fn start() -> Result<Self, SchedulerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queued: AtomicUsize::new(0),
            discard: AtomicBool::new(false),
            teardown: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(rx, worker_shared))
            .map_err(SchedulerError::Spawn)?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            shared,
            next_seq: AtomicU64::new(1),
        })
    }

    /// Enqueue `task`. Returns immediately.
    pub fn schedule<T, F>(&self, task: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_named("task", task)
    }

    /// Enqueue `task` under a label that shows up in logs.
    pub fn schedule_named<T, F>(
        &self,
        label: &'static str,
        task: F,
    ) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let run = Box::new(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(value) => Ok(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(seq, label, panic = %message, "scheduled task panicked");
                    Err(SchedulerError::Panicked(message))
                }
            };
            // The caller may have dropped its handle; that is fine.
            let _ = reply.send(result);
        });

        let sender = lock(&self.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(SchedulerError::Closed);
        };
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(Job { seq, label, run }).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::Closed);
        }
        debug!(seq, label, "task scheduled");
        Ok(TaskHandle { rx })
    }

    /// Tasks waiting to start.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// True once a discarding shutdown has begun.
    pub fn is_discarding(&self) -> bool {
        self.shared.discard.load(Ordering::SeqCst)
    }

    /// True when called from the worker thread.
    pub fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Stop accepting tasks and wind the queue down.
    ///
    /// With `wait`, blocks until the worker has finished; this is the only
    /// place the caller blocks on scheduled work. Calling it again is a
    /// no-op.
    pub fn shutdown(&self, mode: ShutdownMode, wait: bool) {
        self.shutdown_with(mode, wait, None);
    }

    /// [`shutdown`](Self::shutdown), running `teardown` on the worker after
    /// the last task.
    pub fn shutdown_with(&self, mode: ShutdownMode, wait: bool, teardown: Option<Teardown>) {
        let Some(sender) = lock(&self.sender).take() else {
            return;
        };

        if mode == ShutdownMode::DiscardPending {
            self.shared.discard.store(true, Ordering::SeqCst);
        }
        *lock(&self.shared.teardown) = teardown;
        // Dropping the last sender ends the worker loop once the queue is empty.
        drop(sender);
        debug!(?mode, wait, queued = self.queued(), "scheduler shutting down");

        if !wait {
            return;
        }
        if self.on_worker() {
            warn!("shutdown requested from the worker thread; not waiting for it");
            return;
        }
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                error!("scheduler worker exited abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Close the queue; the worker finishes what is queued and exits.
        lock(&self.sender).take();
    }
}

fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, shared: Arc<Shared>) {
    debug!("scheduler worker started");
    while let Some(job) = rx.blocking_recv() {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
        if shared.discard.load(Ordering::SeqCst) {
            debug!(seq = job.seq, label = job.label, "discarding queued task");
            continue;
        }
        debug!(seq = job.seq, label = job.label, "task started");
        (job.run)();
        debug!(seq = job.seq, label = job.label, "task finished");
    }

    let teardown = lock(&shared.teardown).take();
    if let Some(teardown) = teardown {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(teardown)) {
            error!(panic = %panic_message(payload.as_ref()), "scheduler teardown panicked");
        }
    }
    debug!("scheduler worker exiting");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Completion handle for one scheduled task.
///
/// Await it from async code, or [`wait`](Self::wait) from a plain thread.
#[must_use = "dropping a TaskHandle does not cancel the task, but loses its result"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run.
    ///
    /// For tests and teardown only; it must not be called from the worker
    /// or from inside an async runtime.
    pub fn wait(self) -> Result<T, SchedulerError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SchedulerError::Discarded))
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::Discarded)))
    }
}
