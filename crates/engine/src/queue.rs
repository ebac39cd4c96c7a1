//! Per-device ordered task queue
//!
//! One dedicated worker thread draining a FIFO queue. Tasks submitted to
//! a device's queue execute strictly in submission order — the journal
//! for a device is only ever mutated from this single thread, which is
//! the sole mechanism preventing concurrent journal corruption. Any
//! replacement that steals work across threads breaks that guarantee.
//!
//! Shutdown signals the worker, lets it drain the remaining tasks, and
//! joins it. A task must never shut down the queue it is running on —
//! the join would wait on itself; eviction routes teardown through the
//! cleanup scheduler instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;

use blocksnap_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tracing::error;

type Task = Box<dyn FnOnce() + Send>;

struct QueueInner {
    tasks: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    tasks_completed: AtomicU64,
    max_depth: usize,
}

/// A FIFO task queue drained by one dedicated worker thread.
pub struct OrderedQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl OrderedQueue {
    /// Create a queue and spawn its worker thread.
    ///
    /// `max_depth` bounds queued (not yet running) tasks; submissions
    /// beyond it fail with `ResourceExhausted`. Thread spawn failure is
    /// also `ResourceExhausted`.
    pub fn new(name: &str, max_depth: usize) -> Result<Self> {
        let inner = Arc::new(QueueInner {
            tasks: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            max_depth,
        });

        let worker_inner = Arc::clone(&inner);
        // Linux truncates thread names at 16 bytes; keep what fits.
        let thread_name: String = name.chars().take(15).collect();
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(&worker_inner))
            .map_err(|e| Error::ResourceExhausted(format!("spawn queue worker {}: {}", name, e)))?;

        Ok(OrderedQueue {
            inner,
            worker: Mutex::new(Some(handle)),
            name: name.to_string(),
        })
    }

    /// Queue name (used for logging).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a task for FIFO execution.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.inner.shutdown.load(AtomicOrdering::Acquire) {
            return Err(Error::InvalidState(format!(
                "queue {} is shut down",
                self.name
            )));
        }
        if self.inner.queue_depth.load(AtomicOrdering::Acquire) >= self.inner.max_depth {
            return Err(Error::ResourceExhausted(format!(
                "queue {} is full",
                self.name
            )));
        }

        {
            let mut tasks = self.inner.tasks.lock();
            tasks.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, AtomicOrdering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until every queued and in-flight task has completed.
    ///
    /// The worker keeps running; the queue stays usable afterwards.
    pub fn drain(&self) {
        let mut tasks = self.inner.tasks.lock();
        while self.inner.queue_depth.load(AtomicOrdering::Acquire) > 0
            || self.inner.active_tasks.load(AtomicOrdering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut tasks);
        }
    }

    /// Signal shutdown, let the worker finish the remaining tasks, and
    /// join it. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);

        // Lock before notifying so a worker between its shutdown check
        // and its condvar wait cannot miss the wakeup.
        {
            let _tasks = self.inner.tasks.lock();
            self.inner.work_ready.notify_all();
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                // A task dropped the queue's last owner on its own
                // worker; the thread exits on its own once the shutdown
                // flag is seen, and joining here would wait on ourselves.
                return;
            }
            let _ = handle.join();
        }
    }

    /// Whether shutdown has been signaled.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Total tasks completed since creation.
    pub fn tasks_completed(&self) -> u64 {
        self.inner.tasks_completed.load(AtomicOrdering::Relaxed)
    }
}

impl Drop for OrderedQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_tasks` and wakes drain waiters on drop, so a
/// panicking task cannot leave the count inflated and hang `drain()`.
struct ActiveTaskGuard<'a> {
    inner: &'a QueueInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, AtomicOrdering::Release);
        self.inner
            .tasks_completed
            .fetch_add(1, AtomicOrdering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(AtomicOrdering::Acquire) == 0 {
            let _tasks = self.inner.tasks.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &QueueInner) {
    loop {
        let task = {
            let mut tasks = inner.tasks.lock();
            loop {
                if let Some(task) = tasks.pop_front() {
                    inner.queue_depth.fetch_sub(1, AtomicOrdering::Release);
                    inner.active_tasks.fetch_add(1, AtomicOrdering::Release);
                    break task;
                }
                // Pop precedes this check, so pending tasks always run
                // before the worker exits.
                if inner.shutdown.load(AtomicOrdering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut tasks);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            error!(
                "queue task panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
