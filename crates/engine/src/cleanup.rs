//! Deferred device teardown
//!
//! An evicted device's private queue has to be shut down from off that
//! queue: the close-session task that usually triggers eviction runs ON
//! the device's own worker, and shutting the queue down there would join
//! the very thread doing the joining. This scheduler is a separate,
//! effectively unbounded queue whose only job is tearing down other
//! queues.

use std::sync::Arc;

use blocksnap_core::Result;
use tracing::debug;

use crate::device::SnapshotDevice;
use crate::queue::OrderedQueue;

/// Dedicated worker for destroying evicted devices' private queues.
pub struct CleanupScheduler {
    queue: OrderedQueue,
}

impl CleanupScheduler {
    /// Spawn the cleanup worker.
    pub fn new() -> Result<Self> {
        Ok(CleanupScheduler {
            queue: OrderedQueue::new("snap-cleanup", usize::MAX)?,
        })
    }

    /// Schedule teardown of an evicted device's queue.
    ///
    /// The scheduler holds a device reference until the teardown runs,
    /// so the record outlives every task still draining on its queue.
    pub fn defer_teardown(&self, device: Arc<SnapshotDevice>) {
        let submitted = self.queue.submit(move || {
            debug!(device = %device.name(), "tearing down device queue");
            device.queue().shutdown();
        });
        if submitted.is_err() {
            // Only possible once the scheduler itself is shutting down;
            // the device queue is then shut down when its last handle
            // drops.
            debug!("cleanup scheduler unavailable, teardown skipped");
        }
    }

    /// Block until all scheduled teardowns have completed.
    pub fn drain(&self) {
        self.queue.drain();
    }

    /// Drain and stop the cleanup worker.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
