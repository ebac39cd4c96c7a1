//! Snapshot engine for blocksnap
//!
//! This crate orchestrates the live side of snapshotting:
//! - DeviceRegistry: concurrent device lookup, enable/disable, eviction
//! - SnapshotDevice: per-device state machine and session open/close
//! - CaptureBitmap: at-most-once capture per block per session
//! - OrderedQueue / CleanupScheduler: per-device FIFO persistence and
//!   deadlock-free queue teardown
//! - capture: the pre-write / post-write hook pair
//! - SnapshotService: the control-plane and event-source facade
//!
//! The engine is the only component that knows about device state;
//! everything on disk is delegated to `blocksnap-store`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitmap;
pub mod capture;
pub mod cleanup;
pub mod config;
pub mod control;
pub mod device;
pub mod queue;
pub mod registry;

pub use bitmap::CaptureBitmap;
pub use capture::{commit_write, prepare_write, PendingCapture};
pub use cleanup::CleanupScheduler;
pub use config::Config;
pub use control::SnapshotService;
pub use device::{CaptureState, DeviceHandle, SnapshotDevice};
pub use queue::OrderedQueue;
pub use registry::DeviceRegistry;
