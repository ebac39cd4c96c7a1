//! On-disk snapshot store for blocksnap
//!
//! This crate owns everything that touches the snapshot root directory:
//! - layout: version directory naming and block file paths
//! - journal: the binary append-only per-version metadata log
//! - blocks: write-once captured block files
//! - restore: version enumeration, metadata loading, and replay onto the
//!   live device
//!
//! It is pure filesystem code — no device state machine, no queues. The
//! engine guarantees that journal mutation for one version only ever
//! happens from a single thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocks;
pub mod journal;
pub mod layout;
pub mod restore;

pub use blocks::{persist_block, read_block};
pub use journal::{JournalContents, JournalHeader, JOURNAL_FORMAT_VERSION, JOURNAL_MAGIC};
pub use layout::{block_file_name, format_mount_timestamp, VersionId, JOURNAL_FILE};
pub use restore::{list_versions, load_metadata, restore_version, RestoreReport};
