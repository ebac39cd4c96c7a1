//! Engine configuration

use std::path::PathBuf;

use blocksnap_core::{DEFAULT_QUEUE_DEPTH, DEFAULT_SNAPSHOT_ROOT};

/// Configuration for the snapshot engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for stored snapshot versions
    pub snapshot_root: PathBuf,
    /// Per-device queue depth before capture submissions are dropped
    pub queue_depth: usize,
    /// Fixed block size override; `None` derives it from the backing
    /// filesystem at session open
    pub block_size: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            snapshot_root: PathBuf::from(DEFAULT_SNAPSHOT_ROOT),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            block_size: None,
        }
    }
}

impl Config {
    /// Default configuration with a different snapshot root.
    pub fn with_root(snapshot_root: impl Into<PathBuf>) -> Self {
        Config {
            snapshot_root: snapshot_root.into(),
            ..Config::default()
        }
    }
}
