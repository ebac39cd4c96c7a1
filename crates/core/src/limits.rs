//! Limits and shared constants
//!
//! These bounds are enforced at the control-plane boundary before any
//! request reaches the registry or the store.

/// Maximum device name length in bytes
pub const MAX_DEVICE_NAME_LEN: usize = 512;

/// Minimum credential secret length
pub const MIN_SECRET_LEN: usize = 8;

/// Maximum credential secret length
pub const MAX_SECRET_LEN: usize = 64;

/// Block size used when the backing filesystem does not report one
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Per-device queue depth before capture submissions are dropped
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Default root directory for stored snapshot versions
pub const DEFAULT_SNAPSHOT_ROOT: &str = "/snapshot";

/// Timestamp layout used in snapshot version directory names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
