//! On-disk layout of the snapshot root
//!
//! One subdirectory per snapshot version, named
//! `<sanitized_device>_<timestamp>`, holding the journal plus one
//! `block_NNNNNNNN` file per captured block. Device names are sanitized
//! (path separators become underscores) before they reach the
//! filesystem.

use std::path::{Path, PathBuf};

use blocksnap_core::{sanitize_device_name, TIMESTAMP_FORMAT};
use chrono::{DateTime, Local};

/// File name of the per-version metadata journal
pub const JOURNAL_FILE: &str = "metadata.bin";

/// Identifies one snapshot version on disk.
///
/// Derived from the device name and the mount time of the session that
/// produced it; fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionId {
    /// Sanitized device name (directory-component form)
    pub sanitized_device: String,
    /// Session timestamp, `YYYY-MM-DD_HH-MM-SS`
    pub timestamp: String,
}

impl VersionId {
    /// Build a version id for a device and a mount time (unix seconds).
    pub fn new(device_name: &str, mount_unix: i64) -> Self {
        VersionId {
            sanitized_device: sanitize_device_name(device_name),
            timestamp: format_mount_timestamp(mount_unix),
        }
    }

    /// Build a version id from a device name and an already-formatted
    /// timestamp (as returned by version listing).
    pub fn from_timestamp(device_name: &str, timestamp: &str) -> Self {
        VersionId {
            sanitized_device: sanitize_device_name(device_name),
            timestamp: timestamp.to_string(),
        }
    }

    /// Directory name under the snapshot root.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.sanitized_device, self.timestamp)
    }

    /// Full path of the version directory.
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }
}

/// Format a mount time as a version-directory timestamp, in local time.
pub fn format_mount_timestamp(mount_unix: i64) -> String {
    match DateTime::from_timestamp(mount_unix, 0) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        // Out-of-range timestamp; fall back to the raw value so the
        // directory name stays unique and parseable.
        None => mount_unix.to_string(),
    }
}

/// File name for a captured block.
pub fn block_file_name(block: u64) -> String {
    format!("block_{:08}", block)
}

/// Full path of a captured block file inside a version directory.
pub fn block_file_path(version_dir: &Path, block: u64) -> PathBuf {
    version_dir.join(block_file_name(block))
}

/// Full path of the journal inside a version directory.
pub fn journal_path(version_dir: &Path) -> PathBuf {
    version_dir.join(JOURNAL_FILE)
}
