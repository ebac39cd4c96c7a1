//! Version enumeration and restore
//!
//! Restore replays a closed snapshot version's captured blocks back onto
//! the live device, in journal order. It reads the store's on-disk
//! format directly and is independent of live capture state.
//!
//! # Error policy
//!
//! A missing or short block file is skipped with a warning and counted
//! in the report — best-effort capture means individual block files can
//! legitimately be absent, and a partial restore of the surviving blocks
//! is more useful than none. A failed write to the live device aborts
//! the restore: at that point the device is no longer accepting the
//! replay and continuing would only produce noise.
//!
//! At most one restore runs process-wide at any time; it is an
//! administrative, single-writer operation.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use blocksnap_core::{sanitize_device_name, validate_device_name, Error, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::journal::{self, JournalContents};
use crate::layout::{block_file_path, VersionId};

static RESTORE_LOCK: Mutex<()> = Mutex::new(());

/// What a restore actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// Blocks written back to the live device
    pub blocks_applied: usize,
    /// Blocks skipped because their block file was missing or short
    pub blocks_skipped: usize,
}

/// List snapshot version timestamps for a device, most recent first.
///
/// A missing snapshot root or a device with no versions yields an empty
/// list; neither is an error.
pub fn list_versions(root: &Path, device_name: &str) -> Result<Vec<String>> {
    validate_device_name(device_name)?;
    let prefix = format!("{}_", sanitize_device_name(device_name));

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut timestamps = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(ts) = name.strip_prefix(&prefix) {
            if !ts.is_empty() {
                timestamps.push(ts.to_string());
            }
        }
    }

    // Zero-padded timestamps sort lexicographically; descending puts the
    // most recent version first.
    timestamps.sort_unstable_by(|a, b| b.cmp(a));
    Ok(timestamps)
}

/// Load and validate a version's journal.
///
/// Fails `Busy` while the version's session is still open — a live
/// session cannot be safely restored from.
pub fn load_metadata(root: &Path, version: &VersionId) -> Result<JournalContents> {
    let contents = journal::read(&version.path(root))?;
    if contents.header.open {
        return Err(Error::Busy(format!(
            "snapshot {} belongs to a live session",
            version.dir_name()
        )));
    }
    Ok(contents)
}

/// Restore a snapshot version onto the live device.
///
/// Writes every captured block (journal order) from its block file to
/// `block * block_size` on the device at `device_name`. The caller is
/// expected to have warned the operator that the device should be
/// unmounted first.
pub fn restore_version(root: &Path, device_name: &str, timestamp: &str) -> Result<RestoreReport> {
    validate_device_name(device_name)?;
    let version = VersionId::from_timestamp(device_name, timestamp);
    let contents = load_metadata(root, &version)?;

    let _serial = RESTORE_LOCK.lock();

    let mut device = OpenOptions::new().write(true).open(device_name)?;
    let version_dir = version.path(root);
    let block_size = u64::from(contents.header.block_size);
    let device_size = contents.header.device_size;

    let mut report = RestoreReport {
        blocks_applied: 0,
        blocks_skipped: 0,
    };

    for &block in &contents.blocks {
        // The device's final block may be legitimately short.
        let expected = block_size.min(device_size.saturating_sub(block * block_size));
        let data = match read_block_checked(&version_dir, block, expected) {
            Some(data) => data,
            None => {
                report.blocks_skipped += 1;
                continue;
            }
        };

        device.seek(SeekFrom::Start(block * block_size))?;
        device.write_all(&data)?;
        report.blocks_applied += 1;
    }

    device.sync_all()?;

    info!(
        device = %device_name,
        version = %version.dir_name(),
        applied = report.blocks_applied,
        skipped = report.blocks_skipped,
        "restore complete"
    );
    Ok(report)
}

/// Read one block file, or `None` (with a warning) if it is missing or
/// shorter than the bytes the device held at that block.
fn read_block_checked(version_dir: &Path, block: u64, expected: u64) -> Option<Vec<u8>> {
    let path = block_file_path(version_dir, block);
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            warn!(block, error = %e, "cannot open block file, skipping");
            return None;
        }
    };
    let mut buf = Vec::new();
    if let Err(e) = file.read_to_end(&mut buf) {
        warn!(block, error = %e, "cannot read block file, skipping");
        return None;
    }
    if (buf.len() as u64) < expected {
        warn!(
            block,
            len = buf.len(),
            expected,
            "short block file, skipping"
        );
        return None;
    }
    Some(buf)
}
