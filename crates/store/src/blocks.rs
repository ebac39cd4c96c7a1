//! Captured block files
//!
//! One file per captured block per version, holding the exact pre-write
//! bytes. Write-once: a block is persisted at most once per session (the
//! capture bitmap guarantees it), so truncate-on-create is safe.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use blocksnap_core::Result;

use crate::layout::block_file_path;

/// Write a captured block's pre-write bytes.
///
/// Returns the byte count written. Errors are the caller's to log; a
/// block file that never made it to disk is simply "not captured" at
/// restore time, which the restore path tolerates.
pub fn persist_block(version_dir: &Path, block: u64, data: &[u8]) -> Result<usize> {
    let path = block_file_path(version_dir, block);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(data.len())
}

/// Read a captured block's bytes back.
pub fn read_block(version_dir: &Path, block: u64) -> Result<Vec<u8>> {
    let path = block_file_path(version_dir, block);
    let mut file = File::open(&path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
