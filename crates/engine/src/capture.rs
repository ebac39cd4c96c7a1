//! Copy-before-write capture
//!
//! `prepare_write` runs before a write is allowed to overwrite the
//! device and buffers the current contents of every affected block, in
//! memory only. `commit_write` runs after the write's outcome is known:
//! it discards everything on failure, and on success pushes each block
//! that survived the bitmap's test-and-set onto the device's ordered
//! queue for persistence.
//!
//! Both hooks are best-effort by contract: nothing here may fail or
//! block the protected write. Allocation failures, read failures, and a
//! full queue all degrade to "this block is not captured", with a
//! warning.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use blocksnap_store::{blocks, journal};
use tracing::{debug, error, trace, warn};

use crate::device::{CaptureState, DeviceHandle};

/// One block's buffered pre-write contents, between the pre-write and
/// post-write hooks. Never persisted beyond process memory.
pub struct PendingCapture {
    device: DeviceHandle,
    state: Arc<CaptureState>,
    block: u64,
    data: Vec<u8>,
    /// Block lies wholly at or beyond the file's current end: the write
    /// is a pure append there and has nothing to protect.
    append_only: bool,
}

impl PendingCapture {
    /// Affected block number.
    pub fn block(&self) -> u64 {
        self.block
    }

    /// Buffered byte length (zero for append-only blocks).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing existed at this block before the write.
    pub fn is_append_only(&self) -> bool {
        self.append_only
    }

    /// Whether no bytes were buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pre-write hook: buffer the current contents of every block the write
/// at `offset..offset+len` will touch.
///
/// Returns an empty list — never an error — when the device has no open
/// session or any part of the read fails.
pub fn prepare_write(device: &DeviceHandle, offset: u64, len: u64) -> Vec<PendingCapture> {
    if len == 0 {
        return Vec::new();
    }
    let Some(state) = device.capture_state() else {
        return Vec::new();
    };

    let block_size = u64::from(state.block_size);
    let first = offset / block_size;
    let last = (offset + len - 1) / block_size;

    let mut file = match File::open(device.name()) {
        Ok(file) => file,
        Err(e) => {
            warn!(device = %device.name(), error = %e, "cannot open backing path, capture skipped");
            return Vec::new();
        }
    };
    let current_len = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(device = %device.name(), error = %e, "cannot stat backing path, capture skipped");
            return Vec::new();
        }
    };

    let mut pending = Vec::new();
    for block in first..=last {
        let start = block * block_size;

        if start >= current_len {
            pending.push(PendingCapture {
                device: Arc::clone(device),
                state: Arc::clone(&state),
                block,
                data: Vec::new(),
                append_only: true,
            });
            continue;
        }

        let take = block_size.min(current_len - start) as usize;
        let mut buf = Vec::new();
        if buf.try_reserve_exact(take).is_err() {
            warn!(device = %device.name(), block, "capture buffer allocation failed, block skipped");
            continue;
        }
        buf.resize(take, 0);

        let read = file
            .seek(SeekFrom::Start(start))
            .and_then(|_| file.read_exact(&mut buf));
        if let Err(e) = read {
            warn!(device = %device.name(), block, error = %e, "pre-write read failed, block skipped");
            continue;
        }

        pending.push(PendingCapture {
            device: Arc::clone(device),
            state: Arc::clone(&state),
            block,
            data: buf,
            append_only: false,
        });
    }
    pending
}

/// Post-write hook: persist captures for a write whose outcome is known.
///
/// A failed write discards everything (no data was overwritten). For a
/// successful write, each capture is dropped if it was a pure append or
/// if an earlier write this session already protected the block;
/// otherwise its persistence runs on the device's ordered queue, which
/// keeps journal appends for one device strictly serial.
pub fn commit_write(pending: Vec<PendingCapture>, write_succeeded: bool, extended_file: bool) {
    if !write_succeeded {
        if !pending.is_empty() {
            debug!(
                count = pending.len(),
                "write failed, discarding pending captures"
            );
        }
        return;
    }

    for capture in pending {
        if capture.append_only {
            trace!(
                block = capture.block,
                extended_file,
                "pure append, nothing to protect"
            );
            continue;
        }
        if capture.state.bitmap.test_and_set(capture.block) {
            trace!(block = capture.block, "block already captured this session");
            continue;
        }

        let PendingCapture {
            device,
            state,
            block,
            data,
            ..
        } = capture;

        // The task owns a device handle, keeping the record alive until
        // it has run.
        let task_device = Arc::clone(&device);
        let submitted = device.queue().submit(move || {
            persist_captured_block(&task_device, &state, block, &data);
        });
        if let Err(e) = submitted {
            // Best-effort: snapshot fidelity pays, the live write never
            // does. The bit stays set; this block is lost to the version.
            warn!(
                device = %device.name(),
                block,
                error = %e,
                "capture queue rejected block, dropping capture"
            );
        }
    }
}

/// Queue task body: write the block file, then append the journal
/// record. Failures are logged, not retried — restore treats a missing
/// block file as "not captured".
fn persist_captured_block(device: &DeviceHandle, state: &CaptureState, block: u64, data: &[u8]) {
    match blocks::persist_block(&state.dir, block, data) {
        Ok(written) => trace!(device = %device.name(), block, written, "block captured"),
        Err(e) => error!(device = %device.name(), block, error = %e, "block persist failed"),
    }
    if let Err(e) = journal::append_block(&state.dir, block) {
        error!(device = %device.name(), block, error = %e, "journal append failed");
    }
}
