//! Snapshot device record and per-device state machine
//!
//! A device moves Idle → (mark_mounted) → Active → (mark_unmounted) →
//! Idle, with `enabled` orthogonal to mount state. The mark transitions
//! are fast-path: they take only the short-held fast mutex and never
//! touch the disk, so they are safe to call from interception context.
//! The heavy session work (geometry probing, bitmap allocation, journal
//! creation) runs on the device's private ordered queue.
//!
//! Reference counting is `Arc`: the registry holds one reference per
//! entry, every in-flight task and lookup holds one for its duration,
//! and the record is freed when the last clone drops.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use blocksnap_core::{Error, Result, DEFAULT_BLOCK_SIZE};
use blocksnap_store::{journal, JournalHeader, VersionId};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bitmap::CaptureBitmap;
use crate::config::Config;
use crate::queue::OrderedQueue;

/// Reference-counted handle to a device record.
pub type DeviceHandle = Arc<SnapshotDevice>;

/// Per-session capture state, immutable once the session is open.
///
/// Published as one `Arc` swap under the fast lock when the session
/// opens; the capture path clones it and then works without any device
/// lock at all.
pub struct CaptureState {
    /// On-disk identity of this session's snapshot version
    pub version: VersionId,
    /// Resolved version directory under the snapshot root
    pub dir: PathBuf,
    /// Filesystem block size for this session
    pub block_size: u32,
    /// Backing device size in bytes at session start
    pub device_size: u64,
    /// Block count covered by the bitmap
    pub num_blocks: u64,
    /// At-most-once capture set
    pub bitmap: CaptureBitmap,
}

struct FastState {
    enabled: bool,
    mounted: bool,
    mount_unix: i64,
    capture: Option<Arc<CaptureState>>,
}

/// One protected device: identity, state machine, private ordered queue.
pub struct SnapshotDevice {
    name: String,
    /// Short-held lock for the fields read from latency-sensitive code
    fast: Mutex<FastState>,
    /// Serializes the multi-step open/close session transitions
    transition: Mutex<()>,
    queue: OrderedQueue,
}

impl SnapshotDevice {
    /// Allocate a device record with its private queue worker.
    ///
    /// New devices start enabled and unmounted.
    pub fn new(name: &str, queue_depth: usize) -> Result<DeviceHandle> {
        let queue_name = format!("snap{}", blocksnap_core::sanitize_device_name(name));
        let queue = OrderedQueue::new(&queue_name, queue_depth)?;
        Ok(Arc::new(SnapshotDevice {
            name: name.to_string(),
            fast: Mutex::new(FastState {
                enabled: true,
                mounted: false,
                mount_unix: 0,
                capture: None,
            }),
            transition: Mutex::new(()),
            queue,
        }))
    }

    /// Device name (the backing path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device's private ordered queue.
    pub fn queue(&self) -> &OrderedQueue {
        &self.queue
    }

    /// Flip protection on. Returns `true` if it was off.
    pub fn enable(&self) -> bool {
        let mut fast = self.fast.lock();
        if fast.enabled {
            false
        } else {
            fast.enabled = true;
            true
        }
    }

    /// Flip protection off. Returns `true` if it was on.
    pub fn disable(&self) -> bool {
        let mut fast = self.fast.lock();
        if fast.enabled {
            fast.enabled = false;
            true
        } else {
            false
        }
    }

    /// Whether snapshot protection is configured on.
    pub fn is_enabled(&self) -> bool {
        self.fast.lock().enabled
    }

    /// Whether a capture session is active.
    pub fn is_mounted(&self) -> bool {
        self.fast.lock().mounted
    }

    /// Eviction condition: neither enabled nor mounted.
    pub fn is_idle(&self) -> bool {
        let fast = self.fast.lock();
        !fast.enabled && !fast.mounted
    }

    /// Current session's capture state, if a session is open.
    pub fn capture_state(&self) -> Option<Arc<CaptureState>> {
        self.fast.lock().capture.clone()
    }

    /// Fast path: record that a protected mount session has begun.
    ///
    /// Fails `PermissionDenied` on a disabled device and `Busy` on a
    /// double mount. Never allocates and never touches the disk.
    pub fn mark_mounted(&self) -> Result<()> {
        let mut fast = self.fast.lock();
        if !fast.enabled {
            return Err(Error::PermissionDenied(format!(
                "snapshotting disabled for {}",
                self.name
            )));
        }
        if fast.mounted {
            return Err(Error::Busy(format!("{} is already mounted", self.name)));
        }
        fast.mounted = true;
        fast.mount_unix = chrono::Utc::now().timestamp();
        Ok(())
    }

    /// Fast path: record that the mount session has ended.
    pub fn mark_unmounted(&self) -> Result<()> {
        let mut fast = self.fast.lock();
        if !fast.mounted {
            return Err(Error::InvalidState(format!("{} is not mounted", self.name)));
        }
        fast.mounted = false;
        Ok(())
    }

    /// Heavy path: derive session geometry, allocate the capture bitmap,
    /// create the version directory and its journal (open=1).
    ///
    /// Runs on the device queue. On any failure the device rolls back to
    /// unmounted — never left half-initialized — and nothing is published
    /// to the capture path.
    pub fn open_session(&self, config: &Config) -> Result<()> {
        let _transition = self.transition.lock();

        let (mounted, mount_unix) = {
            let fast = self.fast.lock();
            (fast.mounted, fast.mount_unix)
        };
        if !mounted {
            return Err(Error::InvalidState(format!(
                "{} was unmounted before the session opened",
                self.name
            )));
        }

        match self.prepare_session(config, mount_unix) {
            Ok(state) => {
                info!(
                    device = %self.name,
                    version = %state.version.dir_name(),
                    num_blocks = state.num_blocks,
                    block_size = state.block_size,
                    "snapshot session opened"
                );
                self.fast.lock().capture = Some(Arc::new(state));
                Ok(())
            }
            Err(e) => {
                warn!(device = %self.name, error = %e, "session open failed, rolling back mount");
                self.fast.lock().mounted = false;
                Err(e)
            }
        }
    }

    /// The bitmap is allocated before any on-disk artifact exists, so an
    /// allocation failure leaves no journal behind.
    fn prepare_session(&self, config: &Config, mount_unix: i64) -> Result<CaptureState> {
        let meta = fs::metadata(&self.name)?;
        let block_size = config
            .block_size
            .unwrap_or_else(|| backing_block_size(&meta));
        let device_size = meta.len();
        let num_blocks = if device_size == 0 {
            0
        } else {
            (device_size - 1) / u64::from(block_size) + 1
        };

        let bitmap = CaptureBitmap::new(num_blocks)?;

        let version = VersionId::new(&self.name, mount_unix);
        let dir = version.path(&config.snapshot_root);
        fs::create_dir_all(&dir)?;
        journal::create(
            &dir,
            &JournalHeader {
                block_size,
                device_size,
                num_blocks,
                created_unix: mount_unix,
                open: true,
            },
        )?;

        Ok(CaptureState {
            version,
            dir,
            block_size,
            device_size,
            num_blocks,
            bitmap,
        })
    }

    /// Heavy path: close the session's journal and release the bitmap.
    ///
    /// Runs on the device queue after `mark_unmounted`. Idempotent when
    /// no session is open; fails `InvalidState` while still mounted.
    pub fn close_session(&self) -> Result<()> {
        let _transition = self.transition.lock();

        let state = {
            let mut fast = self.fast.lock();
            if fast.mounted {
                return Err(Error::InvalidState(format!(
                    "{} is still mounted",
                    self.name
                )));
            }
            fast.capture.take()
        };

        if let Some(state) = state {
            if let Err(e) = journal::mark_closed(&state.dir) {
                warn!(
                    device = %self.name,
                    version = %state.version.dir_name(),
                    error = %e,
                    "failed to close journal"
                );
            } else {
                info!(
                    device = %self.name,
                    version = %state.version.dir_name(),
                    "snapshot session closed"
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SnapshotDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fast = self.fast.lock();
        f.debug_struct("SnapshotDevice")
            .field("name", &self.name)
            .field("enabled", &fast.enabled)
            .field("mounted", &fast.mounted)
            .field("session_open", &fast.capture.is_some())
            .finish()
    }
}

#[cfg(unix)]
fn backing_block_size(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    let bs = meta.blksize();
    if bs == 0 || bs > u64::from(u32::MAX) {
        DEFAULT_BLOCK_SIZE
    } else {
        bs as u32
    }
}

#[cfg(not(unix))]
fn backing_block_size(_meta: &fs::Metadata) -> u32 {
    DEFAULT_BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            snapshot_root: tmp.path().join("snaps"),
            queue_depth: 64,
            block_size: Some(64),
        }
    }

    fn make_device(tmp: &TempDir, len: usize) -> String {
        let path = tmp.path().join("backing.img");
        fs::write(&path, vec![0u8; len]).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_mount_gating() {
        let dev = SnapshotDevice::new("/dev/test-gate", 16).unwrap();

        dev.disable();
        assert!(matches!(
            dev.mark_mounted(),
            Err(Error::PermissionDenied(_))
        ));
        assert!(dev.capture_state().is_none());

        dev.enable();
        dev.mark_mounted().unwrap();
        assert!(matches!(dev.mark_mounted(), Err(Error::Busy(_))));
        // Gating never allocates the bitmap.
        assert!(dev.capture_state().is_none());
    }

    #[test]
    fn test_unmount_requires_mounted() {
        let dev = SnapshotDevice::new("/dev/test-um", 16).unwrap();
        assert!(matches!(dev.mark_unmounted(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_open_session_creates_journal() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let backing = make_device(&tmp, 1024);

        let dev = SnapshotDevice::new(&backing, 16).unwrap();
        dev.mark_mounted().unwrap();
        dev.open_session(&config).unwrap();

        let state = dev.capture_state().unwrap();
        assert_eq!(state.block_size, 64);
        assert_eq!(state.num_blocks, 16);

        let contents = journal::read(&state.dir).unwrap();
        assert!(contents.header.open);
        assert!(contents.blocks.is_empty());
    }

    #[test]
    fn test_open_session_rolls_back_on_missing_backing() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let dev = SnapshotDevice::new("/definitely/not/there.img", 16).unwrap();
        dev.mark_mounted().unwrap();
        assert!(dev.open_session(&config).is_err());

        // Rolled back to Idle: unmounted, no capture state, no journal
        // directory on disk.
        assert!(!dev.is_mounted());
        assert!(dev.capture_state().is_none());
        assert!(!config.snapshot_root.exists());
    }

    #[test]
    fn test_close_session_flips_open_flag() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let backing = make_device(&tmp, 1024);

        let dev = SnapshotDevice::new(&backing, 16).unwrap();
        dev.mark_mounted().unwrap();
        dev.open_session(&config).unwrap();
        let dir = dev.capture_state().unwrap().dir.clone();

        // Close while still mounted is refused.
        assert!(matches!(dev.close_session(), Err(Error::InvalidState(_))));

        dev.mark_unmounted().unwrap();
        dev.close_session().unwrap();
        assert!(dev.capture_state().is_none());
        assert!(!journal::read(&dir).unwrap().header.open);

        // Idempotent.
        dev.close_session().unwrap();
    }

    #[test]
    fn test_open_session_requires_mounted() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let backing = make_device(&tmp, 1024);

        let dev = SnapshotDevice::new(&backing, 16).unwrap();
        assert!(matches!(
            dev.open_session(&config),
            Err(Error::InvalidState(_))
        ));
    }
}
