//! Control-plane facade
//!
//! Marshals user requests and event-source notifications into core
//! calls. Privileged operations (activate, deactivate, restore) require
//! the credential verifier's approval; the notification surface is what
//! an external event source (kprobe shim, FUSE layer, test harness)
//! calls around mounts, unmounts, and writes.

use std::sync::Arc;

use blocksnap_core::{
    validate_device_name, validate_secret, ActivateOutcome, CredentialVerifier, DeactivateOutcome,
    Error, Result,
};
use blocksnap_store as store;
use tracing::{info, warn};

use crate::capture::{self, PendingCapture};
use crate::config::Config;
use crate::device::DeviceHandle;
use crate::registry::DeviceRegistry;

/// The public surface of the snapshot engine.
pub struct SnapshotService {
    registry: Arc<DeviceRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl SnapshotService {
    /// Build a service with its registry and cleanup worker.
    pub fn new(config: Config, verifier: Arc<dyn CredentialVerifier>) -> Result<Self> {
        Ok(SnapshotService {
            registry: DeviceRegistry::new(config)?,
            verifier,
        })
    }

    /// The underlying registry (lookups, direct state inspection).
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    fn authorize(&self, secret: &str, operation: &str) -> Result<()> {
        validate_secret(secret)?;
        if !self.verifier.verify(secret) {
            warn!(operation, "authentication failed");
            return Err(Error::PermissionDenied(format!(
                "authentication failed for {}",
                operation
            )));
        }
        Ok(())
    }

    /// Switch snapshot protection on for a device.
    pub fn activate(&self, name: &str, secret: &str) -> Result<ActivateOutcome> {
        validate_device_name(name)?;
        self.authorize(secret, "activate")?;
        self.registry.register_or_enable(name)
    }

    /// Switch snapshot protection off for a device.
    pub fn deactivate(&self, name: &str, secret: &str) -> Result<DeactivateOutcome> {
        validate_device_name(name)?;
        self.authorize(secret, "deactivate")?;
        self.registry.disable(name)
    }

    /// Install a new control-plane secret.
    pub fn set_credential(&self, secret: &str) -> Result<()> {
        validate_secret(secret)?;
        self.verifier.set_secret(secret)?;
        info!("control-plane credential updated");
        Ok(())
    }

    /// List snapshot version timestamps for a device, most recent first.
    pub fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        store::list_versions(&self.registry.config().snapshot_root, name)
    }

    /// Replay a snapshot version onto the live device.
    ///
    /// The target should be unmounted first; restore refuses versions
    /// whose session is still open but does not otherwise police the
    /// live device.
    pub fn restore(&self, name: &str, timestamp: &str, secret: &str) -> Result<store::RestoreReport> {
        validate_device_name(name)?;
        self.authorize(secret, "restore")?;
        store::restore_version(&self.registry.config().snapshot_root, name, timestamp)
    }

    /// Event source: a protected mount has happened on `name`.
    ///
    /// The mount mark is the fast path; the heavy session open runs on
    /// the device's queue. `NotFound` for devices that are not being
    /// protected — event sources broadcast every mount and ignore it.
    pub fn notify_mount(&self, name: &str) -> Result<()> {
        let device = self
            .registry
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        device.mark_mounted()?;

        let task_device = Arc::clone(&device);
        let config = self.registry.config().clone();
        let submitted = device.queue().submit(move || {
            if let Err(e) = task_device.open_session(&config) {
                warn!(device = %task_device.name(), error = %e, "deferred session open failed");
            }
        });
        if let Err(e) = submitted {
            // Without a session open the device must not stay mounted.
            let _ = device.mark_unmounted();
            warn!(device = %name, error = %e, "could not schedule session open");
            return Err(e);
        }
        Ok(())
    }

    /// Event source: the protected mount on `name` has ended.
    pub fn notify_unmount(&self, name: &str) -> Result<()> {
        let device = self
            .registry
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        device.mark_unmounted()?;

        let task_device = Arc::clone(&device);
        let registry = Arc::clone(&self.registry);
        let submitted = device.queue().submit(move || {
            if let Err(e) = task_device.close_session() {
                warn!(device = %task_device.name(), error = %e, "deferred session close failed");
            }
            registry.evict_if_idle(&task_device);
        });
        if submitted.is_err() {
            // The journal's open flag has to reflect liveness even under
            // queue pressure; this path is not latency-sensitive.
            warn!(device = %name, "queue rejected session close, closing inline");
            device.close_session()?;
            self.registry.evict_if_idle(&device);
        }
        Ok(())
    }

    /// Event source, pre-write hook: buffer the blocks a write at
    /// `offset..offset+len` is about to overwrite.
    ///
    /// Never fails: unknown devices and devices without an open session
    /// yield an empty list.
    pub fn notify_write_begin(&self, name: &str, offset: u64, len: u64) -> Vec<PendingCapture> {
        match self.registry.find(name) {
            Some(device) => capture::prepare_write(&device, offset, len),
            None => Vec::new(),
        }
    }

    /// Event source, post-write hook: commit or discard buffered
    /// captures once the write's outcome is known.
    pub fn notify_write_end(
        &self,
        pending: Vec<PendingCapture>,
        write_succeeded: bool,
        extended_file: bool,
    ) {
        capture::commit_write(pending, write_succeeded, extended_file);
    }

    /// Look up a protected device.
    pub fn find_device(&self, name: &str) -> Option<DeviceHandle> {
        self.registry.find(name)
    }

    /// Force every device through disable, unmount, and teardown.
    pub fn shutdown(&self) {
        self.registry.shutdown_all();
    }
}
