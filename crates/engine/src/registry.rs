//! Device registry
//!
//! Concurrent map from device name to reference-counted device records.
//! Lookups are lock-free reads on the sharded map and hand back an `Arc`
//! clone — a lookup racing a concurrent final release either finds a
//! live entry or no entry, never a dangling record. Structural mutations
//! (insert, evict) are serialized by one registry-wide mutex so
//! check-then-act sequences cannot interleave.
//!
//! Eviction removes the entry from the map and defers the device queue's
//! teardown to the cleanup scheduler; it must never run on the queue
//! being destroyed.

use std::sync::Arc;

use blocksnap_core::{validate_device_name, ActivateOutcome, DeactivateOutcome, Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cleanup::CleanupScheduler;
use crate::config::Config;
use crate::device::{DeviceHandle, SnapshotDevice};

/// Registry of protected devices.
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceHandle>,
    /// Serializes insert and evict; never taken on the lookup path
    structural: Mutex<()>,
    cleanup: CleanupScheduler,
    config: Config,
}

impl DeviceRegistry {
    /// Create an empty registry with its cleanup worker.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        Ok(Arc::new(DeviceRegistry {
            devices: DashMap::new(),
            structural: Mutex::new(()),
            cleanup: CleanupScheduler::new()?,
            config,
        }))
    }

    /// Engine configuration this registry was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a new device, or re-enable an existing one.
    pub fn register_or_enable(&self, name: &str) -> Result<ActivateOutcome> {
        validate_device_name(name)?;
        let _structural = self.structural.lock();

        if let Some(existing) = self.devices.get(name) {
            return if existing.enable() {
                info!(device = %name, "snapshotting re-enabled");
                Ok(ActivateOutcome::Created)
            } else {
                debug!(device = %name, "snapshotting already enabled");
                Ok(ActivateOutcome::AlreadyEnabled)
            };
        }

        let device = SnapshotDevice::new(name, self.config.queue_depth)?;
        self.devices.insert(name.to_string(), device);
        info!(device = %name, "snapshotting activated");
        Ok(ActivateOutcome::Created)
    }

    /// Disable a device; evict it if it is not mounted.
    pub fn disable(&self, name: &str) -> Result<DeactivateOutcome> {
        validate_device_name(name)?;
        let _structural = self.structural.lock();

        let device = match self.devices.get(name) {
            Some(entry) => entry.value().clone(),
            None => return Err(Error::NotFound(name.to_string())),
        };

        if !device.disable() {
            debug!(device = %name, "snapshotting already disabled");
            return Ok(DeactivateOutcome::AlreadyDisabled);
        }

        info!(device = %name, "snapshotting deactivated");
        self.evict_locked(&device);
        Ok(DeactivateOutcome::Disabled)
    }

    /// Look up a device and acquire a handle to it.
    ///
    /// Lock-free read path; never blocks on the structural mutex, so it
    /// is safe from the capture fast path.
    pub fn find(&self, name: &str) -> Option<DeviceHandle> {
        self.devices.get(name).map(|entry| entry.value().clone())
    }

    /// Evict the device if it is disabled and unmounted.
    ///
    /// Called after close-session (which runs on the device's own queue)
    /// for devices disabled mid-session. Returns whether eviction
    /// happened.
    pub fn evict_if_idle(&self, device: &DeviceHandle) -> bool {
        let _structural = self.structural.lock();
        self.evict_locked(device)
    }

    /// Structural mutex must be held. Pointer identity is re-checked so
    /// a re-registered device with the same name is never evicted by a
    /// stale task.
    fn evict_locked(&self, device: &DeviceHandle) -> bool {
        let removed = self
            .devices
            .remove_if(device.name(), |_, entry| {
                Arc::ptr_eq(entry, device) && entry.is_idle()
            });
        match removed {
            Some((name, evicted)) => {
                debug!(device = %name, "device evicted from registry");
                // Handles already cloned by concurrent lookups keep the
                // record alive; the queue is torn down off-queue.
                self.cleanup.defer_teardown(evicted);
                true
            }
            None => false,
        }
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry has no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Force every device through disable, unmount, session close, and
    /// teardown. Pending persistence tasks are drained, not cancelled.
    pub fn shutdown_all(&self) {
        info!("shutting down snapshot registry");

        let handles: Vec<DeviceHandle> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for device in handles {
            device.disable();
            let _ = device.mark_unmounted();
            // Finish whatever the device queue still holds (session open,
            // captures, the unmount close) before closing directly.
            device.queue().drain();
            if let Err(e) = device.close_session() {
                warn!(device = %device.name(), error = %e, "close on shutdown failed");
            }
            self.evict_if_idle(&device);
        }

        self.cleanup.drain();
        self.cleanup.shutdown();
    }
}
