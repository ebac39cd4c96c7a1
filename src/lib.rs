//! blocksnap - block-level copy-before-write snapshotting
//!
//! While a device is activated, the first write to any block during a
//! mount session is captured into an immutable, timestamped snapshot
//! version before it is overwritten. Versions can later be enumerated
//! and replayed back onto the live device.
//!
//! # Quick Start
//!
//! ```ignore
//! use blocksnap::{Config, SnapshotService};
//!
//! let service = SnapshotService::new(Config::default(), verifier)?;
//! service.activate("/dev/loop0", secret)?;
//!
//! // Event source drives the session:
//! service.notify_mount("/dev/loop0")?;
//! let pending = service.notify_write_begin("/dev/loop0", offset, len);
//! // ... the write happens ...
//! service.notify_write_end(pending, true, false);
//! service.notify_unmount("/dev/loop0")?;
//!
//! // Later:
//! let versions = service.list_versions("/dev/loop0")?;
//! service.restore("/dev/loop0", &versions[0], secret)?;
//! ```
//!
//! # Architecture
//!
//! The [`SnapshotService`] facade is the public surface; the registry,
//! capture pipeline, and on-disk store underneath it are re-exported for
//! embedders that need lower-level access.

pub use blocksnap_core::{
    sanitize_device_name, validate_device_name, validate_secret, ActivateOutcome,
    CredentialVerifier, DeactivateOutcome, Error, Result,
};
pub use blocksnap_engine::*;
pub use blocksnap_store::{JournalContents, JournalHeader, RestoreReport, VersionId};
