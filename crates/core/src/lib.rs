//! Core types and traits for blocksnap
//!
//! This crate defines the foundations used throughout the system:
//! - Error: the error taxonomy shared by the store and the engine
//! - ActivateOutcome / DeactivateOutcome: idempotent control-plane results
//! - Device name validation and sanitization
//! - Limits: size and depth bounds enforced at the boundary
//! - CredentialVerifier: the seam to the external credential collaborator
//!
//! No I/O and no threads live here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use limits::{
    DEFAULT_BLOCK_SIZE, DEFAULT_QUEUE_DEPTH, DEFAULT_SNAPSHOT_ROOT, MAX_DEVICE_NAME_LEN,
    MAX_SECRET_LEN, MIN_SECRET_LEN, TIMESTAMP_FORMAT,
};
pub use traits::CredentialVerifier;
pub use types::{
    sanitize_device_name, validate_device_name, validate_secret, ActivateOutcome,
    DeactivateOutcome,
};
