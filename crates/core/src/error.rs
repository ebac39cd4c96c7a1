//! Error types for block snapshotting
//!
//! This module defines the error taxonomy used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! "Already in requested state" results (re-activating an enabled device,
//! re-deactivating a disabled one) are deliberately NOT errors — they are
//! reported through [`crate::types::ActivateOutcome`] and
//! [`crate::types::DeactivateOutcome`] so callers can distinguish a no-op
//! from a state change without matching on an error variant.

use std::io;
use thiserror::Error;

/// Result type alias for snapshot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for snapshot operations
#[derive(Debug, Error)]
pub enum Error {
    /// Device is not registered
    #[error("device not found: {0}")]
    NotFound(String),

    /// Device name or secret failed format validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted on a disabled device, or credential check failed
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Structural conflict: double mount, or restore of a live session
    #[error("busy: {0}")]
    Busy(String),

    /// Operation does not apply to the device's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Allocation failure for bitmap, queue, or buffers
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Filesystem I/O error on journal, block files, or the live device
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Journal is structurally invalid (short header, bad checksum)
    #[error("malformed journal: {0}")]
    Malformed(String),

    /// Journal magic or format version disagrees with this build
    #[error("journal format mismatch: expected {expected}, found {found}")]
    FormatMismatch {
        /// What this build understands
        expected: String,
        /// What the journal carried
        found: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("/dev/loop0".to_string());
        let msg = err.to_string();
        assert!(msg.contains("device not found"));
        assert!(msg.contains("/dev/loop0"));
    }

    #[test]
    fn test_error_display_busy() {
        let err = Error::Busy("already mounted".to_string());
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_error_display_format_mismatch() {
        let err = Error::FormatMismatch {
            expected: "magic 0x534e4150".to_string(),
            found: "magic 0xdeadbeef".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x534e4150"));
        assert!(msg.contains("0xdeadbeef"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_error() -> Result<i32> {
            Err(Error::InvalidState("not mounted".to_string()))
        }
        assert!(returns_error().is_err());
    }
}
