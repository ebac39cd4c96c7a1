//! Shared types and input validation
//!
//! Device names are user-controlled strings that end up as directory
//! components on disk, so they are validated once at the control-plane
//! boundary and sanitized before any path is built from them.

use crate::error::{Error, Result};
use crate::limits::{MAX_DEVICE_NAME_LEN, MAX_SECRET_LEN, MIN_SECRET_LEN};

/// Outcome of an activate request
///
/// Re-enabling a previously disabled device also reports `Created` — the
/// caller asked for protection and got it; only a true no-op is
/// `AlreadyEnabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// Device was registered (or re-enabled) and is now protected
    Created,
    /// Device was already enabled; nothing changed
    AlreadyEnabled,
}

/// Outcome of a deactivate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivateOutcome {
    /// Protection was switched off
    Disabled,
    /// Device was already disabled; nothing changed
    AlreadyDisabled,
}

/// Validate a device name.
///
/// Accepted names are absolute paths: non-empty, at most
/// [`MAX_DEVICE_NAME_LEN`] bytes, starting with `/`, without `//`,
/// without a trailing `/`, and made of printable characters only.
pub fn validate_device_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("empty device name".to_string()));
    }
    if name.len() > MAX_DEVICE_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "name exceeds {} bytes",
            MAX_DEVICE_NAME_LEN
        )));
    }
    if !name.starts_with('/') {
        return Err(Error::InvalidArgument(format!("not an absolute path: {}", name)));
    }
    if name.contains("//") {
        return Err(Error::InvalidArgument(format!("contains '//': {}", name)));
    }
    if name.ends_with('/') {
        return Err(Error::InvalidArgument(format!("trailing '/': {}", name)));
    }
    if name.bytes().any(|c| c < 32 || c == 127) {
        return Err(Error::InvalidArgument("control character in name".to_string()));
    }
    Ok(())
}

/// Replace path separators with underscores so a device name can be used
/// as a single directory component.
pub fn sanitize_device_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' { '_' } else { c })
        .collect()
}

/// Validate a credential secret's format.
///
/// Secrets must be [`MIN_SECRET_LEN`]..=[`MAX_SECRET_LEN`] characters of
/// printable non-space ASCII (33..=126) with at least one letter and one
/// digit. Hashing and storage are the credential verifier's concern; this
/// only rejects obviously weak or unrepresentable input.
pub fn validate_secret(secret: &str) -> Result<()> {
    let len = secret.len();
    if len < MIN_SECRET_LEN || len > MAX_SECRET_LEN {
        return Err(Error::InvalidArgument(format!(
            "secret must be {}-{} characters",
            MIN_SECRET_LEN, MAX_SECRET_LEN
        )));
    }
    let mut has_alpha = false;
    let mut has_digit = false;
    for b in secret.bytes() {
        if !(33..=126).contains(&b) {
            return Err(Error::InvalidArgument(
                "secret must be printable non-space ASCII".to_string(),
            ));
        }
        if b.is_ascii_alphabetic() {
            has_alpha = true;
        } else if b.is_ascii_digit() {
            has_digit = true;
        }
    }
    if !has_alpha || !has_digit {
        return Err(Error::InvalidArgument(
            "secret needs at least one letter and one digit".to_string(),
        ));
    }
    Ok(())
}
