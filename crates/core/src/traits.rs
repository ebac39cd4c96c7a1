//! External-collaborator seams
//!
//! The control plane requires every privileged operation to be approved
//! by a credential verifier. How secrets are hashed and stored is the
//! verifier's business; the core only defines the seam and validates
//! secret format before delegating.

use crate::error::Result;

/// Approves privileged control-plane operations.
///
/// Implementations must be safe to call concurrently; `verify` sits on
/// the path of every activate/deactivate/restore request.
pub trait CredentialVerifier: Send + Sync {
    /// Install a new secret. The secret has already passed format
    /// validation.
    fn set_secret(&self, secret: &str) -> Result<()>;

    /// Check a presented secret against the installed one.
    ///
    /// Returns `false` when no secret has been installed yet.
    fn verify(&self, secret: &str) -> bool;
}
