//! Error types for credential operations.

use thiserror::Error;

use crate::policy::PasswordValidationResult;

/// Credential operation errors.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Password hashing operation failed.
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// Password hash format is invalid.
    #[error("Invalid password hash format")]
    InvalidHashFormat,

    /// Password does not meet the configured policy.
    #[error("Weak password: {}", .0.error_message())]
    WeakPassword(PasswordValidationResult),
}
