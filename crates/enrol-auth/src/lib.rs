//! # enrol-auth
//!
//! Credential primitives for the enrol provisioning service:
//! Argon2id password hashing, a configurable password policy, and
//! generation and hashing of single-use access token values.

pub mod error;
pub mod password;
pub mod policy;
pub mod token;

pub use error::AuthError;
pub use password::PasswordHasher;
pub use policy::{PasswordPolicy, PasswordPolicyError, PasswordValidationResult, SPECIAL_CHARS};
pub use token::{generate_token, hash_token, TOKEN_BYTES};
