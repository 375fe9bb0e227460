//! Password policy validation.
//!
//! Only length and character classes are checked. There is no history or
//! age rule because a committed token can never be used again.

use serde::{Deserialize, Serialize};

/// Special characters accepted for the special-character class.
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicyError {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecialChar,
}

impl PasswordPolicyError {
    /// Stable machine-readable rule name.
    #[must_use]
    pub fn rule(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "min_length",
            Self::TooLong { .. } => "max_length",
            Self::MissingUppercase => "uppercase",
            Self::MissingLowercase => "lowercase",
            Self::MissingDigit => "digit",
            Self::MissingSpecialChar => "special",
        }
    }
}

impl std::fmt::Display for PasswordPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { min, actual } => {
                write!(
                    f,
                    "Password must be at least {min} characters (got {actual})"
                )
            }
            Self::TooLong { max, actual } => {
                write!(
                    f,
                    "Password must be at most {max} characters (got {actual})"
                )
            }
            Self::MissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            Self::MissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            Self::MissingDigit => write!(f, "Password must contain at least one digit"),
            Self::MissingSpecialChar => {
                write!(f, "Password must contain at least one special character")
            }
        }
    }
}

/// Result of password validation against policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordValidationResult {
    pub is_valid: bool,
    /// Empty if valid.
    pub errors: Vec<PasswordPolicyError>,
}

impl PasswordValidationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_errors(errors: Vec<PasswordPolicyError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// All error messages joined with `; `.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Rule names of every violation, in check order.
    #[must_use]
    pub fn rules(&self) -> Vec<&'static str> {
        self.errors.iter().map(PasswordPolicyError::rule).collect()
    }
}

/// Configurable password policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

impl PasswordPolicy {
    /// Check `password` against every rule and collect all violations.
    ///
    /// Length is counted in characters, not bytes.
    #[must_use]
    pub fn validate(&self, password: &str) -> PasswordValidationResult {
        let mut errors = Vec::new();
        let len = password.chars().count();

        if len < self.min_length {
            errors.push(PasswordPolicyError::TooShort {
                min: self.min_length,
                actual: len,
            });
        }

        if len > self.max_length {
            errors.push(PasswordPolicyError::TooLong {
                max: self.max_length,
                actual: len,
            });
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push(PasswordPolicyError::MissingUppercase);
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push(PasswordPolicyError::MissingLowercase);
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(PasswordPolicyError::MissingDigit);
        }

        if self.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            errors.push(PasswordPolicyError::MissingSpecialChar);
        }

        PasswordValidationResult::with_errors(errors)
    }
}
