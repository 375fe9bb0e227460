//! Access token records and their state machine.
//!
//! ```text
//! (none) --issue--> Issued --verify--> Verified --commit--> Consumed
//! Issued|Verified --time passes--> Expired     (derived, never stored)
//! Issued|Verified --reissue-->     Revoked
//! ```
//!
//! Only the stored part of the state (`TokenStatus`) lives in the database.
//! `TokenState` folds the clock in, so an unexpired-looking row whose
//! `expires_at` has passed is still reported as `Expired`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{TokenId, UserId};

/// Why a token was issued. Each purpose has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "token_purpose", rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Sent to users created by a bulk import.
    Invitation,
    /// Requested by the user through the token request endpoint.
    Access,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Invitation => "invitation",
            TokenPurpose::Access => "access",
        }
    }
}

/// Persisted token status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "token_status", rename_all = "snake_case")]
pub enum TokenStatus {
    Issued,
    Verified,
    Consumed,
    Revoked,
}

impl TokenStatus {
    /// Issued or verified: the token still counts against the one-per-user rule.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        matches!(self, TokenStatus::Issued | TokenStatus::Verified)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Issued => "issued",
            TokenStatus::Verified => "verified",
            TokenStatus::Consumed => "consumed",
            TokenStatus::Revoked => "revoked",
        }
    }
}

/// Effective state of a token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Issued,
    Verified,
    Consumed,
    Revoked,
    Expired,
}

/// A requested state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Verify,
    Consume,
}

/// The compare-and-set a store must perform to apply a transition.
///
/// The store only writes `to` if the row still reads `from` and is unexpired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub from: TokenStatus,
    pub to: TokenStatus,
}

/// A transition the current state does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionRejected {
    #[error("token has expired")]
    Expired,
    #[error("token has already been used or was superseded")]
    AlreadyUsed,
    #[error("token must be verified first")]
    NotVerified,
}

impl TokenState {
    /// Resolve `transition` against this state.
    ///
    /// `Ok(None)` means the transition is already satisfied and no write is
    /// needed (re-verifying a verified token).
    pub fn guard(self, transition: Transition) -> Result<Option<Guard>, TransitionRejected> {
        match (self, transition) {
            (TokenState::Expired, _) => Err(TransitionRejected::Expired),
            (TokenState::Consumed | TokenState::Revoked, _) => {
                Err(TransitionRejected::AlreadyUsed)
            }
            (TokenState::Issued, Transition::Verify) => Ok(Some(Guard {
                from: TokenStatus::Issued,
                to: TokenStatus::Verified,
            })),
            (TokenState::Verified, Transition::Verify) => Ok(None),
            (TokenState::Issued, Transition::Consume) => Err(TransitionRejected::NotVerified),
            (TokenState::Verified, Transition::Consume) => Ok(Some(Guard {
                from: TokenStatus::Verified,
                to: TokenStatus::Consumed,
            })),
        }
    }
}

/// A single-use credential bootstrap token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    pub id: TokenId,
    /// SHA-256 hex digest of the token value. The raw value is never stored.
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub status: TokenStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Effective state at `now`. Expiry only overrides non-terminal statuses.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        match self.status {
            TokenStatus::Consumed => TokenState::Consumed,
            TokenStatus::Revoked => TokenState::Revoked,
            _ if self.is_expired_at(now) => TokenState::Expired,
            TokenStatus::Issued => TokenState::Issued,
            TokenStatus::Verified => TokenState::Verified,
        }
    }

    /// Apply a guard in memory, stamping the matching timestamp.
    ///
    /// Returns `false` and leaves the token untouched when the guard does not
    /// match the current status or the token is expired.
    pub fn apply(&mut self, guard: Guard, now: DateTime<Utc>) -> bool {
        if self.status != guard.from || self.is_expired_at(now) {
            return false;
        }
        self.status = guard.to;
        match guard.to {
            TokenStatus::Verified => self.verified_at = Some(now),
            TokenStatus::Consumed => self.consumed_at = Some(now),
            TokenStatus::Revoked => self.revoked_at = Some(now),
            TokenStatus::Issued => {}
        }
        true
    }
}

/// Data required to insert a fresh `issued` token.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub token_hash: String,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of issuing a token that replaces any outstanding ones.
#[derive(Debug, Clone)]
pub struct Superseded {
    pub token: AccessToken,
    /// How many previously outstanding tokens were revoked.
    pub revoked: u64,
}
