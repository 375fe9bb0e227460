//! Store traits consumed by the import pipeline and the token lifecycle.
//!
//! Every state change is expressed as a conditional write so that concurrent
//! requests for the same user or token cannot lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::ids::UserId;
use crate::models::{AccessToken, Guard, NewAccessToken, NewUser, Superseded, UserRecord};

/// The user directory. Emails are compared case-insensitively.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a `pending` user with no password.
    ///
    /// Returns `StoreError::Conflict` if the email is already taken.
    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Store the password hash and mark the user `active` in one write.
    ///
    /// Returns `StoreError::NotFound` if the user does not exist.
    async fn set_password_and_activate(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError>;
}

/// Durable store of access tokens. Rows are never deleted.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Revoke every outstanding token of `token.user_id` and insert `token`
    /// as `issued`, atomically.
    async fn supersede(&self, token: NewAccessToken) -> Result<Superseded, StoreError>;

    /// Compare-and-set: apply `guard` only if the row still reads
    /// `guard.from` and has not expired at `now`.
    ///
    /// Returns `None` when the condition did not hold; nothing is written.
    async fn transition(
        &self,
        token_hash: &str,
        guard: Guard,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError>;

    /// Undo a consume (`consumed` back to `verified`). Used only to compensate
    /// when the directory write after a consume fails.
    ///
    /// Returns `None` and leaves the token consumed if it is not consumed or
    /// if another token of the same user is outstanding.
    async fn reopen(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Issued or verified tokens of a user that have not expired at `now`.
    ///
    /// The audit query for the one-outstanding-token rule: after any
    /// sequence of issues, commits and compensations it returns at most one
    /// token.
    async fn outstanding_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessToken>, StoreError>;
}
