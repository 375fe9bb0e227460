//! Token lifecycle: issue, verify, commit.
//!
//! The manager is the only writer of token state. Each transition first
//! classifies the token against the clock (fast failure with a precise
//! error), then applies a compare-and-set in the store. If the store refuses
//! the write, another request got there first; the token is re-read and the
//! error reflects what that request did.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use enrol_auth::{generate_token, hash_token, AuthError, PasswordHasher, PasswordPolicy};
use enrol_db::{
    AccessToken, Directory, NewAccessToken, TokenPurpose, TokenStore, Transition, UserId,
    UserRecord,
};

use crate::error::ProvisioningError;
use crate::models::{DeliveryStatus, TokenConfig};
use crate::services::notifier::NotificationDispatcher;
use crate::validation::normalize_email;

/// Attempts at a supersede that lost a race to a concurrent issue.
const SUPERSEDE_ATTEMPTS: usize = 3;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A freshly issued token. `value` is the only copy of the raw token.
#[derive(Clone)]
pub struct IssuedToken {
    pub value: String,
    pub record: AccessToken,
    /// Outstanding tokens this one replaced.
    pub revoked: u64,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"[REDACTED]")
            .field("record", &self.record)
            .field("revoked", &self.revoked)
            .finish()
    }
}

/// Result of issuing a token and handing it to the notifier.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub token: IssuedToken,
    pub delivery: DeliveryStatus,
}

pub struct TokenLifecycleManager {
    directory: Arc<dyn Directory>,
    tokens: Arc<dyn TokenStore>,
    dispatcher: NotificationDispatcher,
    config: TokenConfig,
    policy: PasswordPolicy,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl TokenLifecycleManager {
    pub fn new(
        directory: Arc<dyn Directory>,
        tokens: Arc<dyn TokenStore>,
        dispatcher: NotificationDispatcher,
        config: TokenConfig,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            directory,
            tokens,
            dispatcher,
            config,
            policy,
            hasher: PasswordHasher::new(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a token for `user`, revoking any outstanding one.
    pub async fn issue(
        &self,
        user: &UserRecord,
        purpose: TokenPurpose,
    ) -> Result<IssuedToken, ProvisioningError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let value = generate_token();
            let issued_at = self.clock.now();
            let new_token = NewAccessToken {
                token_hash: hash_token(&value),
                user_id: user.id,
                purpose,
                issued_at,
                expires_at: issued_at + self.config.ttl_for(purpose),
            };

            match self.tokens.supersede(new_token).await {
                Ok(superseded) => {
                    tracing::info!(
                        user_id = %user.id,
                        token_id = %superseded.token.id,
                        purpose = purpose.as_str(),
                        revoked = superseded.revoked,
                        expires_at = %superseded.token.expires_at,
                        "Token issued"
                    );
                    return Ok(IssuedToken {
                        value,
                        record: superseded.token,
                        revoked: superseded.revoked,
                    });
                }
                Err(e) if e.is_conflict() && attempt < SUPERSEDE_ATTEMPTS => {
                    tracing::debug!(user_id = %user.id, attempt, "Supersede raced, retrying");
                }
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to issue token");
                    return Err(e.into());
                }
            }
        }
    }

    /// Issue a token and send it. Delivery failure is reported, not raised.
    pub async fn issue_and_notify(
        &self,
        user: &UserRecord,
        purpose: TokenPurpose,
    ) -> Result<Dispatched, ProvisioningError> {
        let token = self.issue(user, purpose).await?;
        let delivery = self
            .dispatcher
            .dispatch(&user.email, &token.value, purpose)
            .await;
        Ok(Dispatched { token, delivery })
    }

    /// Issue and send a fresh access token to the user owning `email`.
    ///
    /// Unknown and disabled users both yield `UnknownUser`.
    pub async fn request_token(&self, email: &str) -> Result<Dispatched, ProvisioningError> {
        let email = normalize_email(email);
        let user = self
            .directory
            .find_by_email(&email)
            .await?
            .filter(UserRecord::can_receive_token)
            .ok_or(ProvisioningError::UnknownUser)?;

        self.issue_and_notify(&user, TokenPurpose::Access).await
    }

    /// Move an issued token to `verified` and return its user.
    ///
    /// Re-verifying a verified token succeeds without writing.
    pub async fn verify_token(&self, token: &str) -> Result<UserId, ProvisioningError> {
        let hash = hash_token(token);
        let now = self.clock.now();
        let record = self.find(&hash).await?;

        let Some(guard) = record.state_at(now).guard(Transition::Verify)? else {
            return Ok(record.user_id);
        };

        match self.tokens.transition(&hash, guard, now).await? {
            Some(verified) => {
                tracing::info!(
                    user_id = %verified.user_id,
                    token_id = %verified.id,
                    "Token verified"
                );
                Ok(verified.user_id)
            }
            None => {
                // A concurrent verify wins with the same result; anything
                // else that happened in between is an error.
                let current = self.find(&hash).await?;
                match current.state_at(now).guard(Transition::Verify)? {
                    None => Ok(current.user_id),
                    Some(_) => Err(ProvisioningError::TokenAlreadyUsed),
                }
            }
        }
    }

    /// Set the password of the token's user, activate them and consume the
    /// token.
    ///
    /// The consume is the linearization point: of two concurrent commits
    /// with the same token exactly one gets past it. If the directory write
    /// then fails, the consume is undone so the client can retry, unless a
    /// newer token was issued in the meantime.
    pub async fn commit_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<UserId, ProvisioningError> {
        let hash = hash_token(token);
        let now = self.clock.now();
        let record = self.find(&hash).await?;

        let Some(guard) = record.state_at(now).guard(Transition::Consume)? else {
            return Err(ProvisioningError::TokenAlreadyUsed);
        };

        let validation = self.policy.validate(new_password);
        if !validation.is_valid {
            tracing::info!(
                user_id = %record.user_id,
                rules = ?validation.rules(),
                "Password rejected by policy"
            );
            return Err(AuthError::WeakPassword(validation).into());
        }
        let password_hash = self.hasher.hash(new_password)?;

        let user = self
            .directory
            .find_by_id(record.user_id)
            .await?
            .filter(UserRecord::can_receive_token)
            .ok_or(ProvisioningError::TokenNotFound)?;

        let Some(consumed) = self.tokens.transition(&hash, guard, now).await? else {
            let current = self.find(&hash).await?;
            return Err(match current.state_at(now).guard(Transition::Consume) {
                Err(rejected) => rejected.into(),
                // Still verified means the row moved and came back; treat the
                // loser like any other second commit.
                Ok(_) => ProvisioningError::TokenAlreadyUsed,
            });
        };

        if let Err(e) = self
            .directory
            .set_password_and_activate(user.id, &password_hash)
            .await
        {
            tracing::error!(
                user_id = %user.id,
                token_id = %consumed.id,
                error = %e,
                "Directory update failed after consume, reopening token"
            );
            match self.tokens.reopen(&hash).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!(
                    user_id = %user.id,
                    token_id = %consumed.id,
                    "Token left consumed, a newer token is outstanding"
                ),
                Err(reopen_err) => tracing::error!(
                    token_id = %consumed.id,
                    error = %reopen_err,
                    "Failed to reopen token"
                ),
            }
            return Err(ProvisioningError::StoreUnavailable(e.to_string()));
        }

        tracing::info!(
            user_id = %user.id,
            token_id = %consumed.id,
            "Token consumed, user activated"
        );
        Ok(user.id)
    }

    async fn find(&self, token_hash: &str) -> Result<AccessToken, ProvisioningError> {
        self.tokens
            .find_by_hash(token_hash)
            .await?
            .ok_or(ProvisioningError::TokenNotFound)
    }
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
