//! In-process stores.
//!
//! Used by the development server and by tests. Each store keeps its state
//! behind a single lock, so every trait method is atomic with respect to the
//! others, matching the conditional-write semantics of the Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::ids::{TokenId, UserId};
use crate::models::{
    AccessToken, Guard, NewAccessToken, NewUser, Superseded, TokenStatus, UserRecord, UserStatus,
};
use crate::store::{Directory, TokenStore};

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<UserId, UserRecord>,
    by_email: HashMap<String, UserId>,
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users held.
    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Overwrite a user's status. Lets callers seed disabled accounts.
    pub async fn set_status(&self, id: UserId, status: UserStatus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let key = user.email.to_lowercase();
        let mut state = self.state.write().await;
        if state.by_email.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "user with email '{}' already exists",
                user.email
            )));
        }

        let now = Utc::now();
        let record = UserRecord {
            id: UserId::new(),
            email: user.email,
            password_hash: None,
            status: UserStatus::Pending,
            metadata: user.metadata,
            created_at: now,
            updated_at: now,
            activated_at: None,
        };
        state.by_email.insert(key, record.id);
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_password_and_activate(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;

        let now = Utc::now();
        user.password_hash = Some(password_hash.to_string());
        user.status = UserStatus::Active;
        user.activated_at.get_or_insert(now);
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[derive(Debug, Default)]
struct TokenTable {
    tokens: HashMap<String, AccessToken>,
}

impl TokenTable {
    fn revoke_outstanding(&mut self, user_id: UserId, now: DateTime<Utc>) -> u64 {
        let mut revoked = 0;
        for token in self.tokens.values_mut() {
            if token.user_id == user_id && token.status.is_outstanding() {
                token.status = TokenStatus::Revoked;
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        revoked
    }
}

/// Token store held in memory, keyed by token hash.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: RwLock<TokenTable>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every token ever issued to a user, newest first.
    pub async fn all_for_user(&self, user_id: UserId) -> Vec<AccessToken> {
        let state = self.state.read().await;
        let mut tokens: Vec<_> = state
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        tokens
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.state.read().await.tokens.get(token_hash).cloned())
    }

    async fn supersede(&self, token: NewAccessToken) -> Result<Superseded, StoreError> {
        let mut state = self.state.write().await;
        if state.tokens.contains_key(&token.token_hash) {
            return Err(StoreError::Conflict("token hash already exists".to_string()));
        }

        let revoked = state.revoke_outstanding(token.user_id, token.issued_at);
        let record = AccessToken {
            id: TokenId::new(),
            token_hash: token.token_hash,
            user_id: token.user_id,
            purpose: token.purpose,
            status: TokenStatus::Issued,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            verified_at: None,
            consumed_at: None,
            revoked_at: None,
        };
        state
            .tokens
            .insert(record.token_hash.clone(), record.clone());

        Ok(Superseded {
            token: record,
            revoked,
        })
    }

    async fn transition(
        &self,
        token_hash: &str,
        guard: Guard,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        let mut state = self.state.write().await;
        let Some(token) = state.tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        if !token.apply(guard, now) {
            return Ok(None);
        }
        Ok(Some(token.clone()))
    }

    async fn reopen(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError> {
        let mut state = self.state.write().await;
        let Some(user_id) = state
            .tokens
            .get(token_hash)
            .filter(|t| t.status == TokenStatus::Consumed)
            .map(|t| t.user_id)
        else {
            return Ok(None);
        };
        if state
            .tokens
            .values()
            .any(|t| t.user_id == user_id && t.status.is_outstanding())
        {
            return Ok(None);
        }
        let Some(token) = state.tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        token.status = TokenStatus::Verified;
        token.consumed_at = None;
        Ok(Some(token.clone()))
    }

    async fn outstanding_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessToken>, StoreError> {
        let state = self.state.read().await;
        let mut tokens: Vec<_> = state
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.status.is_outstanding() && !t.is_expired_at(now))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(tokens)
    }
}
