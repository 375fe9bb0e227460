//! PostgreSQL-backed token store.
//!
//! Transitions are single `UPDATE ... WHERE status = $from` statements, so the
//! database serialises competing writers and exactly one of them sees a row
//! come back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::ids::{TokenId, UserId};
use crate::models::{
    AccessToken, Guard, NewAccessToken, Superseded, TokenPurpose, TokenStatus,
};
use crate::store::TokenStore;

#[derive(Debug, FromRow)]
struct TokenRow {
    id: TokenId,
    token_hash: String,
    user_id: UserId,
    purpose: TokenPurpose,
    status: TokenStatus,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
    consumed_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for AccessToken {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            token_hash: row.token_hash,
            user_id: row.user_id,
            purpose: row.purpose,
            status: row.status,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            verified_at: row.verified_at,
            consumed_at: row.consumed_at,
            revoked_at: row.revoked_at,
        }
    }
}

/// Token store kept in the `access_tokens` table.
#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError> {
        let row: Option<TokenRow> = sqlx::query_as(
            r"
            SELECT * FROM access_tokens
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccessToken::from))
    }

    async fn supersede(&self, token: NewAccessToken) -> Result<Superseded, StoreError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r"
            UPDATE access_tokens
            SET status = 'revoked', revoked_at = $2
            WHERE user_id = $1 AND status IN ('issued', 'verified')
            ",
        )
        .bind(token.user_id)
        .bind(token.issued_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // The partial unique index on outstanding tokens turns a concurrent
        // supersede for the same user into a unique violation here.
        let row: TokenRow = sqlx::query_as(
            r"
            INSERT INTO access_tokens
                (id, token_hash, user_id, purpose, status, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, 'issued', $5, $6)
            RETURNING *
            ",
        )
        .bind(TokenId::new())
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.purpose)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Superseded {
            token: row.into(),
            revoked,
        })
    }

    async fn transition(
        &self,
        token_hash: &str,
        guard: Guard,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        let row: Option<TokenRow> = sqlx::query_as(
            r"
            UPDATE access_tokens
            SET status = $3,
                verified_at = CASE WHEN $3 = 'verified'::token_status THEN $4 ELSE verified_at END,
                consumed_at = CASE WHEN $3 = 'consumed'::token_status THEN $4 ELSE consumed_at END,
                revoked_at  = CASE WHEN $3 = 'revoked'::token_status  THEN $4 ELSE revoked_at  END
            WHERE token_hash = $1 AND status = $2 AND expires_at > $4
            RETURNING *
            ",
        )
        .bind(token_hash)
        .bind(guard.from)
        .bind(guard.to)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccessToken::from))
    }

    async fn reopen(&self, token_hash: &str) -> Result<Option<AccessToken>, StoreError> {
        let result: Result<Option<TokenRow>, sqlx::Error> = sqlx::query_as(
            r"
            UPDATE access_tokens
            SET status = 'verified', consumed_at = NULL
            WHERE token_hash = $1 AND status = 'consumed'
              AND NOT EXISTS (
                  SELECT 1 FROM access_tokens o
                  WHERE o.user_id = access_tokens.user_id
                    AND o.status IN ('issued', 'verified')
              )
            RETURNING *
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await;

        match result.map_err(StoreError::from) {
            Ok(row) => Ok(row.map(AccessToken::from)),
            // A token issued concurrently now holds the outstanding slot.
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn outstanding_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessToken>, StoreError> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r"
            SELECT * FROM access_tokens
            WHERE user_id = $1 AND status IN ('issued', 'verified') AND expires_at > $2
            ORDER BY issued_at DESC
            ",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AccessToken::from).collect())
    }
}
