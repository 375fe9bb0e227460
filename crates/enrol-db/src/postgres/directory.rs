//! PostgreSQL-backed directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::ids::UserId;
use crate::models::{NewUser, UserMetadata, UserRecord, UserStatus};
use crate::store::Directory;

#[derive(Debug, FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    password_hash: Option<String>,
    status: UserStatus,
    first_name: Option<String>,
    last_name: Option<String>,
    display_name: Option<String>,
    university: Option<String>,
    department: Option<String>,
    student_id: Option<String>,
    attributes: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            status: row.status,
            metadata: UserMetadata {
                first_name: row.first_name,
                last_name: row.last_name,
                display_name: row.display_name,
                university: row.university,
                department: row.department,
                student_id: row.student_id,
                attributes: row.attributes.0,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            activated_at: row.activated_at,
        }
    }
}

/// Directory stored in the `users` table.
#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER($1)
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT * FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let NewUser { email, metadata } = user;

        let row: UserRow = sqlx::query_as(
            r"
            INSERT INTO users (
                id, email, password_hash, status, first_name, last_name,
                display_name, university, department, student_id, attributes
            )
            VALUES ($1, $2, NULL, 'pending', $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(UserId::new())
        .bind(&email)
        .bind(&metadata.first_name)
        .bind(&metadata.last_name)
        .bind(&metadata.display_name)
        .bind(&metadata.university)
        .bind(&metadata.department)
        .bind(&metadata.student_id)
        .bind(Json(&metadata.attributes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("user with email '{email}' already exists"))
            }
            other => other,
        })?;

        Ok(row.into())
    }

    async fn set_password_and_activate(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            UPDATE users
            SET password_hash = $2,
                status = 'active',
                activated_at = COALESCE(activated_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }
}
