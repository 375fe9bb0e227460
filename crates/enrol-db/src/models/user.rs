//! Directory user records.
//!
//! Users are created `pending` with no password by the bulk import and only
//! become `active` when a verified token is committed with a password.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::UserId;

/// Activation status of a directory user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
pub enum UserStatus {
    /// Imported, waiting for a password.
    Pending,
    /// Password set; the account can sign in.
    Active,
    /// Administratively blocked. Never produced by this subsystem.
    Disabled,
}

impl UserStatus {
    /// Stable lowercase name, matching the database enum label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory metadata carried by an imported row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    /// University affiliation.
    pub university: Option<String>,
    pub department: Option<String>,
    /// Institution-issued student or staff number.
    pub student_id: Option<String>,
    /// Columns the importer did not recognise, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// A user identity record held by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Lowercased, unique.
    pub email: String,
    /// PHC-formatted hash; `None` until the first commit.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub status: UserStatus,
    #[serde(flatten)]
    pub metadata: UserMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// `active` implies a password hash is present.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.status != UserStatus::Active || self.password_hash.is_some()
    }

    /// Whether this user may be issued a token.
    ///
    /// Disabled accounts are treated exactly like unknown ones by callers.
    #[must_use]
    pub fn can_receive_token(&self) -> bool {
        self.status != UserStatus::Disabled
    }
}

/// Data required to insert a new pending user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Must already be trimmed and lowercased.
    pub email: String,
    pub metadata: UserMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: UserStatus, password_hash: Option<&str>) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: UserId::new(),
            email: "alice@u.edu".to_string(),
            password_hash: password_hash.map(str::to_string),
            status,
            metadata: UserMetadata::default(),
            created_at: now,
            updated_at: now,
            activated_at: None,
        }
    }

    #[test]
    fn test_active_without_password_is_inconsistent() {
        assert!(!record(UserStatus::Active, None).is_consistent());
        assert!(record(UserStatus::Active, Some("$argon2id$...")).is_consistent());
        assert!(record(UserStatus::Pending, None).is_consistent());
    }

    #[test]
    fn test_disabled_users_cannot_receive_tokens() {
        assert!(!record(UserStatus::Disabled, None).can_receive_token());
        assert!(record(UserStatus::Pending, None).can_receive_token());
        assert!(record(UserStatus::Active, Some("h")).can_receive_token());
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let json = serde_json::to_value(record(UserStatus::Active, Some("secret-hash"))).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["status"], "active");
    }
}
