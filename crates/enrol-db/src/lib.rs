//! # enrol-db
//!
//! Records, store traits and backends for the enrol provisioning service.
//!
//! - [`Directory`]: user identity records, keyed by case-insensitive email.
//! - [`TokenStore`]: single-use access tokens with compare-and-set transitions.
//!
//! Two backends implement both traits: [`memory`] for development and tests,
//! and [`postgres`] for production.

pub mod error;
pub mod ids;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use ids::{ParseIdError, TokenId, UserId};
pub use memory::{MemoryDirectory, MemoryTokenStore};
pub use models::{
    AccessToken, Guard, NewAccessToken, NewUser, Superseded, TokenPurpose, TokenState,
    TokenStatus, Transition, TransitionRejected, UserMetadata, UserRecord, UserStatus,
};
pub use postgres::{connect, run_migrations, PgDirectory, PgTokenStore};
pub use store::{Directory, TokenStore};
