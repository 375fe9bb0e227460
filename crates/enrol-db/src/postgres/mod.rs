//! PostgreSQL backends and migrations.

mod directory;
mod token_store;

pub use directory::PgDirectory;
pub use token_store::PgTokenStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::StoreError;

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

/// Run all pending database migrations.
///
/// Migrations are embedded at compile time from the `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(StoreError::MigrationFailed)?;

    tracing::info!("Migrations completed successfully");
    Ok(())
}
