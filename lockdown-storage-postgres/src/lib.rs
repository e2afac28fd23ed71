//! Postgres storage backend for lockdown
//!
//! Uses the same `login_fails` and `lockdowns` tables as the SQLite backend
//! with `TIMESTAMPTZ` columns. Subnet lookups match `ip_address LIKE prefix || '%'`,
//! which the `text_pattern_ops` indexes serve as a range scan.

pub mod migrations;
pub mod repositories;

use lockdown_core::{Error, error::StorageError};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub use repositories::{
    PostgresAttemptRepository, PostgresLockoutRepository, PostgresRepositoryProvider,
};

/// A connected Postgres database.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new().connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to Postgres");
            StorageError::Connection(e.to_string())
        })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> PostgresRepositoryProvider {
        PostgresRepositoryProvider::new(self.pool)
    }
}
