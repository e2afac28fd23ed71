//! SQLite storage backend for lockdown
//!
//! Failures live in `login_fails` and lockouts in `lockdowns`. Timestamps are
//! stored as unix seconds and addresses in their normalized text form, so a
//! subnet lookup is a plain prefix comparison on `ip_address`.
//!
//! ```rust,no_run
//! use lockdown_core::RepositoryProvider;
//! use lockdown_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), lockdown_core::Error> {
//! let storage = SqliteStorage::connect("sqlite://lockdown.db").await?;
//! let provider = storage.into_repository_provider();
//! provider.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use lockdown_core::{Error, error::StorageError};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub use repositories::{SqliteAttemptRepository, SqliteLockoutRepository, SqliteRepositoryProvider};

/// A connected SQLite database.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, creating the database file when it does not exist.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                StorageError::Connection(e.to_string())
            })?;

        tracing::debug!(url, "Connected to SQLite");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }
}
