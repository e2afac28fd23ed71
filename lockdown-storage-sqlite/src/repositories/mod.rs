//! Repository implementations for SQLite storage

pub mod attempt;
pub mod lockout;

pub use attempt::SqliteAttemptRepository;
pub use lockout::SqliteLockoutRepository;

use async_trait::async_trait;
use lockdown_core::{
    Error,
    error::utilities::DatabaseResultExt,
    repositories::{AttemptRepositoryProvider, LockoutRepositoryProvider, RepositoryProvider},
};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::migrations::migrator;

/// Repository provider implementation for SQLite
///
/// This struct implements both repository provider traits as well as the
/// unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    attempts: Arc<SqliteAttemptRepository>,
    lockouts: Arc<SqliteLockoutRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let attempts = Arc::new(SqliteAttemptRepository::new(pool.clone()));
        let lockouts = Arc::new(SqliteLockoutRepository::new(pool.clone()));

        Self {
            pool,
            attempts,
            lockouts,
        }
    }

    /// The pool shared by both repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl AttemptRepositoryProvider for SqliteRepositoryProvider {
    type AttemptRepo = SqliteAttemptRepository;

    fn attempts(&self) -> &Self::AttemptRepo {
        &self.attempts
    }
}

impl LockoutRepositoryProvider for SqliteRepositoryProvider {
    type LockoutRepo = SqliteLockoutRepository;

    fn lockouts(&self) -> &Self::LockoutRepo {
        &self.lockouts
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let applied = migrator(self.pool.clone())?.migrate_to_latest().await?;

        tracing::debug!(applied = applied.len(), "SQLite lockdown schema is up to date");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_db_err()?;
        Ok(())
    }
}
