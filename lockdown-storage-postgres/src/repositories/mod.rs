//! Repository implementations for Postgres storage

pub mod attempt;
pub mod lockout;

pub use attempt::PostgresAttemptRepository;
pub use lockout::PostgresLockoutRepository;

use async_trait::async_trait;
use lockdown_core::{
    Error,
    error::utilities::DatabaseResultExt,
    repositories::{AttemptRepositoryProvider, LockoutRepositoryProvider, RepositoryProvider},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::migrations::migrator;

/// Repository provider implementation for Postgres
pub struct PostgresRepositoryProvider {
    pool: PgPool,
    attempts: Arc<PostgresAttemptRepository>,
    lockouts: Arc<PostgresLockoutRepository>,
}

impl PostgresRepositoryProvider {
    pub fn new(pool: PgPool) -> Self {
        let attempts = Arc::new(PostgresAttemptRepository::new(pool.clone()));
        let lockouts = Arc::new(PostgresLockoutRepository::new(pool.clone()));

        Self {
            pool,
            attempts,
            lockouts,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AttemptRepositoryProvider for PostgresRepositoryProvider {
    type AttemptRepo = PostgresAttemptRepository;

    fn attempts(&self) -> &Self::AttemptRepo {
        &self.attempts
    }
}

impl LockoutRepositoryProvider for PostgresRepositoryProvider {
    type LockoutRepo = PostgresLockoutRepository;

    fn lockouts(&self) -> &Self::LockoutRepo {
        &self.lockouts
    }
}

#[async_trait]
impl RepositoryProvider for PostgresRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let applied = migrator(self.pool.clone())?.migrate_to_latest().await?;

        tracing::debug!(applied = applied.len(), "Postgres lockdown schema is up to date");
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
