//! Forward-only schema migrations for the lockdown SQL backends.
//!
//! Each backend describes its schema as an ordered list of [`Migration`]
//! steps and implements [`MigrationLedger`] for its driver. A [`Migrator`]
//! compares the two and applies whatever the database has not seen yet.
//! Lockdown tables are append-only logs, so there is no rollback path.

use async_trait::async_trait;
use thiserror::Error;

/// Bookkeeping table recording which schema versions have been applied.
pub const MIGRATION_TABLE: &str = "_lockdown_migrations";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database schema version {found} is newer than the latest known version {latest}")]
    UnknownVersion { found: i64, latest: i64 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<MigrationError> for lockdown_core::Error {
    fn from(error: MigrationError) -> Self {
        tracing::error!(error = %error, "Lockdown migration failed");
        lockdown_core::error::StorageError::Migration(error.to_string()).into()
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// One schema step: DDL statements applied in a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// Driver-specific access to the [`MIGRATION_TABLE`].
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Create the bookkeeping table if it does not exist.
    async fn ensure_table(&self) -> Result<()>;

    /// Every version recorded as applied.
    async fn applied_versions(&self) -> Result<Vec<i64>>;

    /// Run the statements of `migration` and record its version atomically.
    async fn apply(&self, migration: &Migration) -> Result<()>;
}

/// Brings a database up to the newest schema a backend knows about.
pub struct Migrator<L> {
    ledger: L,
    migrations: Vec<Migration>,
}

impl<L: MigrationLedger> Migrator<L> {
    /// Create a migrator over `migrations`, which must be in strictly
    /// ascending version order.
    pub fn new(ledger: L, migrations: &[Migration]) -> Result<Self> {
        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version >= pair[1].version)
        {
            return Err(MigrationError::Migration(format!(
                "{} (version {}) must come before {} (version {})",
                pair[1].name, pair[1].version, pair[0].name, pair[0].version
            )));
        }

        Ok(Self {
            ledger,
            migrations: migrations.to_vec(),
        })
    }

    /// Version of the newest known migration.
    pub fn latest_version(&self) -> Option<i64> {
        self.migrations.last().map(|m| m.version)
    }

    /// Migrations the database has not applied yet, in order.
    ///
    /// # Errors
    ///
    /// [`MigrationError::UnknownVersion`] if the database was migrated by a
    /// newer build than this one.
    pub async fn pending(&self) -> Result<Vec<Migration>> {
        self.ledger.ensure_table().await?;
        let applied = self.ledger.applied_versions().await?;

        let newest_applied = applied.iter().copied().max();
        if let (Some(found), Some(latest)) = (newest_applied, self.latest_version()) {
            if found > latest {
                return Err(MigrationError::UnknownVersion { found, latest });
            }
        }

        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .copied()
            .collect())
    }

    /// Apply every pending migration.
    ///
    /// # Returns
    ///
    /// The versions applied by this call; empty when already up to date.
    pub async fn migrate_to_latest(&self) -> Result<Vec<i64>> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            tracing::debug!("Lockdown schema is up to date");
        }

        for migration in &pending {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying lockdown migration"
            );
            self.ledger.apply(migration).await?;
        }

        Ok(pending.iter().map(|m| m.version).collect())
    }
}
