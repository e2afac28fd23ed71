//! SQLite schema for the lockdown tables.
//!
//! Timestamps are stored as unix milliseconds in INTEGER columns.

use async_trait::async_trait;
use chrono::Utc;
use lockdown_migration::{MIGRATION_TABLE, Migration, MigrationError, MigrationLedger, Migrator};
use sqlx::SqlitePool;

/// Every lockdown migration for SQLite, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_login_fails",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS login_fails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL DEFAULT -1,
                attempted_at INTEGER NOT NULL,
                ip_address TEXT NOT NULL
            )"#],
    },
    Migration {
        version: 2,
        name: "create_lockdowns",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS lockdowns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL DEFAULT -1,
                locked_at INTEGER NOT NULL,
                release_at INTEGER NOT NULL,
                ip_address TEXT NOT NULL
            )"#],
    },
    Migration {
        version: 3,
        name: "index_subnet_lookups",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_login_fails_ip_attempted ON login_fails(ip_address, attempted_at)",
            "CREATE INDEX IF NOT EXISTS idx_lockdowns_ip_release ON lockdowns(ip_address, release_at)",
            "CREATE INDEX IF NOT EXISTS idx_lockdowns_release ON lockdowns(release_at)",
        ],
    },
];

/// Migration bookkeeping stored in the SQLite database itself.
pub struct SqliteMigrationLedger {
    pool: SqlitePool,
}

impl SqliteMigrationLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationLedger for SqliteMigrationLedger {
    async fn ensure_table(&self) -> Result<(), MigrationError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, MigrationError> {
        let sql = format!("SELECT version FROM {MIGRATION_TABLE} ORDER BY version");
        let versions: Vec<i64> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(versions)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        let sql = format!("INSERT INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES (?, ?, ?)");
        sqlx::query(&sql)
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// A migrator over [`MIGRATIONS`] for `pool`.
pub fn migrator(pool: SqlitePool) -> Result<Migrator<SqliteMigrationLedger>, MigrationError> {
    Migrator::new(SqliteMigrationLedger::new(pool), MIGRATIONS)
}
