//! Postgres schema for the lockdown tables.
//!
//! The `ip_address` indexes use `text_pattern_ops` so that the
//! `ip_address LIKE prefix || '%'` subnet lookups become index range scans
//! under any database collation.

use async_trait::async_trait;
use lockdown_migration::{MIGRATION_TABLE, Migration, MigrationError, MigrationLedger, Migrator};
use sqlx::PgPool;

/// Every lockdown migration for Postgres, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_login_fails",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS login_fails (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL DEFAULT -1,
                attempted_at TIMESTAMPTZ NOT NULL,
                ip_address TEXT NOT NULL
            )"#],
    },
    Migration {
        version: 2,
        name: "create_lockdowns",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS lockdowns (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL DEFAULT -1,
                locked_at TIMESTAMPTZ NOT NULL,
                release_at TIMESTAMPTZ NOT NULL,
                ip_address TEXT NOT NULL
            )"#],
    },
    Migration {
        version: 3,
        name: "index_subnet_lookups",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_login_fails_ip_attempted ON login_fails(ip_address text_pattern_ops, attempted_at)",
            "CREATE INDEX IF NOT EXISTS idx_lockdowns_ip_release ON lockdowns(ip_address text_pattern_ops, release_at)",
            "CREATE INDEX IF NOT EXISTS idx_lockdowns_release ON lockdowns(release_at)",
        ],
    },
];

/// Migration bookkeeping stored in the Postgres database itself.
pub struct PostgresMigrationLedger {
    pool: PgPool,
}

impl PostgresMigrationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationLedger for PostgresMigrationLedger {
    async fn ensure_table(&self) -> Result<(), MigrationError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
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

        let sql = format!("INSERT INTO {MIGRATION_TABLE} (version, name) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// A migrator over [`MIGRATIONS`] for `pool`.
pub fn migrator(pool: PgPool) -> Result<Migrator<PostgresMigrationLedger>, MigrationError> {
    Migrator::new(PostgresMigrationLedger::new(pool), MIGRATIONS)
}
