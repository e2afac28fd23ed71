//! Postgres implementation of the lockout repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockdown_core::{
    Error, UserId,
    error::utilities::DatabaseResultExt,
    repositories::LockoutRepository,
    storage::LockoutRecord,
    subnet::{NormalizedAddress, SubnetPrefix, normalize},
};
use sqlx::PgPool;

/// Postgres repository for lockout records.
pub struct PostgresLockoutRepository {
    pool: PgPool,
}

impl PostgresLockoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostgresLockoutRecord {
    id: i64,
    user_id: i64,
    locked_at: DateTime<Utc>,
    release_at: DateTime<Utc>,
    ip_address: String,
}

impl TryFrom<PostgresLockoutRecord> for LockoutRecord {
    type Error = Error;

    fn try_from(row: PostgresLockoutRecord) -> Result<Self, Self::Error> {
        let address = normalize(&row.ip_address)?;

        Ok(LockoutRecord {
            id: row.id,
            user_id: UserId::from_stored(row.user_id),
            locked_at: row.locked_at,
            release_at: row.release_at,
            ip_address: address.address,
            subnet: address.subnet,
        })
    }
}

#[async_trait]
impl LockoutRepository for PostgresLockoutRepository {
    async fn impose_lockout(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        locked_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockoutRecord, Error> {
        let row = sqlx::query_as::<_, PostgresLockoutRecord>(
            r#"
            INSERT INTO lockdowns (user_id, locked_at, release_at, ip_address)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, locked_at, release_at, ip_address
            "#,
        )
        .bind(UserId::to_stored(user_id))
        .bind(locked_at)
        .bind(release_at)
        .bind(&address.address)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to impose lockout")?;

        row.try_into()
    }

    async fn find_active_lockout(
        &self,
        subnet: &SubnetPrefix,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutRecord>, Error> {
        let row = sqlx::query_as::<_, PostgresLockoutRecord>(
            r#"
            SELECT id, user_id, locked_at, release_at, ip_address
            FROM lockdowns
            WHERE ip_address LIKE $2 || '%' AND release_at > $1
            LIMIT 1
            "#,
        )
        .bind(now)
        .bind(subnet.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to query active lockout")?;

        row.map(LockoutRecord::try_from).transpose()
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<LockoutRecord>, Error> {
        let rows = sqlx::query_as::<_, PostgresLockoutRecord>(
            r#"
            SELECT id, user_id, locked_at, release_at, ip_address
            FROM lockdowns
            WHERE release_at > $1
            ORDER BY release_at, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list active lockouts")?;

        rows.into_iter().map(LockoutRecord::try_from).collect()
    }

    async fn prune_lockouts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM lockdowns WHERE release_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to prune lockouts")?;

        Ok(result.rows_affected())
    }
}
