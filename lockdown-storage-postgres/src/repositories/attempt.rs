//! Postgres implementation of the attempt repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockdown_core::{
    Error, UserId,
    error::utilities::DatabaseResultExt,
    repositories::AttemptRepository,
    storage::FailureRecord,
    subnet::{NormalizedAddress, SubnetPrefix, normalize},
};
use sqlx::PgPool;

/// Postgres repository for failed login attempts.
pub struct PostgresAttemptRepository {
    pool: PgPool,
}

impl PostgresAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostgresFailureRecord {
    id: i64,
    user_id: i64,
    attempted_at: DateTime<Utc>,
    ip_address: String,
}

impl TryFrom<PostgresFailureRecord> for FailureRecord {
    type Error = Error;

    fn try_from(row: PostgresFailureRecord) -> Result<Self, Self::Error> {
        let address = normalize(&row.ip_address)?;

        Ok(FailureRecord {
            id: row.id,
            user_id: UserId::from_stored(row.user_id),
            attempted_at: row.attempted_at,
            ip_address: address.address,
            subnet: address.subnet,
        })
    }
}

#[async_trait]
impl AttemptRepository for PostgresAttemptRepository {
    async fn record_failure(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailureRecord, Error> {
        let row = sqlx::query_as::<_, PostgresFailureRecord>(
            r#"
            INSERT INTO login_fails (user_id, attempted_at, ip_address)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, attempted_at, ip_address
            "#,
        )
        .bind(UserId::to_stored(user_id))
        .bind(attempted_at)
        .bind(&address.address)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to record failed login attempt")?;

        row.try_into()
    }

    async fn count_failures(
        &self,
        subnet: &SubnetPrefix,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM login_fails
            WHERE ip_address LIKE $1 || '%' AND attempted_at > $2
            "#,
        )
        .bind(subnet.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to count failed login attempts")?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn prune_failures(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_fails WHERE attempted_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to prune failed login attempts")?;

        Ok(result.rows_affected())
    }
}
