//! SQLite implementation of the attempt repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockdown_core::{
    Error, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::AttemptRepository,
    storage::FailureRecord,
    subnet::{NormalizedAddress, SubnetPrefix, normalize},
};
use sqlx::SqlitePool;

/// SQLite repository for failed login attempts.
pub struct SqliteAttemptRepository {
    pool: SqlitePool,
}

impl SqliteAttemptRepository {
    /// Create a new SQLite attempt repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteFailureRecord {
    id: i64,
    user_id: i64,
    attempted_at: i64,
    ip_address: String,
}

impl TryFrom<SqliteFailureRecord> for FailureRecord {
    type Error = Error;

    fn try_from(row: SqliteFailureRecord) -> Result<Self, Self::Error> {
        let attempted_at = DateTime::from_timestamp_millis(row.attempted_at).ok_or_else(|| {
            StorageError::Database(format!("Invalid attempted_at timestamp {}", row.attempted_at))
        })?;
        let address = normalize(&row.ip_address)?;

        Ok(FailureRecord {
            id: row.id,
            user_id: UserId::from_stored(row.user_id),
            attempted_at,
            ip_address: address.address,
            subnet: address.subnet,
        })
    }
}

#[async_trait]
impl AttemptRepository for SqliteAttemptRepository {
    async fn record_failure(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailureRecord, Error> {
        let row = sqlx::query_as::<_, SqliteFailureRecord>(
            r#"
            INSERT INTO login_fails (user_id, attempted_at, ip_address)
            VALUES (?, ?, ?)
            RETURNING id, user_id, attempted_at, ip_address
            "#,
        )
        .bind(UserId::to_stored(user_id))
        .bind(attempted_at.timestamp_millis())
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
            WHERE ip_address >= ? AND ip_address < ? AND attempted_at > ?
            "#,
        )
        .bind(subnet.as_str())
        .bind(subnet.upper_bound())
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to count failed login attempts")?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn prune_failures(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_fails WHERE attempted_at < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to prune failed login attempts")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::migrator;
    use chrono::Duration;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        migrator(pool.clone())
            .unwrap()
            .migrate_to_latest()
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn at(offset_minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap() + Duration::minutes(offset_minutes)
    }

    #[tokio::test]
    async fn test_record_failure() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);
        let address = normalize("192.168.1.1").unwrap();

        let record = repo
            .record_failure(Some(UserId::new(5)), &address, at(0))
            .await
            .expect("Failed to record attempt");

        assert!(record.id > 0);
        assert_eq!(record.user_id, Some(UserId::new(5)));
        assert_eq!(record.ip_address, "192.168.1.1");
        assert_eq!(record.subnet.as_str(), "192.168.1.");
        assert_eq!(record.attempted_at, at(0));
    }

    #[tokio::test]
    async fn test_unknown_user_stored_as_sentinel() {
        let pool = setup_test_db().await;
        let repo = SqliteAttemptRepository::new(pool.clone());

        let record = repo
            .record_failure(None, &normalize("192.168.1.1").unwrap(), at(0))
            .await
            .unwrap();
        assert_eq!(record.user_id, None);

        let stored: i64 = sqlx::query_scalar("SELECT user_id FROM login_fails WHERE id = ?")
            .bind(record.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, -1);
    }

    #[tokio::test]
    async fn test_negative_user_id_survives_storage() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);

        let record = repo
            .record_failure(Some(UserId::new(-5)), &normalize("192.168.1.1").unwrap(), at(0))
            .await
            .unwrap();
        assert_eq!(record.user_id, Some(UserId::new(-5)));
    }

    #[tokio::test]
    async fn test_count_failures_by_subnet_prefix() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);

        for raw in ["10.0.0.1", "10.0.0.2", "10.0.0.200"] {
            repo.record_failure(None, &normalize(raw).unwrap(), at(0))
                .await
                .unwrap();
        }
        for raw in ["10.0.1.1", "10.0.10.1", "110.0.0.1"] {
            repo.record_failure(None, &normalize(raw).unwrap(), at(0))
                .await
                .unwrap();
        }

        let subnet = normalize("10.0.0.99").unwrap().subnet;
        assert_eq!(repo.count_failures(&subnet, at(-5)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_count_failures_ipv6() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);

        repo.record_failure(None, &normalize("2001:db8::1").unwrap(), at(0))
            .await
            .unwrap();
        repo.record_failure(None, &normalize("2001:db8::ff:1").unwrap(), at(0))
            .await
            .unwrap();
        repo.record_failure(None, &normalize("2001:db8:0:1::1").unwrap(), at(0))
            .await
            .unwrap();

        let subnet = normalize("2001:db8::").unwrap().subnet;
        assert_eq!(repo.count_failures(&subnet, at(-5)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_failures_respects_since() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);
        let address = normalize("172.16.5.4").unwrap();

        repo.record_failure(None, &address, at(0)).await.unwrap();
        repo.record_failure(None, &address, at(3)).await.unwrap();

        assert_eq!(repo.count_failures(&address.subnet, at(-1)).await.unwrap(), 2);
        assert_eq!(repo.count_failures(&address.subnet, at(1)).await.unwrap(), 1);
        assert_eq!(repo.count_failures(&address.subnet, at(4)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_failures_excludes_window_start() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);
        let address = normalize("172.16.5.4").unwrap();

        repo.record_failure(None, &address, at(0)).await.unwrap();
        repo.record_failure(None, &address, at(0) + Duration::milliseconds(1))
            .await
            .unwrap();

        assert_eq!(repo.count_failures(&address.subnet, at(0)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_attempted_at_keeps_milliseconds() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);
        let attempted_at = at(0) + Duration::milliseconds(700);

        let record = repo
            .record_failure(None, &normalize("172.16.5.4").unwrap(), attempted_at)
            .await
            .unwrap();
        assert_eq!(record.attempted_at, attempted_at);
    }

    #[tokio::test]
    async fn test_subnet_match_uses_ip_address_index() {
        let pool = setup_test_db().await;
        let subnet = normalize("10.0.0.1").unwrap().subnet;

        let plan: Vec<(i64, i64, i64, String)> = sqlx::query_as(
            "EXPLAIN QUERY PLAN SELECT COUNT(*) FROM login_fails \
             WHERE ip_address >= ? AND ip_address < ? AND attempted_at > ?",
        )
        .bind(subnet.as_str())
        .bind(subnet.upper_bound())
        .bind(0_i64)
        .fetch_all(&pool)
        .await
        .unwrap();

        assert!(
            plan.iter().any(|(_, _, _, detail)| detail.starts_with("SEARCH")),
            "expected an index search, got {plan:?}"
        );
    }

    #[tokio::test]
    async fn test_prune_failures() {
        let repo = SqliteAttemptRepository::new(setup_test_db().await);
        let address = normalize("172.16.5.4").unwrap();

        repo.record_failure(None, &address, at(-60)).await.unwrap();
        repo.record_failure(None, &address, at(0)).await.unwrap();

        assert_eq!(repo.prune_failures(at(-30)).await.unwrap(), 1);
        assert_eq!(repo.count_failures(&address.subnet, at(-120)).await.unwrap(), 1);
    }
}
