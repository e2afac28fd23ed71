//! SQLite implementation of the lockout repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockdown_core::{
    Error, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::LockoutRepository,
    storage::LockoutRecord,
    subnet::{NormalizedAddress, SubnetPrefix, normalize},
};
use sqlx::SqlitePool;

/// SQLite repository for lockout records.
pub struct SqliteLockoutRepository {
    pool: SqlitePool,
}

impl SqliteLockoutRepository {
    /// Create a new SQLite lockout repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLockoutRecord {
    id: i64,
    user_id: i64,
    locked_at: i64,
    release_at: i64,
    ip_address: String,
}

fn timestamp(column: &str, value: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| StorageError::Database(format!("Invalid {column} timestamp {value}")).into())
}

impl TryFrom<SqliteLockoutRecord> for LockoutRecord {
    type Error = Error;

    fn try_from(row: SqliteLockoutRecord) -> Result<Self, Self::Error> {
        let address = normalize(&row.ip_address)?;

        Ok(LockoutRecord {
            id: row.id,
            user_id: UserId::from_stored(row.user_id),
            locked_at: timestamp("locked_at", row.locked_at)?,
            release_at: timestamp("release_at", row.release_at)?,
            ip_address: address.address,
            subnet: address.subnet,
        })
    }
}

#[async_trait]
impl LockoutRepository for SqliteLockoutRepository {
    async fn impose_lockout(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        locked_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockoutRecord, Error> {
        let row = sqlx::query_as::<_, SqliteLockoutRecord>(
            r#"
            INSERT INTO lockdowns (user_id, locked_at, release_at, ip_address)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, locked_at, release_at, ip_address
            "#,
        )
        .bind(UserId::to_stored(user_id))
        .bind(locked_at.timestamp_millis())
        .bind(release_at.timestamp_millis())
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
        let row = sqlx::query_as::<_, SqliteLockoutRecord>(
            r#"
            SELECT id, user_id, locked_at, release_at, ip_address
            FROM lockdowns
            WHERE ip_address >= ? AND ip_address < ? AND release_at > ?
            LIMIT 1
            "#,
        )
        .bind(subnet.as_str())
        .bind(subnet.upper_bound())
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to query active lockout")?;

        row.map(LockoutRecord::try_from).transpose()
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<LockoutRecord>, Error> {
        let rows = sqlx::query_as::<_, SqliteLockoutRecord>(
            r#"
            SELECT id, user_id, locked_at, release_at, ip_address
            FROM lockdowns
            WHERE release_at > ?
            ORDER BY release_at, id
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to list active lockouts")?;

        rows.into_iter().map(LockoutRecord::try_from).collect()
    }

    async fn prune_lockouts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM lockdowns WHERE release_at < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to prune lockouts")?;

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
    async fn test_impose_lockout() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        let address = normalize("203.0.113.5").unwrap();

        let record = repo
            .impose_lockout(Some(UserId::new(2)), &address, at(0), at(60))
            .await
            .expect("Failed to impose lockout");

        assert!(record.id > 0);
        assert_eq!(record.user_id, Some(UserId::new(2)));
        assert_eq!(record.locked_at, at(0));
        assert_eq!(record.release_at, at(60));
        assert_eq!(record.subnet.as_str(), "203.0.113.");
    }

    #[tokio::test]
    async fn test_find_active_lockout_matches_subnet() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        let address = normalize("203.0.113.5").unwrap();
        repo.impose_lockout(None, &address, at(0), at(60))
            .await
            .unwrap();

        let same_subnet = normalize("203.0.113.9").unwrap().subnet;
        let other_subnet = normalize("203.0.114.5").unwrap().subnet;

        let found = repo
            .find_active_lockout(&same_subnet, at(1))
            .await
            .unwrap()
            .expect("lockout should match");
        assert_eq!(found.user_id, None);
        assert_eq!(found.ip_address, "203.0.113.5");

        assert!(
            repo.find_active_lockout(&other_subnet, at(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_find_active_lockout_expires_at_release() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        let address = normalize("2001:db8:1::1").unwrap();
        repo.impose_lockout(None, &address, at(0), at(60))
            .await
            .unwrap();

        assert!(
            repo.find_active_lockout(&address.subnet, at(59))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.find_active_lockout(&address.subnet, at(60))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_release_at_keeps_milliseconds() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);
        let address = normalize("203.0.113.5").unwrap();
        let locked_at = at(0) + Duration::milliseconds(700);
        let release_at = at(60) + Duration::milliseconds(700);

        let record = repo
            .impose_lockout(None, &address, locked_at, release_at)
            .await
            .unwrap();
        assert_eq!(record.locked_at, locked_at);
        assert_eq!(record.release_at, release_at);

        let still_locked = release_at - Duration::milliseconds(200);
        assert!(
            repo.find_active_lockout(&address.subnet, still_locked)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.find_active_lockout(&address.subnet, release_at)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_list_active_lockouts() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);

        repo.impose_lockout(None, &normalize("10.0.0.1").unwrap(), at(-120), at(-60))
            .await
            .unwrap();
        repo.impose_lockout(None, &normalize("10.0.1.1").unwrap(), at(0), at(30))
            .await
            .unwrap();
        repo.impose_lockout(None, &normalize("10.0.2.1").unwrap(), at(0), at(10))
            .await
            .unwrap();

        let active = repo.list_active_lockouts(at(0)).await.unwrap();
        let addresses: Vec<&str> = active.iter().map(|l| l.ip_address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.2.1", "10.0.1.1"]);
    }

    #[tokio::test]
    async fn test_prune_lockouts_keeps_active() {
        let repo = SqliteLockoutRepository::new(setup_test_db().await);

        repo.impose_lockout(None, &normalize("10.0.0.1").unwrap(), at(-120), at(-60))
            .await
            .unwrap();
        repo.impose_lockout(None, &normalize("10.0.1.1").unwrap(), at(0), at(30))
            .await
            .unwrap();

        assert_eq!(repo.prune_lockouts(at(0)).await.unwrap(), 1);
        assert_eq!(repo.list_active_lockouts(at(0)).await.unwrap().len(), 1);
    }
}
