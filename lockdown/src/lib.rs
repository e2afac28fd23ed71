//! # Lockdown
//!
//! Lockdown throttles logins per source subnet. Every failed login is recorded
//! against the `/24` (IPv4) or `/64` (IPv6) it came from, and once a subnet
//! collects too many failures inside the retry window the whole subnet is
//! refused until the lockout expires.
//!
//! The host application stays in charge of authentication. It asks
//! [`Lockdown::is_locked`] before checking credentials and reports failures
//! with [`Lockdown::record_failure`].
//!
//! ## Storage Support
//!
//! - SQLite (`sqlite` feature, enabled by default)
//! - Postgres (`postgres` feature)
//! - In memory, for tests and single-process tools
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lockdown::{LockdownBuilder, MemoryUserDirectory, PolicyConfig, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users: MemoryUserDirectory = [("admin", UserId::new(1))].into_iter().collect();
//!
//!     let lockdown = LockdownBuilder::new()
//!         .with_sqlite("sqlite://lockdown.db")
//!         .await?
//!         .with_policy(PolicyConfig::default())
//!         .with_user_directory(Arc::new(users))
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     if lockdown.is_locked("203.0.113.5").await? {
//!         println!("{}", lockdown.rejection_message(lockdown::Rejection::Locked));
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;

use std::sync::Arc;

use chrono::Duration;
use lockdown_core::{
    RepositoryProvider,
    repositories::{AttemptRepositoryAdapter, LockoutRepositoryAdapter},
};

pub use builder::{LockdownBuilder, LockdownBuilderError, NoStorage, WithStorage};

/// Re-export core types from lockdown_core
pub use lockdown_core::{
    ActiveLockout, AddressFamily, Clock, FailureOutcome, LockoutRecord, LockoutService,
    ManualClock, MemoryUserDirectory, NormalizedAddress, PolicyConfig, PolicyProvider, PruneStats,
    Rejection, SharedPolicy, SubnetPrefix, SystemClock, UserDirectory, UserId, normalize,
    repositories::MemoryRepositoryProvider,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use lockdown_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};

#[cfg(feature = "postgres")]
pub use lockdown_storage_postgres::{PostgresRepositoryProvider, PostgresStorage};

/// Errors returned by the [`Lockdown`] facade.
#[derive(Debug, thiserror::Error)]
pub enum LockdownError {
    /// The source address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// The policy or builder configuration is not usable
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<lockdown_core::Error> for LockdownError {
    fn from(error: lockdown_core::Error) -> Self {
        use lockdown_core::Error;

        match error {
            Error::Address(e) => LockdownError::InvalidAddress(e.to_string()),
            Error::Storage(e) => LockdownError::StorageError(e.to_string()),
            Error::Config(e) => LockdownError::ConfigError(e.to_string()),
        }
    }
}

type Service<R> = LockoutService<AttemptRepositoryAdapter<R>, LockoutRepositoryAdapter<R>>;

/// Login throttling bound to one storage backend.
///
/// Cloning is cheap; clones share the storage and policy.
pub struct Lockdown<R: RepositoryProvider> {
    repositories: Arc<R>,
    service: Service<R>,
}

impl<R: RepositoryProvider> Clone for Lockdown<R> {
    fn clone(&self) -> Self {
        Self {
            repositories: Arc::clone(&self.repositories),
            service: self.service.clone(),
        }
    }
}

impl<R: RepositoryProvider> Lockdown<R> {
    /// Create a Lockdown instance with the default policy and system clock.
    ///
    /// Use [`LockdownBuilder`] to configure the policy or clock.
    pub fn new(repositories: Arc<R>, users: Arc<dyn UserDirectory>) -> Self {
        Self::from_parts(
            repositories,
            users,
            Arc::new(PolicyConfig::default()),
            Arc::new(SystemClock),
        )
    }

    pub(crate) fn from_parts(
        repositories: Arc<R>,
        users: Arc<dyn UserDirectory>,
        policy: Arc<dyn PolicyProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let attempts = Arc::new(AttemptRepositoryAdapter::new(repositories.clone()));
        let lockouts = Arc::new(LockoutRepositoryAdapter::new(repositories.clone()));
        let service = LockoutService::new(attempts, lockouts, users, policy).with_clock(clock);

        Self {
            repositories,
            service,
        }
    }

    /// The underlying lockout service.
    pub fn service(&self) -> &Service<R> {
        &self.service
    }

    /// The storage provider.
    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    /// The policy currently in effect.
    pub fn policy(&self) -> PolicyConfig {
        self.service.policy()
    }

    /// Run migrations for the lockdown tables
    pub async fn migrate(&self) -> Result<(), LockdownError> {
        self.repositories.migrate().await.map_err(Into::into)
    }

    /// Health check for the storage backend
    pub async fn health_check(&self) -> Result<(), LockdownError> {
        self.repositories.health_check().await.map_err(Into::into)
    }

    /// Check whether the subnet of `address` is locked out.
    ///
    /// Call this before authenticating. An unparseable address returns
    /// [`LockdownError::InvalidAddress`]; the caller decides whether that
    /// allows the attempt.
    pub async fn is_locked(&self, address: &str) -> Result<bool, LockdownError> {
        Ok(self.service.is_locked(address).await?)
    }

    /// The active lockout covering `address`, if any.
    pub async fn active_lockout(
        &self,
        address: &str,
    ) -> Result<Option<LockoutRecord>, LockdownError> {
        Ok(self.service.active_lockout(address).await?)
    }

    /// Report a failed login for `username` from `address`.
    ///
    /// # Returns
    ///
    /// Whether the failure was ignored, recorded, or locked the subnet.
    pub async fn record_failure(
        &self,
        username: &str,
        address: &str,
    ) -> Result<FailureOutcome, LockdownError> {
        Ok(self.service.record_failure(username, address).await?)
    }

    /// Every lockout that has not been released yet.
    pub async fn list_active_lockouts(&self) -> Result<Vec<ActiveLockout>, LockdownError> {
        Ok(self.service.list_active_lockouts().await?)
    }

    /// The message to show for a rejected login.
    pub fn rejection_message(&self, rejection: Rejection) -> &'static str {
        self.service.rejection_message(rejection)
    }

    /// Delete records older than `retention` that no longer affect decisions.
    pub async fn prune(&self, retention: Duration) -> Result<PruneStats, LockdownError> {
        Ok(self.service.prune(retention).await?)
    }

    /// Prune old records every `interval` until `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        retention: Duration,
        interval: std::time::Duration,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.service
            .start_cleanup_task(retention, interval, shutdown)
    }
}
