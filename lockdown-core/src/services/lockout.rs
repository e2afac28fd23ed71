//! Subnet lockout service.
//!
//! This module implements the failure-tracking and lockout decision engine.
//! Failed logins are recorded per source address and counted per subnet
//! (`/24` for IPv4, `/64` for IPv6). Once a subnet reaches the configured number
//! of failures inside the retry window, a lockout record is written and every
//! address in that subnet is refused until the lockout's release time.
//!
//! # Features
//!
//! - Subnet grouping through a single normalizer
//! - Lazy expiry: "locked" is recomputed from stored release times on every
//!   query, there is no unlock job
//! - Optional tracking of logins for usernames that do not exist
//! - Administrative listing of active lockouts
//! - Background cleanup of old records
//!
//! # Example
//!
//! ```rust,ignore
//! use lockdown_core::services::{FailureOutcome, LockoutService};
//!
//! let service = LockoutService::new(attempts, lockouts, users, Arc::new(PolicyConfig::default()));
//!
//! // Before authenticating
//! if service.is_locked("203.0.113.5").await? {
//!     // Reject with a generic message
//! }
//!
//! // After a failed authentication
//! let outcome = service.record_failure("admin", "203.0.113.5").await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::{
    Error,
    clock::{Clock, SystemClock},
    policy::{PolicyConfig, PolicyProvider, Rejection},
    repositories::{AttemptRepository, LockoutRepository},
    storage::{ActiveLockout, LockoutRecord, PruneStats},
    subnet::normalize,
    user::UserDirectory,
};

/// What happened to a reported login failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The username did not resolve and unknown usernames are not tracked
    Ignored,
    /// The failure was recorded and the subnet is still below the threshold
    Recorded { failures: u32 },
    /// The failure was recorded and a lockout was imposed on the subnet
    Locked {
        failures: u32,
        release_at: DateTime<Utc>,
    },
}

impl FailureOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, FailureOutcome::Locked { .. })
    }
}

/// Service deciding when a subnet is locked out.
///
/// # Thread Safety
///
/// The service is cheap to clone and can be shared across tasks. Concurrent
/// failures from one subnet may each impose a lockout; that only produces
/// overlapping records, never a wrong decision.
pub struct LockoutService<A: AttemptRepository, L: LockoutRepository> {
    attempts: Arc<A>,
    lockouts: Arc<L>,
    users: Arc<dyn UserDirectory>,
    policy: Arc<dyn PolicyProvider>,
    clock: Arc<dyn Clock>,
}

impl<A: AttemptRepository, L: LockoutRepository> Clone for LockoutService<A, L> {
    fn clone(&self) -> Self {
        Self {
            attempts: Arc::clone(&self.attempts),
            lockouts: Arc::clone(&self.lockouts),
            users: Arc::clone(&self.users),
            policy: Arc::clone(&self.policy),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<A: AttemptRepository, L: LockoutRepository> LockoutService<A, L> {
    /// Create a new LockoutService using the system clock.
    ///
    /// # Arguments
    ///
    /// * `attempts` - Store for failed attempts
    /// * `lockouts` - Store for lockout records
    /// * `users` - Directory used to resolve login names
    /// * `policy` - Source of the lockout policy, read once per operation
    pub fn new(
        attempts: Arc<A>,
        lockouts: Arc<L>,
        users: Arc<dyn UserDirectory>,
        policy: Arc<dyn PolicyProvider>,
    ) -> Self {
        Self {
            attempts,
            lockouts,
            users,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time at millisecond resolution, the finest every store keeps.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    /// The policy currently in effect.
    pub fn policy(&self) -> PolicyConfig {
        self.policy.policy()
    }

    /// Check whether the subnet of `address` is currently locked.
    ///
    /// # Errors
    ///
    /// Returns an address error if `address` is not an IP address. The caller
    /// decides whether that allows or refuses the login.
    pub async fn is_locked(&self, address: &str) -> Result<bool, Error> {
        Ok(self.active_lockout(address).await?.is_some())
    }

    /// Find an active lockout covering `address`, if any.
    ///
    /// The record's `user_id` identifies who triggered it; `None` means the
    /// lockout was caused by an unknown username.
    pub async fn active_lockout(&self, address: &str) -> Result<Option<LockoutRecord>, Error> {
        let normalized = normalize(address)?;
        let now = self.now();
        self.lockouts
            .find_active_lockout(&normalized.subnet, now)
            .await
    }

    /// Record a failed login and lock the subnet if it crossed the threshold.
    ///
    /// The lockout is imposed on the failure that reaches the limit. Every
    /// further failure while locked imposes another lockout, which extends the
    /// effective lock to the latest release time.
    ///
    /// # Arguments
    ///
    /// * `username` - The login name that was attempted (may or may not exist)
    /// * `address` - The raw source address of the request
    pub async fn record_failure(
        &self,
        username: &str,
        address: &str,
    ) -> Result<FailureOutcome, Error> {
        let policy = self.policy.policy();

        let user_id = self.users.resolve_user(username).await?;
        if user_id.is_none() && !policy.lockout_invalid_usernames {
            tracing::debug!("Ignoring failed login for unknown username");
            return Ok(FailureOutcome::Ignored);
        }

        let normalized = normalize(address)?;
        let now = self.now();

        self.attempts
            .record_failure(user_id, &normalized, now)
            .await?;

        let failures = self
            .attempts
            .count_failures(
                &normalized.subnet,
                now.checked_sub_signed(policy.retries_within)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
            .await?;

        tracing::debug!(
            subnet = %normalized.subnet,
            failures = failures,
            max_login_retries = policy.max_login_retries,
            "Recorded failed login"
        );

        if failures < policy.max_login_retries {
            return Ok(FailureOutcome::Recorded { failures });
        }

        let release_at = now
            .checked_add_signed(policy.lockout_length)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.lockouts
            .impose_lockout(user_id, &normalized, now, release_at)
            .await?;

        tracing::info!(
            subnet = %normalized.subnet,
            failures = failures,
            release_at = %release_at,
            "Subnet locked out after repeated failed logins"
        );

        Ok(FailureOutcome::Locked {
            failures,
            release_at,
        })
    }

    /// List every active lockout with the whole minutes left until release.
    pub async fn list_active_lockouts(&self) -> Result<Vec<ActiveLockout>, Error> {
        let now = self.now();
        let records = self.lockouts.list_active_lockouts(now).await?;
        Ok(records
            .into_iter()
            .map(|record| ActiveLockout::from_record(record, now))
            .collect())
    }

    /// The user-facing message for a rejected login under the current policy.
    pub fn rejection_message(&self, rejection: Rejection) -> &'static str {
        self.policy.policy().rejection_message(rejection)
    }

    /// Delete records that can no longer affect any decision.
    ///
    /// Failures are kept for at least the retry window and lockouts until
    /// `retention` after their release, so pruning never unlocks anything.
    pub async fn prune(&self, retention: Duration) -> Result<PruneStats, Error> {
        let retention = retention.max(Duration::zero());
        let policy = self.policy.policy();
        let now = self.now();

        let cutoff = |keep: Duration| {
            now.checked_sub_signed(keep)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };

        let failures = self
            .attempts
            .prune_failures(cutoff(retention.max(policy.retries_within)))
            .await?;
        let lockouts = self.lockouts.prune_lockouts(cutoff(retention)).await?;

        Ok(PruneStats { failures, lockouts })
    }

    /// Start the background cleanup task.
    ///
    /// This spawns a task that calls [`prune`](Self::prune) every `interval`
    /// until `shutdown` changes. Failed runs are logged and retried on the
    /// next tick.
    ///
    /// # Returns
    ///
    /// A `JoinHandle` for the spawned task.
    pub fn start_cleanup_task(
        &self,
        retention: Duration,
        interval: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match service.prune(retention).await {
                            Ok(stats) if stats.total() > 0 => {
                                tracing::info!(
                                    failures = stats.failures,
                                    lockouts = stats.lockouts,
                                    "Cleaned up old lockdown records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Failed to cleanup lockdown records"
                                );
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down lockdown cleanup task");
                        break;
                    }
                }
            }
        })
    }
}
