//! Records persisted by the attempt and lockout stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{UserId, subnet::SubnetPrefix};

/// One failed login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i64,
    /// `None` when the login name did not resolve to a user
    pub user_id: Option<UserId>,
    pub attempted_at: DateTime<Utc>,
    /// Full, normalized source address
    pub ip_address: String,
    pub subnet: SubnetPrefix,
}

/// A lockout imposed on a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub id: i64,
    /// The user whose failure crossed the threshold, `None` if unknown
    pub user_id: Option<UserId>,
    pub locked_at: DateTime<Utc>,
    pub release_at: DateTime<Utc>,
    pub ip_address: String,
    pub subnet: SubnetPrefix,
}

impl LockoutRecord {
    /// A lockout is active strictly before its release time.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.release_at > now
    }

    /// Whole minutes left until release, rounded down. Negative once released.
    pub fn minutes_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.release_at - now).num_seconds().div_euclid(60)
    }
}

/// An active lockout as shown on an administrative surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLockout {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub ip_address: String,
    pub release_at: DateTime<Utc>,
    pub minutes_remaining: i64,
}

impl ActiveLockout {
    pub fn from_record(record: LockoutRecord, now: DateTime<Utc>) -> Self {
        Self {
            minutes_remaining: record.minutes_remaining(now),
            id: record.id,
            user_id: record.user_id,
            ip_address: record.ip_address,
            release_at: record.release_at,
        }
    }
}

/// Number of records removed by a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    pub failures: u64,
    pub lockouts: u64,
}

impl PruneStats {
    pub fn total(&self) -> u64 {
        self.failures + self.lockouts
    }
}
