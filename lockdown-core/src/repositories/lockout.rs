//! Repository trait for subnet lockouts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    storage::LockoutRecord,
    subnet::{NormalizedAddress, SubnetPrefix},
};

/// Storage for lockout records.
///
/// Records are never updated. A subnet is locked while any of its records has
/// a release time in the future, so duplicate lockouts written by racing
/// requests are harmless.
#[async_trait]
pub trait LockoutRepository: Send + Sync + 'static {
    /// Append a lockout for the subnet of `address`.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The user whose failure crossed the threshold, if known
    /// * `address` - The normalized source address of that failure
    /// * `locked_at` - When the lockout starts
    /// * `release_at` - When the lockout stops applying
    async fn impose_lockout(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        locked_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockoutRecord, Error>;

    /// Find any lockout for the subnet that is still active at `now`.
    ///
    /// When several match, any one of them may be returned.
    async fn find_active_lockout(
        &self,
        subnet: &SubnetPrefix,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutRecord>, Error>;

    /// All lockouts still active at `now`, across every subnet.
    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<LockoutRecord>, Error>;

    /// Delete lockouts released before `before`.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn prune_lockouts(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
