//! Repository trait for failed login attempts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    storage::FailureRecord,
    subnet::{NormalizedAddress, SubnetPrefix},
};

/// Append-only log of failed login attempts.
///
/// Counting always filters by time, so records older than the retry window
/// are irrelevant whether or not they have been pruned.
#[async_trait]
pub trait AttemptRepository: Send + Sync + 'static {
    /// Append a failed attempt.
    ///
    /// Never deduplicates. `user_id` is `None` for a login name that did not
    /// resolve; whether such attempts are recorded at all is decided by the
    /// caller.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The resolved user, if any
    /// * `address` - The normalized source address
    /// * `attempted_at` - When the attempt happened
    async fn record_failure(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailureRecord, Error>;

    /// Count attempts from a subnet made strictly after `since`.
    ///
    /// An attempt exactly as old as the retry window no longer counts.
    ///
    /// An attempt belongs to the subnet when its stored address starts with
    /// the subnet prefix.
    async fn count_failures(&self, subnet: &SubnetPrefix, since: DateTime<Utc>)
    -> Result<u32, Error>;

    /// Delete attempts made before `before`.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn prune_failures(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
