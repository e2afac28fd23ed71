use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    repositories::{AttemptRepository, LockoutRepository, RepositoryProvider},
    storage::{FailureRecord, LockoutRecord},
    subnet::{NormalizedAddress, SubnetPrefix},
};

/// Adapter that wraps a RepositoryProvider and implements [`AttemptRepository`]
pub struct AttemptRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AttemptRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AttemptRepository for AttemptRepositoryAdapter<R> {
    async fn record_failure(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailureRecord, Error> {
        self.provider
            .attempts()
            .record_failure(user_id, address, attempted_at)
            .await
    }

    async fn count_failures(
        &self,
        subnet: &SubnetPrefix,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        self.provider.attempts().count_failures(subnet, since).await
    }

    async fn prune_failures(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.attempts().prune_failures(before).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements [`LockoutRepository`]
pub struct LockoutRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LockoutRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LockoutRepository for LockoutRepositoryAdapter<R> {
    async fn impose_lockout(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        locked_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockoutRecord, Error> {
        self.provider
            .lockouts()
            .impose_lockout(user_id, address, locked_at, release_at)
            .await
    }

    async fn find_active_lockout(
        &self,
        subnet: &SubnetPrefix,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutRecord>, Error> {
        self.provider
            .lockouts()
            .find_active_lockout(subnet, now)
            .await
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<LockoutRecord>, Error> {
        self.provider.lockouts().list_active_lockouts(now).await
    }

    async fn prune_lockouts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.lockouts().prune_lockouts(before).await
    }
}
