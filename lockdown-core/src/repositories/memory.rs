//! In-memory storage backend.
//!
//! Suitable for tests and single-process deployments where lockouts do not
//! need to survive a restart.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Error, UserId,
    repositories::{
        AttemptRepository, AttemptRepositoryProvider, LockoutRepository,
        LockoutRepositoryProvider, RepositoryProvider,
    },
    storage::{FailureRecord, LockoutRecord},
    subnet::{NormalizedAddress, SubnetPrefix},
};

/// Both lockdown tables held in process memory.
#[derive(Debug)]
pub struct MemoryRepository {
    failures: RwLock<Vec<FailureRecord>>,
    lockouts: RwLock<Vec<LockoutRecord>>,
    next_failure_id: AtomicI64,
    next_lockout_id: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            failures: RwLock::new(Vec::new()),
            lockouts: RwLock::new(Vec::new()),
            next_failure_id: AtomicI64::new(1),
            next_lockout_id: AtomicI64::new(1),
        }
    }

    /// Snapshot of every stored failure, including expired ones.
    pub async fn failures(&self) -> Vec<FailureRecord> {
        self.failures.read().await.clone()
    }

    /// Snapshot of every stored lockout, including released ones.
    pub async fn lockouts(&self) -> Vec<LockoutRecord> {
        self.lockouts.read().await.clone()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptRepository for MemoryRepository {
    async fn record_failure(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        attempted_at: DateTime<Utc>,
    ) -> Result<FailureRecord, Error> {
        let record = FailureRecord {
            id: self.next_failure_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            attempted_at,
            ip_address: address.address.clone(),
            subnet: address.subnet.clone(),
        };
        self.failures.write().await.push(record.clone());
        Ok(record)
    }

    async fn count_failures(
        &self,
        subnet: &SubnetPrefix,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let failures = self.failures.read().await;
        let count = failures
            .iter()
            .filter(|f| f.attempted_at > since && subnet.matches(&f.ip_address))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn prune_failures(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut failures = self.failures.write().await;
        let before_len = failures.len();
        failures.retain(|f| f.attempted_at >= before);
        Ok((before_len - failures.len()) as u64)
    }
}

#[async_trait]
impl LockoutRepository for MemoryRepository {
    async fn impose_lockout(
        &self,
        user_id: Option<UserId>,
        address: &NormalizedAddress,
        locked_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<LockoutRecord, Error> {
        let record = LockoutRecord {
            id: self.next_lockout_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            locked_at,
            release_at,
            ip_address: address.address.clone(),
            subnet: address.subnet.clone(),
        };
        self.lockouts.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_active_lockout(
        &self,
        subnet: &SubnetPrefix,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutRecord>, Error> {
        let lockouts = self.lockouts.read().await;
        Ok(lockouts
            .iter()
            .find(|l| l.is_active(now) && subnet.matches(&l.ip_address))
            .cloned())
    }

    async fn list_active_lockouts(&self, now: DateTime<Utc>) -> Result<Vec<LockoutRecord>, Error> {
        let lockouts = self.lockouts.read().await;
        let mut active: Vec<LockoutRecord> =
            lockouts.iter().filter(|l| l.is_active(now)).cloned().collect();
        active.sort_by_key(|l| (l.release_at, l.id));
        Ok(active)
    }

    async fn prune_lockouts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut lockouts = self.lockouts.write().await;
        let before_len = lockouts.len();
        lockouts.retain(|l| l.release_at >= before);
        Ok((before_len - lockouts.len()) as u64)
    }
}

/// Repository provider backed by a [`MemoryRepository`].
#[derive(Debug, Default)]
pub struct MemoryRepositoryProvider {
    repository: MemoryRepository,
}

impl MemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repository(&self) -> &MemoryRepository {
        &self.repository
    }
}

impl AttemptRepositoryProvider for MemoryRepositoryProvider {
    type AttemptRepo = MemoryRepository;

    fn attempts(&self) -> &Self::AttemptRepo {
        &self.repository
    }
}

impl LockoutRepositoryProvider for MemoryRepositoryProvider {
    type LockoutRepo = MemoryRepository;

    fn lockouts(&self) -> &Self::LockoutRepo {
        &self.repository
    }
}

#[async_trait]
impl RepositoryProvider for MemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}
