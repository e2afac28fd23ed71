//! User identity and the user directory collaborator
//!
//! The lockout engine does not own users. It asks a [`UserDirectory`] to turn
//! the submitted login name into a stable [`UserId`], and treats "no such
//! user" as a normal outcome that feeds the invalid-username policy.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Value persisted in place of a user id when the login name did not resolve.
pub const UNKNOWN_USER_ID: i64 = -1;

/// A stable identifier for a user in the hosting application's directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Encode an optional user for storage, using the unknown-user sentinel.
    pub fn to_stored(user_id: Option<UserId>) -> i64 {
        user_id.map_or(UNKNOWN_USER_ID, |id| id.0)
    }

    /// Decode a stored user column. Only [`UNKNOWN_USER_ID`] means "unknown
    /// user"; a directory that hands out `-1` as a real id cannot be told
    /// apart from it.
    pub fn from_stored(value: i64) -> Option<UserId> {
        (value != UNKNOWN_USER_ID).then_some(UserId(value))
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves login names to user identities.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Look up a user by login name. `Ok(None)` means the user does not exist.
    async fn resolve_user(&self, username: &str) -> Result<Option<UserId>, Error>;
}

/// An in-process user directory.
///
/// Usernames are trimmed before they are stored or looked up.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, UserId>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, username: &str, id: UserId) -> Option<UserId> {
        self.users.insert(username.trim().to_string(), id)
    }

    pub fn remove(&self, username: &str) -> Option<UserId> {
        self.users.remove(username.trim()).map(|(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, UserId)> for MemoryUserDirectory {
    fn from_iter<I: IntoIterator<Item = (S, UserId)>>(iter: I) -> Self {
        let directory = Self::new();
        for (username, id) in iter {
            let username: String = username.into();
            directory.insert(&username, id);
        }
        directory
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn resolve_user(&self, username: &str) -> Result<Option<UserId>, Error> {
        Ok(self.users.get(username.trim()).map(|entry| *entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_sentinel_round_trip() {
        assert_eq!(UserId::to_stored(None), UNKNOWN_USER_ID);
        assert_eq!(UserId::to_stored(Some(UserId::new(42))), 42);
        assert_eq!(UserId::from_stored(UNKNOWN_USER_ID), None);
        assert_eq!(UserId::from_stored(0), Some(UserId::new(0)));
    }

    #[test]
    fn test_negative_ids_round_trip() {
        for id in [-5, -2, i64::MIN] {
            let stored = UserId::to_stored(Some(UserId::new(id)));
            assert_eq!(UserId::from_stored(stored), Some(UserId::new(id)));
        }
    }

    #[tokio::test]
    async fn test_memory_directory_resolves_trimmed_names() {
        let directory: MemoryUserDirectory = [("admin", UserId::new(1))].into_iter().collect();

        assert_eq!(
            directory.resolve_user("admin").await.unwrap(),
            Some(UserId::new(1))
        );
        assert_eq!(
            directory.resolve_user("  admin ").await.unwrap(),
            Some(UserId::new(1))
        );
        assert_eq!(directory.resolve_user("root").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_directory_remove() {
        let directory = MemoryUserDirectory::new();
        directory.insert("editor", UserId::new(7));
        assert_eq!(directory.len(), 1);

        assert_eq!(directory.remove("editor"), Some(UserId::new(7)));
        assert!(directory.is_empty());
        assert_eq!(directory.resolve_user("editor").await.unwrap(), None);
    }
}
