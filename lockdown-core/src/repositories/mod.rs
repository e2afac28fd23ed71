//! Repository traits for the data access layer
//!
//! The lockout service talks to storage only through these traits.
//!
//! # Trait Hierarchy
//!
//! - [`AttemptRepository`] and [`LockoutRepository`] define the operations for
//!   each table
//! - [`AttemptRepositoryProvider`] and [`LockoutRepositoryProvider`] give access
//!   to a backend's implementation of each
//! - [`RepositoryProvider`] combines both plus lifecycle methods
//!
//! Storage backends implement the individual repositories and expose them
//! through one provider. The [`adapter`] module turns a shared provider back
//! into individual repositories for the service.

pub mod adapter;
pub mod attempt;
pub mod lockout;
pub mod memory;

pub use adapter::{AttemptRepositoryAdapter, LockoutRepositoryAdapter};
pub use attempt::AttemptRepository;
pub use lockout::LockoutRepository;
pub use memory::{MemoryRepository, MemoryRepositoryProvider};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for attempt repository access.
pub trait AttemptRepositoryProvider: Send + Sync + 'static {
    /// The attempt repository implementation type
    type AttemptRepo: AttemptRepository;

    /// Get the attempt repository
    fn attempts(&self) -> &Self::AttemptRepo;
}

/// Provider trait for lockout repository access.
pub trait LockoutRepositoryProvider: Send + Sync + 'static {
    /// The lockout repository implementation type
    type LockoutRepo: LockoutRepository;

    /// Get the lockout repository
    fn lockouts(&self) -> &Self::LockoutRepo;
}

/// Provider trait that storage backends implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement [`AttemptRepository`] and [`LockoutRepository`]
/// 2. Implement both provider traits
/// 3. Implement `RepositoryProvider` with `migrate()` and `health_check()`
///
/// ```rust,ignore
/// use lockdown_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl AttemptRepositoryProvider for MyStorage {
///     type AttemptRepo = MyAttemptRepository;
///     fn attempts(&self) -> &Self::AttemptRepo { &self.attempts }
/// }
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: AttemptRepositoryProvider + LockoutRepositoryProvider {
    /// Create or upgrade the backing tables
    async fn migrate(&self) -> Result<(), Error>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), Error>;
}
