//! Core functionality for lockdown
//!
//! This crate contains the failure-tracking and lockout decision engine used
//! to throttle logins per source subnet.
//!
//! It includes the subnet normalizer, the persisted record types, the
//! repository traits storage backends implement, and the [`LockoutService`]
//! that ties them together with a [`Clock`], a [`UserDirectory`] and a
//! [`PolicyProvider`].
//!
//! Application code usually goes through the `lockdown` crate instead of
//! depending on this one directly.
pub mod clock;
pub mod error;
pub mod policy;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod subnet;
pub mod user;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use policy::{PolicyConfig, PolicyProvider, Rejection, SharedPolicy};
pub use repositories::RepositoryProvider;
pub use services::{FailureOutcome, LockoutService};
pub use storage::{ActiveLockout, FailureRecord, LockoutRecord, PruneStats};
pub use subnet::{AddressFamily, NormalizedAddress, SubnetPrefix, normalize};
pub use user::{MemoryUserDirectory, UNKNOWN_USER_ID, UserDirectory, UserId};
