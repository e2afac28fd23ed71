//! Service layer for lockdown
//!
//! Services hold the decision logic and talk to storage only through the
//! repository traits.

pub mod lockout;

pub use lockout::{FailureOutcome, LockoutService};
