//! Lockout policy configuration
//!
//! The policy is owned by whatever settings surface the hosting application
//! has. The lockout service only reads it, once per operation, through a
//! [`PolicyProvider`].
//!
//! # Example
//!
//! ```rust
//! use chrono::Duration;
//! use lockdown_core::policy::PolicyConfig;
//!
//! let policy = PolicyConfig::default()
//!     .with_max_login_retries(5)
//!     .with_lockout_length(Duration::minutes(15))
//!     .with_lockout_invalid_usernames(true);
//!
//! assert!(policy.validate().is_ok());
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{Error, error::ConfigError};

pub const ENV_MAX_LOGIN_RETRIES: &str = "LOCKDOWN_MAX_LOGIN_RETRIES";
pub const ENV_RETRIES_WITHIN_MINUTES: &str = "LOCKDOWN_RETRIES_WITHIN_MINUTES";
pub const ENV_LOCKOUT_LENGTH_MINUTES: &str = "LOCKDOWN_LOCKOUT_LENGTH_MINUTES";
pub const ENV_LOCKOUT_INVALID_USERNAMES: &str = "LOCKDOWN_LOCKOUT_INVALID_USERNAMES";
pub const ENV_MASK_LOGIN_ERRORS: &str = "LOCKDOWN_MASK_LOGIN_ERRORS";

/// Thresholds and switches for subnet lockout.
///
/// Durations are serialized as whole minutes, and [`validate`](Self::validate)
/// rejects anything finer. Missing keys take their default
/// value, so a partially stored settings object is merged over the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Failures within the window that trigger a lockout
    pub max_login_retries: u32,

    /// Window in which failures are counted
    #[serde(with = "minutes")]
    pub retries_within: Duration,

    /// How long a lockout lasts
    #[serde(with = "minutes")]
    pub lockout_length: Duration,

    /// Track and lock failures for usernames that do not exist
    pub lockout_invalid_usernames: bool,

    /// Report unknown usernames and wrong passwords with the same message
    pub mask_login_errors: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_login_retries: 3,
            retries_within: Duration::minutes(5),
            lockout_length: Duration::minutes(60),
            lockout_invalid_usernames: false,
            mask_login_errors: false,
        }
    }
}

impl PolicyConfig {
    pub fn with_max_login_retries(mut self, retries: u32) -> Self {
        self.max_login_retries = retries;
        self
    }

    pub fn with_retries_within(mut self, window: Duration) -> Self {
        self.retries_within = window;
        self
    }

    pub fn with_lockout_length(mut self, length: Duration) -> Self {
        self.lockout_length = length;
        self
    }

    pub fn with_lockout_invalid_usernames(mut self, enabled: bool) -> Self {
        self.lockout_invalid_usernames = enabled;
        self
    }

    pub fn with_mask_login_errors(mut self, enabled: bool) -> Self {
        self.mask_login_errors = enabled;
        self
    }

    /// Check that the policy can actually lock anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_login_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_login_retries must be at least 1".to_string(),
            ));
        }
        whole_minutes("retries_within", self.retries_within)?;
        whole_minutes("lockout_length", self.lockout_length)?;
        Ok(())
    }

    /// Build a policy from `LOCKDOWN_*` environment variables.
    ///
    /// Unset variables keep their default value. Booleans accept
    /// `true`/`false`, `yes`/`no` and `1`/`0`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut policy = Self::default();

        if let Some(value) = lookup(ENV_MAX_LOGIN_RETRIES) {
            policy.max_login_retries = parse_number(ENV_MAX_LOGIN_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRIES_WITHIN_MINUTES) {
            policy.retries_within = parse_minutes(ENV_RETRIES_WITHIN_MINUTES, &value)?;
        }
        if let Some(value) = lookup(ENV_LOCKOUT_LENGTH_MINUTES) {
            policy.lockout_length = parse_minutes(ENV_LOCKOUT_LENGTH_MINUTES, &value)?;
        }
        if let Some(value) = lookup(ENV_LOCKOUT_INVALID_USERNAMES) {
            policy.lockout_invalid_usernames = parse_flag(ENV_LOCKOUT_INVALID_USERNAMES, &value)?;
        }
        if let Some(value) = lookup(ENV_MASK_LOGIN_ERRORS) {
            policy.mask_login_errors = parse_flag(ENV_MASK_LOGIN_ERRORS, &value)?;
        }

        policy.validate()?;
        Ok(policy)
    }

    /// The message shown to the user for a rejected login.
    ///
    /// Locked requests never learn how long the lockout lasts.
    pub fn rejection_message(&self, rejection: Rejection) -> &'static str {
        match rejection {
            Rejection::Locked => {
                "This IP range has been blocked due to too many recent failed login attempts. Please try again later."
            }
            _ if self.mask_login_errors => "Invalid username or incorrect password.",
            Rejection::UnknownUser => "Invalid username.",
            Rejection::IncorrectPassword => "Incorrect password.",
        }
    }
}

/// Why a login was rejected, as far as the user-facing message is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownUser,
    IncorrectPassword,
    Locked,
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_minutes(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let minutes: i64 = parse_number(key, value)?;
    Duration::try_minutes(minutes).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Durations travel as whole minutes, so anything finer would not survive a
/// save and reload of the policy.
fn whole_minutes(key: &str, duration: Duration) -> Result<(), ConfigError> {
    if duration <= Duration::zero() {
        return Err(ConfigError::Invalid(format!("{key} must be positive")));
    }
    if duration != Duration::minutes(duration.num_minutes()) {
        return Err(ConfigError::Invalid(format!(
            "{key} must be a whole number of minutes"
        )));
    }
    Ok(())
}

mod minutes {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_minutes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = i64::deserialize(deserializer)?;
        Duration::try_minutes(minutes)
            .ok_or_else(|| serde::de::Error::custom(format!("{minutes} minutes is out of range")))
    }
}

/// Supplies the policy in effect for one operation.
pub trait PolicyProvider: Send + Sync + 'static {
    fn policy(&self) -> PolicyConfig;
}

impl PolicyProvider for PolicyConfig {
    fn policy(&self) -> PolicyConfig {
        self.clone()
    }
}

/// A policy handle that the settings surface can update while the service runs.
///
/// Clones share the same underlying value.
#[derive(Debug, Clone)]
pub struct SharedPolicy {
    sender: std::sync::Arc<watch::Sender<PolicyConfig>>,
}

impl SharedPolicy {
    pub fn new(initial: PolicyConfig) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self {
            sender: std::sync::Arc::new(sender),
        }
    }

    /// Replace the policy. Invalid policies are rejected and the current one kept.
    pub fn update(&self, policy: PolicyConfig) -> Result<(), ConfigError> {
        policy.validate()?;
        tracing::info!(
            max_login_retries = policy.max_login_retries,
            retries_within_minutes = policy.retries_within.num_minutes(),
            lockout_length_minutes = policy.lockout_length.num_minutes(),
            lockout_invalid_usernames = policy.lockout_invalid_usernames,
            "Lockout policy updated"
        );
        self.sender.send_replace(policy);
        Ok(())
    }

    /// Subscribe to policy changes.
    pub fn subscribe(&self) -> watch::Receiver<PolicyConfig> {
        self.sender.subscribe()
    }
}

impl Default for SharedPolicy {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl PolicyProvider for SharedPolicy {
    fn policy(&self) -> PolicyConfig {
        self.sender.borrow().clone()
    }
}
