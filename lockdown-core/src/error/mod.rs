pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid IP address: {0:?}")]
    Invalid(String),
}

/// Failures of the persistence layer.
///
/// These are never retried or swallowed by the lockout service. The hosting
/// application decides whether a storage failure fails open or closed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

impl Error {
    pub fn is_address_error(&self) -> bool {
        matches!(self, Error::Address(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
