//! Core error types for unplug-core.
//!
//! Most failures in the scheduling core are absorbed where they happen and
//! only logged: a failed reminder, a failed stats write or a failed battery
//! read never stops a running session. The only error surfaced to callers of
//! the controller is an invalid start request (plus configuration loading in
//! the storage layer).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for unplug-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// `start()` was called with a non-positive duration.
    #[error("Invalid duration: {0} seconds (must be greater than zero)")]
    InvalidDuration(i64),

    /// Notification collaborator failed
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Key-value persistence failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Battery telemetry could not be read
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Failures reported by a notification dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The platform refused delivery (e.g. permission revoked).
    #[error("Notification rejected: {0}")]
    Rejected(String),

    /// The delivery channel could not be reached or timed out.
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store failures.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write against the store failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be encoded or decoded
    #[error("Corrupt value for key '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// Database is locked
    #[error("Store is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Battery telemetry failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Battery telemetry unavailable")]
    Unavailable,

    #[error("Battery level out of range: {0}")]
    OutOfRange(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_duration_message_mentions_value() {
        let err = CoreError::InvalidDuration(-5);
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn dispatch_error_converts_into_core_error() {
        let err: CoreError = DispatchError::Rejected("permission revoked".into()).into();
        assert!(matches!(err, CoreError::Dispatch(DispatchError::Rejected(_))));
        assert!(err.to_string().contains("permission revoked"));
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        // SQLITE_BUSY maps to DatabaseBusy, which is a query failure rather than a lock.
        assert!(matches!(
            PersistenceError::from(raw),
            PersistenceError::QueryFailed(_)
        ));

        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(matches!(PersistenceError::from(raw), PersistenceError::Locked));
    }
}
