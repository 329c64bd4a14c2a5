//! Error types for stash operations

use thiserror::Error;

/// Key formatting errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid namespace {namespace:?}: must be longer than {min_len} characters")]
    InvalidNamespace { namespace: String, min_len: usize },
}

/// Key-value store failures.
///
/// Store adapters convert their client's native errors into this type so that
/// nothing backend-specific leaks through the cache layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection unavailable: {reason}")]
    Connection { reason: String },

    #[error("Store command {command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Build a [`StoreError::Command`] from any displayable failure.
    pub fn command(command: &'static str, reason: impl ToString) -> Self {
        Self::Command {
            command,
            reason: reason.to_string(),
        }
    }
}

/// Encode/decode failures at the storage boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encode failed: {reason}")]
    Encode { reason: String },

    #[error("Decode failed: {reason}")]
    Decode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all stash errors.
#[derive(Debug, Clone, Error)]
pub enum StashError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for stash operations.
pub type StashResult<T> = Result<T, StashError>;

// =============================================================================
// TESTS
// =============================================================================
