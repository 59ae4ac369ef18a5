use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored value cannot be decoded as the requested type.
    #[error("cannot decode {key}: expected {expected}, found {found}")]
    DecodeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    /// A (simulated) remote tier did not answer in time.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// A tier cannot be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The embedded database failed.
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    /// I/O error outside the document engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chain configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A writer panicked while holding a tier lock.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Wrap any redb error (transaction, table, storage, commit).
    pub fn database(err: impl Into<redb::Error>) -> Self {
        Self::Database(err.into())
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DecodeMismatch { .. } => ErrorKind::DecodeMismatch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Config(_) => ErrorKind::Config,
            Self::Database(_) | Self::Io(_) | Self::LockPoisoned(_) => ErrorKind::Storage,
        }
    }
}

/// Error categories, used by the isolation decorator's never-suppress list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeMismatch,
    Timeout,
    Unavailable,
    Serialization,
    Storage,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DecodeMismatch => "decode_mismatch",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::Serialization => "serialization",
            Self::Storage => "storage",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
