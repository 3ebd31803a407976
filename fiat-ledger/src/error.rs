//! Error types for the fiat ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input; client-correctable, never retried
    #[error("Invalid: {0}")]
    Validation(String),

    /// Entity absent; terminal for the request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate setup of a singleton resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Debit exceeding the current balance
    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance {
        /// Balance at validation time
        available: u64,
        /// Requested debit amount
        requested: u64,
    },

    /// Authentication failure; deliberately indistinguishable from "not found"
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Allocator namespace exhausted; requires operator intervention
    #[error("Range exceeded: {0}")]
    RangeExceeded(String),

    /// Backing-store failure; retryable/redeliverable for event-sourced ops
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Actor mailbox or response channel closed
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether an event-sourced caller should signal for redelivery
    ///
    /// A failed dedup check is never "not a duplicate": proceeding without a
    /// successful check risks double-crediting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Concurrency(_) | Error::Io(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
