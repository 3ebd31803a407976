//! Error types for the token bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input; client-correctable
    #[error("Invalid: {0}")]
    Validation(String),

    /// Entity absent; terminal for the request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate setup of a singleton resource (wallet, whitelist entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External network or rail failure; the local side was not (or no
    /// longer) mutated when this surfaces
    #[error("Network error: {0}")]
    Network(String),

    /// Money is in an inconsistent state that needs an operator; a
    /// `ReconciliationItem` was persisted before this surfaced
    #[error("Reconciliation required: {0}")]
    Reconciliation(String),

    /// Ledger-side failure
    #[error(transparent)]
    Ledger(#[from] fiat_ledger::Error),

    /// Backing-store failure; retryable for event-sourced callers
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether an event-sourced caller should signal for redelivery
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(_) | Error::Io(_) => true,
            Error::Ledger(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_ledger() {
        assert!(Error::Storage("stalled".into()).is_retryable());
        assert!(Error::Ledger(fiat_ledger::Error::Storage("stalled".into())).is_retryable());
        assert!(!Error::Ledger(fiat_ledger::Error::Validation("bad".into())).is_retryable());
        assert!(!Error::Network("tecPATH_DRY".into()).is_retryable());
        assert!(!Error::Reconciliation("burned but not credited".into()).is_retryable());
    }
}
