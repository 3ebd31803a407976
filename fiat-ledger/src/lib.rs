//! Fiat Ledger
//!
//! Custodial bank-style ledger: accounts, virtual sub-accounts, an
//! append-only transaction journal, and idempotent transfers.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task serializes every mutation
//! - **Atomic Batches**: Balance, journal entry, and idempotency claim commit together
//! - **Append-only Journal**: One immutable entry per side of every mutation
//! - **Integral Money**: Balances are u64 currency units, never floating point
//!
//! # Invariants
//!
//! - Balance == signed sum of the account's journal entries, and never negative
//! - Per-account sequence numbers are gap-free and strictly increasing
//! - An idempotency key commits with its mutation or not at all

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod numbering;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::TransferOutcome;
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use notify::DepositNotice;
pub use storage::Storage;
pub use types::{
    Account, AccountId, AccountType, Counterparty, EntryType, IdempotencyRecord, JournalEntry,
    RoutingInfo, TransferReceipt, VirtualAccount,
};
