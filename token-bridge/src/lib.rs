//! Token Bridge
//!
//! The cross-domain side of the custodial ledger: exchange sagas between the
//! fiat ledger and a tokenized-asset network, inbound deposit processing,
//! custodial wallet directory, and whitelisted external withdrawals.
//!
//! # Architecture
//!
//! - **Saga orders**: a durable order row is written before anything moves;
//!   statuses only move forward
//! - **Exactly-once events**: every at-least-once source is deduplicated by a
//!   key claimed atomically with the state change
//! - **Dead-lettering**: conditions money cannot recover from automatically
//!   land in a reconciliation queue for an operator

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod deposit;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod network;
pub mod store;
pub mod types;
pub mod wallets;
pub mod withdrawal;

// Re-exports
pub use config::{BridgeConfig, TokenConfig};
pub use deposit::DepositProcessor;
pub use error::{Error, Result};
pub use exchange::ExchangeEngine;
pub use metrics::BridgeMetrics;
pub use network::{FiatRail, RailRouting, ValueNetwork};
pub use store::BridgeStore;
pub use types::{
    BankBeneficiary, BankDepositMessage, DepositOutcome, ExchangeDirection, ExchangeOrder,
    NetworkBeneficiary, OrderStatus, ReconciliationItem, SettledTransaction, SkipReason,
    TokenBalance, TokenEntryKind, TokenId, TokenJournalEntry, TrustLine, Wallet,
};
pub use wallets::WalletRegistry;
pub use withdrawal::{FiatWithdrawal, WithdrawalService};
