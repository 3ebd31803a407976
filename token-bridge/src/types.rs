//! Core types for the token bridge
//!
//! Fiat amounts stay integral `u64` units (the ledger's unit). Token amounts
//! arrive from the network as decimal strings and are carried as
//! `rust_decimal::Decimal`; the peg is 1:1, so a fiat amount converts to its
//! exact decimal and back without rounding.

use chrono::{DateTime, Utc};
use fiat_ledger::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A token identified by its currency code and issuing address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    /// Currency code on the network
    pub currency: String,
    /// Issuer address
    pub issuer: String,
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.currency, self.issuer)
    }
}

/// A custodial network wallet owned by one ledger account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning ledger account
    pub account_id: AccountId,

    /// Network address derived from the custody key at `key_index`
    pub address: String,

    /// Derivation index allocated from the ledger's sequence allocator
    pub key_index: u64,

    /// Virtual account number routing bank deposits to this wallet's owner
    pub virtual_account_number: Option<String>,

    /// Next token journal sequence for this wallet (starts at 0)
    pub token_sequence: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Exchange direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeDirection {
    /// Debit fiat, mint token to the user's wallet
    FiatToToken,
    /// Burn token from the user's wallet, credit fiat
    TokenToFiat,
}

impl fmt::Display for ExchangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeDirection::FiatToToken => write!(f, "fiat_to_token"),
            ExchangeDirection::TokenToFiat => write!(f, "token_to_fiat"),
        }
    }
}

/// Exchange order status
///
/// Statuses only move forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order row written, nothing moved yet
    Pending,
    /// Fiat leg debited (fiat -> token path)
    FiatDebited,
    /// Token burned on-network (token -> fiat path)
    TokenBurned,
    /// Both legs done
    Completed,
    /// Terminal failure; `failure_reason` says why
    Failed,
}

impl OrderStatus {
    /// Terminal statuses reject further updates
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::FiatDebited => "fiat_debited",
            OrderStatus::TokenBurned => "token_burned",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Exchange order: the saga's durable progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// Order ID
    pub order_id: Uuid,

    /// Account exchanging value
    pub account_id: AccountId,

    /// Direction of the exchange
    pub direction: ExchangeDirection,

    /// Amount in integral fiat units (1:1 peg)
    pub amount: u64,

    /// Token being minted or burned
    pub token: TokenId,

    /// Current status
    pub status: OrderStatus,

    /// Network transaction hash, once a network leg succeeded
    pub tx_hash: Option<String>,

    /// Failure reason for `Failed` orders
    pub failure_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Token journal entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEntryKind {
    /// Inbound token payment settled to a custodial wallet
    Deposit,
    /// Outbound token payment to an external address
    Withdrawal,
    /// Token minted by a fiat -> token exchange
    ExchangeIn,
    /// Token burned by a token -> fiat exchange
    ExchangeOut,
}

impl TokenEntryKind {
    /// Wire/storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEntryKind::Deposit => "deposit",
            TokenEntryKind::Withdrawal => "withdrawal",
            TokenEntryKind::ExchangeIn => "exchange_in",
            TokenEntryKind::ExchangeOut => "exchange_out",
        }
    }
}

/// Append-only token transaction record for one wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenJournalEntry {
    /// Entry ID
    pub entry_id: Uuid,

    /// Wallet owner
    pub account_id: AccountId,

    /// Entry kind
    pub kind: TokenEntryKind,

    /// Token amount (exact decimal)
    pub amount: Decimal,

    /// Token moved
    pub token: TokenId,

    /// Network transaction hash, when a network leg produced this entry
    pub tx_hash: Option<String>,

    /// Correlates exchange legs to their order
    pub related_order_id: Option<String>,

    /// Per-wallet sequence number
    pub sequence_number: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Whitelisted bank destination for fiat withdrawals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankBeneficiary {
    /// Destination bank code
    pub bank_code: String,
    /// Destination branch code
    pub branch_code: String,
    /// Destination account number
    pub account_number: String,
    /// Holder display name
    pub holder: String,
}

impl BankBeneficiary {
    /// Stable key for whitelist storage
    pub fn routing_key(&self) -> String {
        format!("{}:{}:{}", self.bank_code, self.branch_code, self.account_number)
    }
}

/// Whitelisted network address for token withdrawals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBeneficiary {
    /// Destination address
    pub address: String,
    /// Caller-supplied label
    pub label: String,
}

/// Recorded trust line between a custodial wallet and a token issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustLine {
    /// Wallet owner
    pub account_id: AccountId,
    /// Trusted token
    pub token: TokenId,
    /// True when this call actually set the line (vs. already present)
    pub newly_created: bool,
    /// When the line was recorded locally
    pub created_at: DateTime<Utc>,
}

/// Dead-letter record for conditions needing operator intervention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationItem {
    /// Item ID
    pub item_id: Uuid,

    /// Affected account
    pub account_id: AccountId,

    /// Related order, if the condition arose inside a saga
    pub order_id: Option<Uuid>,

    /// What went wrong and what is owed
    pub reason: String,

    /// Fiat amount involved, if any
    pub fiat_amount: Option<u64>,

    /// Token amount involved, if any
    pub token_amount: Option<Decimal>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Inbound bank deposit message from the fiat rail's change feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankDepositMessage {
    /// Delivery-system message ID (dedup scope `bank-deposit`)
    pub message_id: String,
    /// Rail-side transaction reference
    pub transaction_id: String,
    /// Amount in integral fiat units
    pub amount: u64,
    /// Virtual account number the deposit was routed to
    pub virtual_account_number: String,
}

impl BankDepositMessage {
    /// Parse a raw change-feed payload
    pub fn from_json(payload: &str) -> crate::Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| crate::Error::Validation(format!("malformed deposit message: {}", e)))
    }
}

/// A settled network transaction observed by the deposit worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledTransaction {
    /// Network transaction hash (dedup scope `xrpl-deposit`)
    pub hash: String,
    /// Engine result code; only `tesSUCCESS` settles
    pub result_code: String,
    /// Source address
    pub source: String,
    /// Destination address
    pub destination: String,
    /// Delivered currency code; `None` for native-asset payments
    pub currency: Option<String>,
    /// Delivered currency issuer; `None` for native-asset payments
    pub issuer: Option<String>,
    /// Delivered amount
    pub amount: Decimal,
}

/// Why a deposit event was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Engine result was not success
    NotSuccessful,
    /// Payment went to the issuer (a burn), not a user deposit
    Burn,
    /// Native-asset payment, not a tracked token
    NativeAsset,
    /// Currency/issuer pair is not a configured token
    UnknownToken,
    /// Destination is not a custodial wallet
    UnknownDestination,
    /// Amount was zero or negative
    NonPositiveAmount,
}

/// Outcome of processing one inbound deposit event
#[derive(Debug, Clone)]
pub enum DepositOutcome {
    /// Applied; fiat deposits carry the ledger receipt
    Applied,
    /// Already processed under this dedup key
    Duplicate,
    /// Filtered out before any state change
    Skipped(SkipReason),
}

/// Token balance line reported by the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Currency code
    pub currency: String,
    /// Issuer address
    pub issuer: String,
    /// Balance value
    pub value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_terminality() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::FiatDebited.is_terminal());
        assert!(!OrderStatus::TokenBurned.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn bank_deposit_message_parses_feed_payload() {
        let msg = BankDepositMessage::from_json(
            r#"{"message_id":"m-1","transaction_id":"tx-9","amount":2500,"virtual_account_number":"0010001"}"#,
        )
        .unwrap();
        assert_eq!(msg.amount, 2500);
        assert_eq!(msg.virtual_account_number, "0010001");

        assert!(BankDepositMessage::from_json("{not json").is_err());
    }

    #[test]
    fn beneficiary_routing_key_is_stable() {
        let b = BankBeneficiary {
            bank_code: "0001".into(),
            branch_code: "123".into(),
            account_number: "7654321".into(),
            holder: "Alice".into(),
        };
        assert_eq!(b.routing_key(), "0001:123:7654321");
    }
}
