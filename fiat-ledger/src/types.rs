//! Core types for the fiat ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (integral currency units, never floating point)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (opaque, unique across the ledger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Allocate a fresh account ID (UUIDv7 for time-ordering)
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes (storage keys)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Individual account (branch 002)
    Personal,
    /// Corporate account (branch 001); may own virtual sub-accounts
    Corporate,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Personal => write!(f, "personal"),
            AccountType::Corporate => write!(f, "corporate"),
        }
    }
}

/// A fiat ledger account
///
/// The balance is the sum of signed amounts of all journal entries for this
/// account and never goes negative. It is mutated only inside an atomic
/// transaction that also appends a journal entry and bumps
/// `transaction_sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque unique ID
    pub account_id: AccountId,

    /// Account number within the branch
    pub account_number: String,

    /// Personal or corporate
    pub account_type: AccountType,

    /// Holder display name
    pub holder: String,

    /// Fixed bank code
    pub bank_code: String,

    /// Branch code (001 corporate, 002 personal)
    pub branch_code: String,

    /// Current balance in integral currency units
    pub balance: u64,

    /// Monotonic journal sequence; starts at 0, +1 per entry
    pub transaction_sequence: u64,

    /// Secret PIN (never exposed through lookups)
    pub pin: String,

    /// Corporate-only: publish a deposit notice on inbound transfers
    pub pubsub_enabled: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Counterparty identity as seen by the other side of a transfer
    pub fn counterparty(&self) -> Counterparty {
        Counterparty {
            bank_code: self.bank_code.clone(),
            branch_code: self.branch_code.clone(),
            account_number: self.account_number.clone(),
            holder: self.holder.clone(),
        }
    }
}

/// A virtual sub-account: a routable alias settling to a parent account
///
/// Carries no balance of its own. Deactivated virtual accounts reject new
/// inbound routing but preserve history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAccount {
    /// Opaque unique ID
    pub virtual_account_id: Uuid,

    /// Account number: parent's 3-digit prefix + 4-digit suffix
    pub account_number: String,

    /// Same bank code as the parent
    pub bank_code: String,

    /// Same branch code as the parent
    pub branch_code: String,

    /// Parent holder name
    pub holder: String,

    /// Weak back-reference to the parent (lookup only)
    pub parent_account_id: AccountId,

    /// Parent account number (denormalized for display)
    pub parent_account_number: String,

    /// Caller-supplied label (e.g. end-user reference)
    pub label: String,

    /// Inactive virtual accounts reject new inbound routing
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Journal entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Cash-equivalent deposit
    AtmIn,
    /// Cash-equivalent withdrawal
    AtmOut,
    /// Transfer credit (receiver side)
    TransferIn,
    /// Transfer debit (sender side)
    TransferOut,
    /// Exchange credit (token -> fiat leg, or refund of a failed debit)
    ExchangeIn,
    /// Exchange debit (fiat -> token leg)
    ExchangeOut,
    /// Externally-sourced deposit (fiat rail event)
    Deposit,
    /// External withdrawal (to the fiat rail)
    Withdrawal,
    /// Compensating credit after a failed external action
    Refund,
}

impl EntryType {
    /// Wire/storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::AtmIn => "atm_in",
            EntryType::AtmOut => "atm_out",
            EntryType::TransferIn => "transfer_in",
            EntryType::TransferOut => "transfer_out",
            EntryType::ExchangeIn => "exchange_in",
            EntryType::ExchangeOut => "exchange_out",
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::Refund => "refund",
        }
    }

    /// Whether this entry credits the account (else it debits)
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            EntryType::AtmIn
                | EntryType::TransferIn
                | EntryType::ExchangeIn
                | EntryType::Deposit
                | EntryType::Refund
        )
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Public identity of the other side of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Bank code
    pub bank_code: String,
    /// Branch code
    pub branch_code: String,
    /// Account number
    pub account_number: String,
    /// Holder display name
    pub holder: String,
}

/// Immutable journal entry: one record per side of every balance mutation
///
/// Entries are append-only and never updated or deleted; `sequence_number` is
/// gap-free and strictly increasing per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique transaction ID
    pub transaction_id: Uuid,

    /// Account this entry belongs to
    pub account_id: AccountId,

    /// Entry type
    pub entry_type: EntryType,

    /// Amount moved (always positive)
    pub amount: u64,

    /// Post-mutation balance
    pub balance: u64,

    /// Other side of a transfer, if any
    pub counterparty: Option<Counterparty>,

    /// Copy of the account's transaction sequence at creation
    pub sequence_number: u64,

    /// Human-readable description
    pub description: String,

    /// Set when the credit was routed through a virtual account
    pub virtual_account_number: Option<String>,

    /// Label of the routing virtual account
    pub virtual_account_label: Option<String>,

    /// Correlates exchange/withdrawal legs to their order
    pub related_order_id: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of a balance mutation, also the replay answer for idempotent calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Caller-side balance after the mutation
    pub balance: u64,
    /// Caller-side journal entry ID
    pub transaction_id: Uuid,
}

/// Stored claim for a processed idempotency key or event message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Scoped key (`transfer_<key>` or `<event-type>_<message-id>`)
    pub key: String,
    /// Original result, replayed verbatim on duplicates
    pub receipt: Option<TransferReceipt>,
    /// When the original mutation committed
    pub processed_at: DateTime<Utc>,
}

/// Routing lookup result: a real account or an active virtual alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    /// Holder display name (parent's, when virtual)
    pub holder: String,
    /// Bank code
    pub bank_code: String,
    /// Branch code
    pub branch_code: String,
    /// Account number as addressed
    pub account_number: String,
    /// True when resolved through a virtual account
    pub is_virtual_account: bool,
    /// Parent account number, when virtual
    pub parent_account_number: Option<String>,
    /// Virtual account label, when virtual
    pub label: Option<String>,
}
