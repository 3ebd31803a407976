//! Account number formats and allocator namespaces
//!
//! Personal numbers are 7-digit zero-padded decimals. Corporate numbers are a
//! 3-digit prefix plus a fixed "0000" suffix, so the corporate namespace holds
//! at most 999 accounts. Virtual account numbers reuse the parent's 3-digit
//! prefix plus a 4-digit suffix, at most 9999 per prefix.

/// Counter name for personal account numbers (unbounded)
pub const PERSONAL_COUNTER: &str = "personal_account_number";

/// Counter name for corporate account numbers
pub const CORPORATE_COUNTER: &str = "corporate_account_number";

/// Counter name for wallet derivation indices (unbounded)
pub const WALLET_INDEX_COUNTER: &str = "wallet_index";

/// Maximum corporate accounts (3-digit prefix namespace)
pub const CORPORATE_MAX: u64 = 999;

/// Maximum virtual accounts per corporate prefix (4-digit suffix namespace)
pub const VIRTUAL_MAX_PER_PREFIX: u64 = 9999;

/// Format a personal account number from its allocated sequence
pub fn personal_number(seq: u64) -> String {
    format!("{seq:07}")
}

/// Format a corporate account number from its allocated sequence
pub fn corporate_number(seq: u64) -> String {
    format!("{seq:03}0000")
}

/// The 3-digit prefix that scopes a corporate account's virtual namespace
pub fn corporate_prefix(account_number: &str) -> &str {
    &account_number[..3]
}

/// Counter name for a corporate prefix's virtual account namespace
pub fn virtual_counter(prefix: &str) -> String {
    format!("virtual_account:{prefix}")
}

/// Format a virtual account number from its prefix and allocated sequence
pub fn virtual_number(prefix: &str, seq: u64) -> String {
    format!("{prefix}{seq:04}")
}
