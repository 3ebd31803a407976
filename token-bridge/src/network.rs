//! External client seams
//!
//! The bridge talks to two outside systems through traits: the value-transfer
//! network holding the tokens, and the fiat rail that moves bank money.
//! Implementations own retries and transport; the bridge treats any returned
//! error as a hard `Network` failure and drives its compensation logic off
//! that.

use crate::{
    types::{BankBeneficiary, TokenBalance, TokenId},
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Client for the value-transfer network custodying the tokens
///
/// `key_index` selects the custody key a wallet was derived from; signing
/// stays inside the implementation.
#[async_trait]
pub trait ValueNetwork: Send + Sync {
    /// Derive the address for a custody key index
    async fn derive_address(&self, key_index: u64) -> Result<String>;

    /// Ensure a trust line from `address` to the token's issuer exists
    ///
    /// Queries first and sets only when absent. Returns `true` when this call
    /// created the line.
    async fn ensure_trust_line(&self, key_index: u64, address: &str, token: &TokenId)
        -> Result<bool>;

    /// Issue (mint) tokens from the issuer to a destination address
    ///
    /// Returns the validated transaction hash. A non-success engine result is
    /// an error, never a hash.
    async fn submit_issuer_payment(
        &self,
        destination: &str,
        token: &TokenId,
        amount: Decimal,
    ) -> Result<String>;

    /// Pay tokens from a custodial wallet to any destination
    ///
    /// Paying the issuer burns. Returns the validated transaction hash.
    async fn submit_user_payment(
        &self,
        key_index: u64,
        source: &str,
        destination: &str,
        token: &TokenId,
        amount: Decimal,
    ) -> Result<String>;

    /// Token balances held at an address
    async fn balances(&self, address: &str) -> Result<Vec<TokenBalance>>;
}

/// Routing identity handed out by the fiat rail for inbound deposits
#[derive(Debug, Clone)]
pub struct RailRouting {
    /// Bank code
    pub bank_code: String,
    /// Branch code
    pub branch_code: String,
    /// Account number
    pub account_number: String,
}

/// Client for the external fiat rail
#[async_trait]
pub trait FiatRail: Send + Sync {
    /// Create a named virtual account for routing deposits to the bridge
    async fn create_virtual_account(&self, label: &str) -> Result<RailRouting>;

    /// Initiate a bank transfer to a whitelisted destination
    ///
    /// The idempotency key makes rail-side retries safe. Returns the rail's
    /// transfer reference.
    async fn initiate_transfer(
        &self,
        destination: &BankBeneficiary,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<String>;
}
