//! Custodial wallet directory
//!
//! One wallet per ledger account. The derivation index comes from the
//! ledger's sequence allocator, so two registrations can never share a key
//! even across restarts; the address is derived by the network client.

use crate::{
    network::{FiatRail, ValueNetwork},
    store::BridgeStore,
    types::Wallet,
    Error, Result,
};
use chrono::Utc;
use fiat_ledger::{AccountId, Ledger};
use std::sync::Arc;

/// Wallet registration and lookup
pub struct WalletRegistry<N: ValueNetwork> {
    ledger: Ledger,
    store: Arc<BridgeStore>,
    network: Arc<N>,
}

impl<N: ValueNetwork> WalletRegistry<N> {
    /// Create the registry
    pub fn new(ledger: Ledger, store: Arc<BridgeStore>, network: Arc<N>) -> Self {
        Self {
            ledger,
            store,
            network,
        }
    }

    /// Register a custodial wallet for a ledger account
    ///
    /// Allocates a fresh derivation index, derives the address, and stores
    /// the wallet. A second registration for the same account conflicts.
    pub async fn register_wallet(&self, account_id: AccountId) -> Result<Wallet> {
        // The account must exist on the ledger side.
        self.ledger.get_account(&account_id)?;

        if self.store.get_wallet(&account_id)?.is_some() {
            return Err(Error::Conflict(format!(
                "wallet already registered for {}",
                account_id
            )));
        }

        let key_index = self
            .ledger
            .allocate_index(Ledger::wallet_index_counter())
            .await?;
        let address = self.network.derive_address(key_index).await?;

        let now = Utc::now();
        let wallet = Wallet {
            account_id,
            address,
            key_index,
            virtual_account_number: None,
            token_sequence: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.register_wallet(&wallet)?;

        tracing::info!(
            account_id = %account_id,
            address = %wallet.address,
            key_index,
            "Wallet registered"
        );

        Ok(wallet)
    }

    /// Attach a fiat deposit route to a wallet
    ///
    /// Asks the rail for a virtual account labeled for this wallet and links
    /// its number, so inbound bank deposits resolve to the owning account.
    pub async fn attach_deposit_route<F: FiatRail>(
        &self,
        account_id: AccountId,
        rail: &F,
    ) -> Result<Wallet> {
        let wallet = self
            .store
            .get_wallet(&account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        if wallet.virtual_account_number.is_some() {
            return Err(Error::Conflict(format!(
                "wallet for {} already has a deposit route",
                account_id
            )));
        }

        let routing = rail
            .create_virtual_account(&format!("wallet-{}", wallet.key_index))
            .await?;

        let wallet = self
            .store
            .set_wallet_virtual_number(&account_id, routing.account_number.clone())?;

        tracing::info!(
            account_id = %account_id,
            virtual_account_number = %routing.account_number,
            "Deposit route attached"
        );

        Ok(wallet)
    }

    /// Wallet for a ledger account
    pub fn get_wallet(&self, account_id: &AccountId) -> Result<Wallet> {
        self.store
            .get_wallet(account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))
    }

    /// Wallet holding a network address, if custodial
    pub fn find_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        self.store.get_wallet_by_address(address)
    }

    /// Wallet behind a virtual account number, if routed
    pub fn find_by_virtual_number(&self, number: &str) -> Result<Option<Wallet>> {
        self.store.get_wallet_by_virtual_number(number)
    }
}
