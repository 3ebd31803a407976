//! External withdrawals gated by per-account whitelists
//!
//! Both rails only pay destinations the account holder whitelisted first.
//! The fiat path debits before calling the rail and refunds on failure; the
//! token path submits the irreversible network payment first and treats the
//! local record as best-effort with a dead-letter fallback.

use crate::{
    metrics::BridgeMetrics,
    network::{FiatRail, ValueNetwork},
    store::{BridgeStore, TokenEntrySpec},
    types::{
        BankBeneficiary, NetworkBeneficiary, ReconciliationItem, TokenEntryKind, TokenId,
    },
    Error, Result,
};
use chrono::Utc;
use fiat_ledger::{AccountId, EntryType, Ledger};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a fiat withdrawal
#[derive(Debug, Clone)]
pub struct FiatWithdrawal {
    /// Rail-side transfer reference
    pub rail_reference: String,
    /// Remaining fiat balance
    pub balance: u64,
}

/// Withdrawals to external bank accounts and network addresses
pub struct WithdrawalService<N: ValueNetwork, F: FiatRail> {
    ledger: Ledger,
    store: Arc<BridgeStore>,
    network: Arc<N>,
    rail: Arc<F>,
    metrics: BridgeMetrics,
}

impl<N: ValueNetwork, F: FiatRail> WithdrawalService<N, F> {
    /// Create the service
    pub fn new(
        ledger: Ledger,
        store: Arc<BridgeStore>,
        network: Arc<N>,
        rail: Arc<F>,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            ledger,
            store,
            network,
            rail,
            metrics,
        }
    }

    // Whitelist management

    /// Whitelist a bank destination
    pub fn add_bank_beneficiary(
        &self,
        account_id: &AccountId,
        beneficiary: &BankBeneficiary,
    ) -> Result<()> {
        self.store.add_bank_beneficiary(account_id, beneficiary)
    }

    /// Remove a whitelisted bank destination
    pub fn remove_bank_beneficiary(&self, account_id: &AccountId, routing_key: &str) -> Result<()> {
        self.store.remove_bank_beneficiary(account_id, routing_key)
    }

    /// List whitelisted bank destinations
    pub fn list_bank_beneficiaries(&self, account_id: &AccountId) -> Result<Vec<BankBeneficiary>> {
        self.store.list_bank_beneficiaries(account_id)
    }

    /// Whitelist a network address
    pub fn add_network_beneficiary(
        &self,
        account_id: &AccountId,
        beneficiary: &NetworkBeneficiary,
    ) -> Result<()> {
        self.store.add_network_beneficiary(account_id, beneficiary)
    }

    /// Remove a whitelisted network address
    pub fn remove_network_beneficiary(&self, account_id: &AccountId, address: &str) -> Result<()> {
        self.store.remove_network_beneficiary(account_id, address)
    }

    /// List whitelisted network addresses
    pub fn list_network_beneficiaries(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<NetworkBeneficiary>> {
        self.store.list_network_beneficiaries(account_id)
    }

    // Withdrawals

    /// Withdraw fiat to a whitelisted bank destination
    ///
    /// Debit first, then the rail call with a fresh idempotency key. A rail
    /// failure refunds the debit; a refund failure is dead-lettered.
    pub async fn withdraw_fiat(
        &self,
        account_id: AccountId,
        beneficiary: &BankBeneficiary,
        amount: u64,
    ) -> Result<FiatWithdrawal> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        if !self.store.has_bank_beneficiary(&account_id, beneficiary)? {
            return Err(Error::Validation(
                "destination is not whitelisted".to_string(),
            ));
        }

        let withdrawal_id = Uuid::now_v7();
        self.ledger
            .debit(
                account_id,
                amount,
                EntryType::Withdrawal,
                format!("Withdrawal to {}", beneficiary.holder),
                Some(withdrawal_id.to_string()),
            )
            .await?;

        match self
            .rail
            .initiate_transfer(beneficiary, amount, &withdrawal_id.to_string())
            .await
        {
            Ok(reference) => {
                self.metrics.withdrawals.inc();
                let balance = self.ledger.get_account(&account_id)?.balance;

                tracing::info!(
                    account_id = %account_id,
                    amount,
                    rail_reference = %reference,
                    "Fiat withdrawal submitted"
                );

                Ok(FiatWithdrawal {
                    rail_reference: reference,
                    balance,
                })
            }
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %err,
                    "Rail transfer failed, refunding debit"
                );

                match self
                    .ledger
                    .credit(
                        account_id,
                        amount,
                        EntryType::Refund,
                        "Withdrawal refund".to_string(),
                        Some(withdrawal_id.to_string()),
                    )
                    .await
                {
                    Ok(_) => Err(err),
                    Err(refund_err) => {
                        self.store.push_reconciliation(&ReconciliationItem {
                            item_id: Uuid::now_v7(),
                            account_id,
                            order_id: None,
                            reason: format!(
                                "withdrawal debited but rail and refund both failed: rail: {}; refund: {}",
                                err, refund_err
                            ),
                            fiat_amount: Some(amount),
                            token_amount: None,
                            created_at: Utc::now(),
                        })?;
                        self.metrics.reconciliation_items.inc();
                        Err(Error::Reconciliation(format!(
                            "withdrawal {}: debit stranded, refund failed: {}",
                            withdrawal_id, refund_err
                        )))
                    }
                }
            }
        }
    }

    /// Withdraw tokens to a whitelisted network address
    ///
    /// The payment is irreversible once submitted. The local token entry is
    /// retried once; if both attempts fail the condition is dead-lettered and
    /// the hash still returned, since the value already moved.
    pub async fn withdraw_token(
        &self,
        account_id: AccountId,
        destination: &str,
        token: TokenId,
        amount: Decimal,
    ) -> Result<String> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        if !self.store.has_network_beneficiary(&account_id, destination)? {
            return Err(Error::Validation(
                "destination is not whitelisted".to_string(),
            ));
        }

        let wallet = self
            .store
            .get_wallet(&account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        let tx_hash = self
            .network
            .submit_user_payment(wallet.key_index, &wallet.address, destination, &token, amount)
            .await?;

        self.metrics.withdrawals.inc();
        tracing::info!(
            account_id = %account_id,
            destination = %destination,
            amount = %amount,
            tx_hash = %tx_hash,
            "Token withdrawal submitted"
        );

        let spec = || TokenEntrySpec {
            account_id,
            kind: TokenEntryKind::Withdrawal,
            amount,
            token: token.clone(),
            tx_hash: Some(tx_hash.clone()),
            related_order_id: None,
        };

        if let Err(first) = self.store.append_token_entry(spec()) {
            tracing::warn!(tx_hash = %tx_hash, error = %first, "Token entry failed, retrying once");
            if let Err(second) = self.store.append_token_entry(spec()) {
                self.store.push_reconciliation(&ReconciliationItem {
                    item_id: Uuid::now_v7(),
                    account_id,
                    order_id: None,
                    reason: format!(
                        "token withdrawal {} settled but not recorded: {}",
                        tx_hash, second
                    ),
                    fiat_amount: None,
                    token_amount: Some(amount),
                    created_at: Utc::now(),
                })?;
                self.metrics.reconciliation_items.inc();
            }
        }

        Ok(tx_hash)
    }
}
