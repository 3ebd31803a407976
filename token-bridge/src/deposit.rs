//! Inbound deposit processing
//!
//! Two at-least-once sources feed the bridge: bank deposit messages from the
//! fiat rail's change feed, and settled transactions observed on the token
//! network. Both are deduplicated by a scoped key claimed atomically with the
//! state change, so redelivery is always safe. Events that fail a filter are
//! skipped with a reason, never errored, so the source can ack them; only
//! storage failures propagate, signalling the source to redeliver.

use crate::{
    config::BridgeConfig,
    metrics::BridgeMetrics,
    store::{BridgeStore, TokenEntrySpec},
    types::{BankDepositMessage, DepositOutcome, SettledTransaction, SkipReason, TokenEntryKind},
    Result,
};
use fiat_ledger::Ledger;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Applies inbound deposit events exactly once
pub struct DepositProcessor {
    ledger: Ledger,
    store: Arc<BridgeStore>,
    config: Arc<BridgeConfig>,
    metrics: BridgeMetrics,
}

impl DepositProcessor {
    /// Create the processor
    pub fn new(
        ledger: Ledger,
        store: Arc<BridgeStore>,
        config: Arc<BridgeConfig>,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            metrics,
        }
    }

    fn skip(&self, reason: SkipReason) -> DepositOutcome {
        self.metrics.deposits_skipped.inc();
        DepositOutcome::Skipped(reason)
    }

    /// Apply a bank deposit routed through a wallet's virtual account
    ///
    /// The dedup claim (`bank-deposit_<message_id>`) and the fiat credit
    /// commit in one ledger transaction.
    pub async fn process_bank_deposit(&self, msg: &BankDepositMessage) -> Result<DepositOutcome> {
        if msg.amount == 0 {
            return Ok(self.skip(SkipReason::NonPositiveAmount));
        }

        let wallet = match self
            .store
            .get_wallet_by_virtual_number(&msg.virtual_account_number)?
        {
            Some(wallet) => wallet,
            None => {
                tracing::warn!(
                    message_id = %msg.message_id,
                    virtual_account_number = %msg.virtual_account_number,
                    "Bank deposit to unrouted virtual account, skipping"
                );
                return Ok(self.skip(SkipReason::UnknownDestination));
            }
        };

        let applied = self
            .ledger
            .apply_deposit_event(
                "bank-deposit",
                &msg.message_id,
                wallet.account_id,
                msg.amount,
                "Bank deposit".to_string(),
                Some(msg.transaction_id.clone()),
            )
            .await?;

        match applied {
            Some(_) => {
                self.metrics.deposits_applied.inc();
                tracing::info!(
                    message_id = %msg.message_id,
                    account_id = %wallet.account_id,
                    amount = msg.amount,
                    "Bank deposit applied"
                );
                Ok(DepositOutcome::Applied)
            }
            None => {
                self.metrics.duplicates.inc();
                Ok(DepositOutcome::Duplicate)
            }
        }
    }

    /// Apply a settled network transaction as a token deposit
    ///
    /// The filter chain drops everything that is not a successful, tracked
    /// token payment into a custodial wallet; each drop names its reason.
    /// What survives is claimed under `xrpl-deposit_<hash>` atomically with
    /// the token journal append.
    pub fn process_network_transaction(&self, tx: &SettledTransaction) -> Result<DepositOutcome> {
        if tx.result_code != "tesSUCCESS" {
            return Ok(self.skip(SkipReason::NotSuccessful));
        }

        let (currency, issuer) = match (&tx.currency, &tx.issuer) {
            (Some(currency), Some(issuer)) => (currency, issuer),
            _ => return Ok(self.skip(SkipReason::NativeAsset)),
        };

        let token = match self.config.find_token(currency, issuer) {
            Some(token) => token,
            None => return Ok(self.skip(SkipReason::UnknownToken)),
        };

        // A payment to the issuer burns; never a user deposit.
        if tx.destination == token.issuer {
            return Ok(self.skip(SkipReason::Burn));
        }

        let wallet = match self.store.get_wallet_by_address(&tx.destination)? {
            Some(wallet) => wallet,
            None => return Ok(self.skip(SkipReason::UnknownDestination)),
        };

        if tx.amount <= Decimal::ZERO {
            return Ok(self.skip(SkipReason::NonPositiveAmount));
        }

        let claim_key = format!("xrpl-deposit_{}", tx.hash);
        let entry = self.store.claim_and_append(
            &claim_key,
            TokenEntrySpec {
                account_id: wallet.account_id,
                kind: TokenEntryKind::Deposit,
                amount: tx.amount,
                token,
                tx_hash: Some(tx.hash.clone()),
                related_order_id: None,
            },
        )?;

        match entry {
            Some(entry) => {
                self.metrics.deposits_applied.inc();
                tracing::info!(
                    tx_hash = %tx.hash,
                    account_id = %wallet.account_id,
                    amount = %entry.amount,
                    "Token deposit applied"
                );
                Ok(DepositOutcome::Applied)
            }
            None => {
                self.metrics.duplicates.inc();
                tracing::debug!(tx_hash = %tx.hash, "Duplicate network transaction skipped");
                Ok(DepositOutcome::Duplicate)
            }
        }
    }
}
