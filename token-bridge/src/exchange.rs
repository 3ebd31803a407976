//! Exchange orchestrator
//!
//! Two-leg sagas between the fiat ledger and the token network, pegged 1:1.
//! An order row is written before anything moves and its status only moves
//! forward, so a crash leaves a record of exactly how far the saga got.
//!
//! Compensation rules:
//! - fiat -> token: the fiat debit is reversible; a network failure after the
//!   debit triggers a compensating `refund` credit. If the compensation
//!   itself fails, the shortfall is dead-lettered.
//! - token -> fiat: the burn is irreversible; a fiat credit failure after the
//!   burn is dead-lettered and surfaced as `Reconciliation`.

use crate::{
    metrics::BridgeMetrics,
    network::ValueNetwork,
    store::{BridgeStore, TokenEntrySpec},
    types::{
        ExchangeDirection, ExchangeOrder, OrderStatus, ReconciliationItem, TokenEntryKind,
        TokenId, TrustLine,
    },
    Error, Result,
};
use chrono::Utc;
use fiat_ledger::{AccountId, EntryType, Ledger};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Drives exchange sagas between the ledger and the network
pub struct ExchangeEngine<N: ValueNetwork> {
    ledger: Ledger,
    store: Arc<BridgeStore>,
    network: Arc<N>,
    metrics: BridgeMetrics,
}

impl<N: ValueNetwork> ExchangeEngine<N> {
    /// Create the engine
    pub fn new(
        ledger: Ledger,
        store: Arc<BridgeStore>,
        network: Arc<N>,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            ledger,
            store,
            network,
            metrics,
        }
    }

    fn new_order(
        &self,
        account_id: AccountId,
        direction: ExchangeDirection,
        amount: u64,
        token: TokenId,
    ) -> ExchangeOrder {
        let now = Utc::now();
        ExchangeOrder {
            order_id: Uuid::now_v7(),
            account_id,
            direction,
            amount,
            token,
            status: OrderStatus::Pending,
            tx_hash: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn fail_order(&self, order_id: &Uuid, reason: &str) {
        self.metrics.orders_failed.inc();
        if let Err(err) =
            self.store
                .update_order_status(order_id, OrderStatus::Failed, None, Some(reason.to_string()))
        {
            tracing::error!(order_id = %order_id, error = %err, "Failed to mark order failed");
        }
    }

    /// Exchange fiat into tokens
    ///
    /// Debits the fiat balance, then mints tokens to the account's custodial
    /// wallet. The debit is refunded if the mint fails.
    pub async fn fiat_to_token(
        &self,
        account_id: AccountId,
        amount: u64,
        token: TokenId,
    ) -> Result<ExchangeOrder> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        let wallet = self
            .store
            .get_wallet(&account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        let order = self.new_order(account_id, ExchangeDirection::FiatToToken, amount, token.clone());
        self.store.insert_order(&order)?;
        let order_id = order.order_id;

        tracing::info!(
            order_id = %order_id,
            account_id = %account_id,
            amount,
            token = %token,
            "Exchange order opened (fiat -> token)"
        );

        // Step 1: reversible fiat debit.
        if let Err(err) = self
            .ledger
            .debit(
                account_id,
                amount,
                EntryType::ExchangeOut,
                format!("Exchange to {}", token.currency),
                Some(order_id.to_string()),
            )
            .await
        {
            self.fail_order(&order_id, &err.to_string());
            return Err(err.into());
        }

        self.store
            .update_order_status(&order_id, OrderStatus::FiatDebited, None, None)?;

        // Step 2: mint on-network.
        let token_amount = Decimal::from(amount);
        match self
            .network
            .submit_issuer_payment(&wallet.address, &token, token_amount)
            .await
        {
            Ok(tx_hash) => {
                // Record-keeping only; the value already moved.
                if let Err(err) = self.store.append_token_entry(TokenEntrySpec {
                    account_id,
                    kind: TokenEntryKind::ExchangeIn,
                    amount: token_amount,
                    token: token.clone(),
                    tx_hash: Some(tx_hash.clone()),
                    related_order_id: Some(order_id.to_string()),
                }) {
                    tracing::warn!(order_id = %order_id, error = %err, "Token entry not recorded");
                }

                let order = self.store.update_order_status(
                    &order_id,
                    OrderStatus::Completed,
                    Some(tx_hash),
                    None,
                )?;
                self.metrics.orders_completed.inc();

                tracing::info!(order_id = %order_id, "Exchange order completed");
                Ok(order)
            }
            Err(err) => {
                tracing::warn!(
                    order_id = %order_id,
                    error = %err,
                    "Mint failed, refunding fiat debit"
                );

                match self
                    .ledger
                    .credit(
                        account_id,
                        amount,
                        EntryType::Refund,
                        format!("Exchange refund ({})", token.currency),
                        Some(order_id.to_string()),
                    )
                    .await
                {
                    Ok(_) => {
                        self.fail_order(&order_id, &err.to_string());
                        Err(err)
                    }
                    Err(refund_err) => {
                        self.store.push_reconciliation(&ReconciliationItem {
                            item_id: Uuid::now_v7(),
                            account_id,
                            order_id: Some(order_id),
                            reason: format!(
                                "fiat debited but mint and refund both failed: mint: {}; refund: {}",
                                err, refund_err
                            ),
                            fiat_amount: Some(amount),
                            token_amount: None,
                            created_at: Utc::now(),
                        })?;
                        self.metrics.reconciliation_items.inc();
                        self.fail_order(&order_id, &err.to_string());
                        Err(Error::Reconciliation(format!(
                            "order {}: debit stranded, refund failed: {}",
                            order_id, refund_err
                        )))
                    }
                }
            }
        }
    }

    /// Exchange tokens back into fiat
    ///
    /// Burns tokens from the account's custodial wallet, then credits the
    /// fiat balance. The burn is irreversible; a credit failure after it is
    /// dead-lettered.
    pub async fn token_to_fiat(
        &self,
        account_id: AccountId,
        amount: u64,
        token: TokenId,
    ) -> Result<ExchangeOrder> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        let wallet = self
            .store
            .get_wallet(&account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        let order = self.new_order(account_id, ExchangeDirection::TokenToFiat, amount, token.clone());
        self.store.insert_order(&order)?;
        let order_id = order.order_id;

        tracing::info!(
            order_id = %order_id,
            account_id = %account_id,
            amount,
            token = %token,
            "Exchange order opened (token -> fiat)"
        );

        // Step 1: burn by paying the issuer. Nothing local moved yet, so a
        // failure here just closes the order.
        let token_amount = Decimal::from(amount);
        let tx_hash = match self
            .network
            .submit_user_payment(
                wallet.key_index,
                &wallet.address,
                &token.issuer,
                &token,
                token_amount,
            )
            .await
        {
            Ok(hash) => hash,
            Err(err) => {
                self.fail_order(&order_id, &err.to_string());
                return Err(err);
            }
        };

        self.store.update_order_status(
            &order_id,
            OrderStatus::TokenBurned,
            Some(tx_hash.clone()),
            None,
        )?;

        if let Err(err) = self.store.append_token_entry(TokenEntrySpec {
            account_id,
            kind: TokenEntryKind::ExchangeOut,
            amount: token_amount,
            token: token.clone(),
            tx_hash: Some(tx_hash.clone()),
            related_order_id: Some(order_id.to_string()),
        }) {
            tracing::warn!(order_id = %order_id, error = %err, "Token entry not recorded");
        }

        // Step 2: fiat credit. The burn cannot be undone, so failure here is
        // a reconciliation condition, not a rollback.
        match self
            .ledger
            .credit(
                account_id,
                amount,
                EntryType::ExchangeIn,
                format!("Exchange from {}", token.currency),
                Some(order_id.to_string()),
            )
            .await
        {
            Ok(_) => {
                let order = self.store.update_order_status(
                    &order_id,
                    OrderStatus::Completed,
                    None,
                    None,
                )?;
                self.metrics.orders_completed.inc();

                tracing::info!(order_id = %order_id, "Exchange order completed");
                Ok(order)
            }
            Err(err) => {
                self.store.push_reconciliation(&ReconciliationItem {
                    item_id: Uuid::now_v7(),
                    account_id,
                    order_id: Some(order_id),
                    reason: format!("token burned but fiat credit failed: {}", err),
                    fiat_amount: Some(amount),
                    token_amount: Some(token_amount),
                    created_at: Utc::now(),
                })?;
                self.metrics.reconciliation_items.inc();
                self.fail_order(&order_id, &err.to_string());
                Err(Error::Reconciliation(format!(
                    "order {}: token burned, fiat credit failed: {}",
                    order_id, err
                )))
            }
        }
    }

    /// Ensure a trust line for the account's wallet and record it
    ///
    /// Idempotent: an already-recorded line returns without touching the
    /// network.
    pub async fn register_trust(&self, account_id: AccountId, token: TokenId) -> Result<TrustLine> {
        if let Some(existing) = self.store.get_trust_line(&account_id, &token)? {
            // Replay: the line was set by an earlier call, not this one.
            return Ok(TrustLine {
                newly_created: false,
                ..existing
            });
        }

        let wallet = self
            .store
            .get_wallet(&account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        let newly_created = self
            .network
            .ensure_trust_line(wallet.key_index, &wallet.address, &token)
            .await?;

        let line = TrustLine {
            account_id,
            token,
            newly_created,
            created_at: Utc::now(),
        };
        self.store.put_trust_line(&line)?;

        tracing::info!(
            account_id = %account_id,
            token = %line.token,
            newly_created,
            "Trust line recorded"
        );

        Ok(line)
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: &Uuid) -> Result<ExchangeOrder> {
        self.store
            .get_order(order_id)?
            .ok_or_else(|| Error::NotFound("Order not found".to_string()))
    }

    /// All orders for an account
    pub fn list_orders(&self, account_id: &AccountId) -> Result<Vec<ExchangeOrder>> {
        self.store.list_orders(account_id)
    }
}
