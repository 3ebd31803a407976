//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_accounts_opened_total` - Accounts opened
//! - `ledger_transfers_total` - Transfers committed
//! - `ledger_transfers_replayed_total` - Transfers answered from an idempotency record
//! - `ledger_event_credits_total` - External event credits applied
//! - `ledger_event_duplicates_total` - Duplicate event deliveries skipped
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies
//! - `ledger_insufficient_balance_total` - Debits rejected for insufficient funds

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accounts opened
    pub accounts_opened: IntCounter,

    /// Transfers committed
    pub transfers_total: IntCounter,

    /// Transfers answered from an idempotency record
    pub transfers_replayed: IntCounter,

    /// External event credits applied
    pub event_credits: IntCounter,

    /// Duplicate event deliveries skipped
    pub event_duplicates: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Debits rejected for insufficient funds
    pub insufficient_balance: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts_opened =
            IntCounter::new("ledger_accounts_opened_total", "Accounts opened")?;
        registry.register(Box::new(accounts_opened.clone()))?;

        let transfers_total =
            IntCounter::new("ledger_transfers_total", "Transfers committed")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfers_replayed = IntCounter::new(
            "ledger_transfers_replayed_total",
            "Transfers answered from an idempotency record",
        )?;
        registry.register(Box::new(transfers_replayed.clone()))?;

        let event_credits = IntCounter::new(
            "ledger_event_credits_total",
            "External event credits applied",
        )?;
        registry.register(Box::new(event_credits.clone()))?;

        let event_duplicates = IntCounter::new(
            "ledger_event_duplicates_total",
            "Duplicate event deliveries skipped",
        )?;
        registry.register(Box::new(event_duplicates.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let insufficient_balance = IntCounter::new(
            "ledger_insufficient_balance_total",
            "Debits rejected for insufficient funds",
        )?;
        registry.register(Box::new(insufficient_balance.clone()))?;

        Ok(Self {
            accounts_opened,
            transfers_total,
            transfers_replayed,
            event_credits,
            event_duplicates,
            commit_duration,
            insufficient_balance,
            registry,
        })
    }

    /// Record an opened account
    pub fn record_account_opened(&self) {
        self.accounts_opened.inc();
    }

    /// Record a committed transfer
    pub fn record_transfer(&self, replayed: bool) {
        if replayed {
            self.transfers_replayed.inc();
        } else {
            self.transfers_total.inc();
        }
    }

    /// Record an external event credit outcome
    pub fn record_event_credit(&self, applied: bool) {
        if applied {
            self.event_credits.inc();
        } else {
            self.event_duplicates.inc();
        }
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a rejected debit
    pub fn record_insufficient_balance(&self) {
        self.insufficient_balance.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transfers_total.get(), 0);
        assert_eq!(metrics.accounts_opened.get(), 0);

        // A second instance must not collide with the first
        let _other = Metrics::new().unwrap();
    }

    #[test]
    fn test_record_transfer() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transfer(false);
        metrics.record_transfer(false);
        metrics.record_transfer(true);
        assert_eq!(metrics.transfers_total.get(), 2);
        assert_eq!(metrics.transfers_replayed.get(), 1);
    }

    #[test]
    fn test_record_event_credit() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event_credit(true);
        metrics.record_event_credit(false);
        assert_eq!(metrics.event_credits.get(), 1);
        assert_eq!(metrics.event_duplicates.get(), 1);
    }
}
