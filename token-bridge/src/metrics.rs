//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `bridge_orders_completed_total` - Exchange orders completed
//! - `bridge_orders_failed_total` - Exchange orders failed
//! - `bridge_deposits_applied_total` - Inbound deposits applied
//! - `bridge_deposits_skipped_total` - Inbound deposits filtered out
//! - `bridge_duplicates_total` - Duplicate event deliveries skipped
//! - `bridge_withdrawals_total` - Withdrawals submitted
//! - `bridge_reconciliation_items_total` - Dead-letter items recorded

use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct BridgeMetrics {
    /// Exchange orders completed
    pub orders_completed: IntCounter,

    /// Exchange orders failed
    pub orders_failed: IntCounter,

    /// Inbound deposits applied
    pub deposits_applied: IntCounter,

    /// Inbound deposits filtered out
    pub deposits_skipped: IntCounter,

    /// Duplicate event deliveries skipped
    pub duplicates: IntCounter,

    /// Withdrawals submitted
    pub withdrawals: IntCounter,

    /// Dead-letter items recorded
    pub reconciliation_items: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl BridgeMetrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let orders_completed =
            IntCounter::new("bridge_orders_completed_total", "Exchange orders completed")?;
        registry.register(Box::new(orders_completed.clone()))?;

        let orders_failed =
            IntCounter::new("bridge_orders_failed_total", "Exchange orders failed")?;
        registry.register(Box::new(orders_failed.clone()))?;

        let deposits_applied =
            IntCounter::new("bridge_deposits_applied_total", "Inbound deposits applied")?;
        registry.register(Box::new(deposits_applied.clone()))?;

        let deposits_skipped = IntCounter::new(
            "bridge_deposits_skipped_total",
            "Inbound deposits filtered out",
        )?;
        registry.register(Box::new(deposits_skipped.clone()))?;

        let duplicates = IntCounter::new(
            "bridge_duplicates_total",
            "Duplicate event deliveries skipped",
        )?;
        registry.register(Box::new(duplicates.clone()))?;

        let withdrawals =
            IntCounter::new("bridge_withdrawals_total", "Withdrawals submitted")?;
        registry.register(Box::new(withdrawals.clone()))?;

        let reconciliation_items = IntCounter::new(
            "bridge_reconciliation_items_total",
            "Dead-letter items recorded",
        )?;
        registry.register(Box::new(reconciliation_items.clone()))?;

        Ok(Self {
            orders_completed,
            orders_failed,
            deposits_applied,
            deposits_skipped,
            duplicates,
            withdrawals,
            reconciliation_items,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
