//! Deposit notifications for opted-in corporate accounts
//!
//! Delivery is best-effort: notices ride a bounded channel and a full or
//! closed channel never fails the transfer that produced them.

use crate::types::AccountId;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Notice published after an inbound credit to an opted-in account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositNotice {
    /// Journal transaction ID of the sender-side entry
    pub transaction_id: Uuid,

    /// Credited account
    pub to_account_id: AccountId,

    /// Amount credited
    pub amount: u64,

    /// Virtual account number the credit was routed through, if any
    pub virtual_account_number: Option<String>,
}

/// Publisher half held by the ledger
pub struct DepositNotifier {
    sender: mpsc::Sender<DepositNotice>,
}

impl DepositNotifier {
    /// Create a notifier and its subscriber half
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DepositNotice>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { sender: tx }, rx)
    }

    /// Publish without blocking; drops are logged, never surfaced
    pub fn publish(&self, notice: DepositNotice) {
        if let Err(err) = self.sender.try_send(notice) {
            tracing::warn!(error = %err, "Deposit notice dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_non_blocking_when_full() {
        let (notifier, mut rx) = DepositNotifier::channel(1);

        let notice = DepositNotice {
            transaction_id: Uuid::now_v7(),
            to_account_id: AccountId::generate(),
            amount: 100,
            virtual_account_number: None,
        };

        notifier.publish(notice.clone());
        notifier.publish(notice.clone()); // dropped, no panic, no block

        assert_eq!(rx.recv().await, Some(notice));
        assert!(rx.try_recv().is_err());
    }
}
