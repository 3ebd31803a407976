//! High-level ledger API
//!
//! `Ledger` owns the storage, the single-writer actor, and the metrics
//! registry. All mutations funnel through the actor; reads go straight to
//! storage. Callers clone the handle freely.

use crate::{
    actor::{spawn_ledger_actor, BalanceOp, LedgerCommand, LedgerHandle, TransferOutcome},
    notify::{DepositNotice, DepositNotifier},
    numbering,
    types::{
        Account, AccountId, AccountType, EntryType, JournalEntry, RoutingInfo, TransferReceipt,
        VirtualAccount,
    },
    Config, Error, Metrics, Result, Storage,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The fiat ledger service
#[derive(Clone)]
pub struct Ledger {
    storage: Arc<Storage>,
    handle: LedgerHandle,
    metrics: Metrics,
    notifier: Arc<RwLock<Option<DepositNotifier>>>,
    config: Arc<Config>,
}

impl Ledger {
    /// Open the ledger: storage plus the writer actor
    pub fn open(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        let handle = spawn_ledger_actor(storage.clone(), config.clone());

        tracing::info!(service = %config.service_name, "Ledger started");

        Ok(Self {
            storage,
            handle,
            metrics,
            notifier: Arc::new(RwLock::new(None)),
            config,
        })
    }

    /// Subscribe to deposit notices for opted-in accounts
    ///
    /// Single-subscriber: a second call replaces nothing and errors.
    pub fn subscribe_deposits(&self) -> Result<mpsc::Receiver<DepositNotice>> {
        let mut guard = self.notifier.write();
        if guard.is_some() {
            return Err(Error::Conflict(
                "deposit notices already subscribed".to_string(),
            ));
        }
        let (notifier, rx) = DepositNotifier::channel(self.config.notify_capacity);
        *guard = Some(notifier);
        Ok(rx)
    }

    fn publish_notice(&self, notice: Option<DepositNotice>) {
        if let Some(notice) = notice {
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.publish(notice);
            }
        }
    }

    // Accounts

    /// Open a new account
    pub async fn open_account(
        &self,
        pin: String,
        holder: String,
        account_type: AccountType,
    ) -> Result<Account> {
        if pin.is_empty() || holder.is_empty() {
            return Err(Error::Validation("pin and holder are required".to_string()));
        }

        let account = self
            .handle
            .send(|tx| LedgerCommand::OpenAccount {
                pin,
                holder,
                account_type,
                response: tx,
            })
            .await?;

        self.metrics.record_account_opened();
        Ok(account)
    }

    /// Authenticate by routing tuple and PIN
    ///
    /// An unknown account and a wrong PIN return the same error.
    pub fn authenticate(
        &self,
        branch_code: &str,
        account_number: &str,
        pin: &str,
    ) -> Result<Account> {
        let account = self
            .storage
            .get_account_by_routing(branch_code, account_number)?
            .ok_or(Error::InvalidCredentials)?;

        if account.pin != pin {
            return Err(Error::InvalidCredentials);
        }

        Ok(account)
    }

    /// Get account by ID
    pub fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        self.storage
            .get_account(account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))
    }

    /// Resolve a routing tuple to its public identity
    ///
    /// Real accounts win over virtual aliases; inactive virtual accounts do
    /// not resolve.
    pub fn lookup_routing(&self, branch_code: &str, account_number: &str) -> Result<RoutingInfo> {
        if let Some(account) = self
            .storage
            .get_account_by_routing(branch_code, account_number)?
        {
            return Ok(RoutingInfo {
                holder: account.holder,
                bank_code: account.bank_code,
                branch_code: account.branch_code,
                account_number: account.account_number,
                is_virtual_account: false,
                parent_account_number: None,
                label: None,
            });
        }

        let va = self
            .storage
            .get_virtual_by_routing(branch_code, account_number)?
            .filter(|va| va.is_active)
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        Ok(RoutingInfo {
            holder: va.holder,
            bank_code: va.bank_code,
            branch_code: va.branch_code,
            account_number: va.account_number,
            is_virtual_account: true,
            parent_account_number: Some(va.parent_account_number),
            label: Some(va.label),
        })
    }

    /// Update holder name or the corporate pubsub flag
    pub async fn update_profile(
        &self,
        account_id: AccountId,
        holder: Option<String>,
        pubsub_enabled: Option<bool>,
    ) -> Result<Account> {
        self.handle
            .send(|tx| LedgerCommand::UpdateProfile {
                account_id,
                holder,
                pubsub_enabled,
                response: tx,
            })
            .await
    }

    /// Change PIN; the old PIN is re-verified inside the actor
    pub async fn change_pin(
        &self,
        account_id: AccountId,
        old_pin: String,
        new_pin: String,
    ) -> Result<()> {
        if new_pin.is_empty() {
            return Err(Error::Validation("new pin is required".to_string()));
        }

        self.handle
            .send(|tx| LedgerCommand::ChangePin {
                account_id,
                old_pin,
                new_pin,
                response: tx,
            })
            .await
    }

    // Cash-equivalent operations

    /// Credit cash into an account
    pub async fn deposit(&self, account_id: AccountId, amount: u64) -> Result<TransferReceipt> {
        self.mutate(
            account_id,
            BalanceOp::Credit(amount),
            EntryType::AtmIn,
            "ATM deposit".to_string(),
            None,
        )
        .await
    }

    /// Debit cash out of an account
    pub async fn withdraw(&self, account_id: AccountId, amount: u64) -> Result<TransferReceipt> {
        self.mutate(
            account_id,
            BalanceOp::Debit(amount),
            EntryType::AtmOut,
            "ATM withdrawal".to_string(),
            None,
        )
        .await
    }

    /// Credit with an explicit entry type; building block for exchange legs
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: u64,
        entry_type: EntryType,
        description: String,
        related_order_id: Option<String>,
    ) -> Result<TransferReceipt> {
        if !entry_type.is_credit() {
            return Err(Error::Validation(format!(
                "{} is not a credit entry type",
                entry_type
            )));
        }
        self.mutate(
            account_id,
            BalanceOp::Credit(amount),
            entry_type,
            description,
            related_order_id,
        )
        .await
    }

    /// Debit with an explicit entry type; building block for exchange legs
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: u64,
        entry_type: EntryType,
        description: String,
        related_order_id: Option<String>,
    ) -> Result<TransferReceipt> {
        if entry_type.is_credit() {
            return Err(Error::Validation(format!(
                "{} is not a debit entry type",
                entry_type
            )));
        }
        self.mutate(
            account_id,
            BalanceOp::Debit(amount),
            entry_type,
            description,
            related_order_id,
        )
        .await
    }

    async fn mutate(
        &self,
        account_id: AccountId,
        op: BalanceOp,
        entry_type: EntryType,
        description: String,
        related_order_id: Option<String>,
    ) -> Result<TransferReceipt> {
        let start = Instant::now();
        let result = self
            .handle
            .send(|tx| LedgerCommand::Mutate {
                account_id,
                op,
                entry_type,
                description,
                counterparty: None,
                related_order_id,
                response: tx,
            })
            .await;
        self.metrics
            .record_commit_duration(start.elapsed().as_secs_f64());

        if matches!(result, Err(Error::InsufficientBalance { .. })) {
            self.metrics.record_insufficient_balance();
        }
        result
    }

    // Transfers

    /// Atomic two-account transfer, optionally idempotent
    ///
    /// Destination may be a real account or an active virtual account; virtual
    /// destinations settle to the parent with the routed number carried on the
    /// receiver-side journal entry.
    pub async fn transfer(
        &self,
        from_account_id: AccountId,
        to_branch_code: String,
        to_account_number: String,
        amount: u64,
        idempotency_key: Option<String>,
    ) -> Result<TransferOutcome> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        let start = Instant::now();
        let result = self
            .handle
            .send(|tx| LedgerCommand::Transfer {
                from_account_id,
                to_branch_code,
                to_account_number,
                amount,
                idempotency_key,
                response: tx,
            })
            .await;
        self.metrics
            .record_commit_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                self.metrics.record_transfer(outcome.replayed);
                self.publish_notice(outcome.notice.clone());
                Ok(outcome)
            }
            Err(err) => {
                if matches!(err, Error::InsufficientBalance { .. }) {
                    self.metrics.record_insufficient_balance();
                }
                Err(err)
            }
        }
    }

    /// Apply a credit from an at-least-once event source, exactly once
    ///
    /// Returns `None` when the (event type, message id) pair was already
    /// applied. Errors mean the caller should nack for redelivery.
    pub async fn apply_deposit_event(
        &self,
        event_type: &str,
        message_id: &str,
        account_id: AccountId,
        amount: u64,
        description: String,
        reference: Option<String>,
    ) -> Result<Option<TransferReceipt>> {
        let event_type = event_type.to_string();
        let message_id = message_id.to_string();

        let result = self
            .handle
            .send(|tx| LedgerCommand::ApplyEventCredit {
                event_type,
                message_id,
                account_id,
                amount,
                description,
                reference,
                response: tx,
            })
            .await?;

        self.metrics.record_event_credit(result.is_some());
        Ok(result)
    }

    // Journal

    /// Transaction history, newest first, paginated by sequence number
    pub fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        before_seq: Option<u64>,
    ) -> Result<Vec<JournalEntry>> {
        self.storage.list_journal(account_id, limit, before_seq)
    }

    /// Audit: replay the journal and check it against the account document
    ///
    /// Verifies the balance equals the signed sum of all entries and the
    /// sequence numbers run 1..=transaction_sequence without gaps.
    pub fn verify_account(&self, account_id: &AccountId) -> Result<()> {
        let account = self.get_account(account_id)?;
        let entries = self.storage.scan_journal(account_id)?;

        let mut balance: u64 = 0;
        for (i, entry) in entries.iter().enumerate() {
            let expected_seq = (i as u64) + 1;
            if entry.sequence_number != expected_seq {
                return Err(Error::Storage(format!(
                    "journal gap for {}: expected sequence {}, found {}",
                    account_id, expected_seq, entry.sequence_number
                )));
            }
            balance = if entry.entry_type.is_credit() {
                balance.checked_add(entry.amount).ok_or_else(|| {
                    Error::Storage(format!(
                        "journal for {} overflows balance at sequence {}",
                        account_id, entry.sequence_number
                    ))
                })?
            } else {
                balance.checked_sub(entry.amount).ok_or_else(|| {
                    Error::Storage(format!(
                        "journal for {} drives balance negative at sequence {}",
                        account_id, entry.sequence_number
                    ))
                })?
            };
            if balance != entry.balance {
                return Err(Error::Storage(format!(
                    "journal balance mismatch for {} at sequence {}: replayed {}, recorded {}",
                    account_id, entry.sequence_number, balance, entry.balance
                )));
            }
        }

        if entries.len() as u64 != account.transaction_sequence {
            return Err(Error::Storage(format!(
                "journal length mismatch for {}: {} entries, sequence {}",
                account_id,
                entries.len(),
                account.transaction_sequence
            )));
        }

        if balance != account.balance {
            return Err(Error::Storage(format!(
                "balance mismatch for {}: journal {}, account {}",
                account_id, balance, account.balance
            )));
        }

        Ok(())
    }

    // Virtual accounts

    /// Create a virtual sub-account under a corporate parent
    pub async fn create_virtual_account(
        &self,
        parent_account_id: AccountId,
        label: String,
    ) -> Result<VirtualAccount> {
        if label.is_empty() {
            return Err(Error::Validation("label is required".to_string()));
        }

        self.handle
            .send(|tx| LedgerCommand::CreateVirtualAccount {
                parent_account_id,
                label,
                response: tx,
            })
            .await
    }

    /// Update a virtual account's label or active flag
    pub async fn update_virtual_account(
        &self,
        virtual_account_id: Uuid,
        label: Option<String>,
        is_active: Option<bool>,
    ) -> Result<VirtualAccount> {
        self.handle
            .send(|tx| LedgerCommand::UpdateVirtualAccount {
                virtual_account_id,
                label,
                is_active,
                response: tx,
            })
            .await
    }

    /// Get a virtual account by ID
    pub fn get_virtual_account(&self, virtual_account_id: &Uuid) -> Result<VirtualAccount> {
        self.storage
            .get_virtual_account(virtual_account_id)?
            .ok_or_else(|| Error::NotFound("Virtual account not found".to_string()))
    }

    /// List virtual accounts owned by a parent
    pub fn list_virtual_accounts(&self, parent: &AccountId) -> Result<Vec<VirtualAccount>> {
        self.storage.list_virtual_accounts(parent)
    }

    // Allocators

    /// Allocate the next value from an unbounded named counter
    pub async fn allocate_index(&self, counter: &str) -> Result<u64> {
        let counter = counter.to_string();
        self.handle
            .send(|tx| LedgerCommand::Allocate {
                counter,
                max: None,
                response: tx,
            })
            .await
    }

    /// Counter name for wallet derivation indices
    pub fn wallet_index_counter() -> &'static str {
        numbering::WALLET_INDEX_COUNTER
    }

    /// Metrics registry
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown the writer actor
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn authenticate_hides_which_factor_failed() {
        let (ledger, _dir) = open_test_ledger().await;
        let account = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();

        assert!(ledger
            .authenticate(&account.branch_code, &account.account_number, "1234")
            .is_ok());

        let wrong_pin = ledger
            .authenticate(&account.branch_code, &account.account_number, "0000")
            .unwrap_err();
        let no_account = ledger
            .authenticate(&account.branch_code, "9999999", "1234")
            .unwrap_err();

        assert_eq!(wrong_pin.to_string(), no_account.to_string());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn deposit_withdraw_journal_and_verify() {
        let (ledger, _dir) = open_test_ledger().await;
        let account = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();

        ledger.deposit(account.account_id, 10_000).await.unwrap();
        let receipt = ledger.withdraw(account.account_id, 4_000).await.unwrap();
        assert_eq!(receipt.balance, 6_000);

        let history = ledger
            .list_transactions(&account.account_id, 10, None)
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entry_type, EntryType::AtmOut);
        assert_eq!(history[0].sequence_number, 2);
        assert_eq!(history[1].entry_type, EntryType::AtmIn);
        assert_eq!(history[1].sequence_number, 1);

        ledger.verify_account(&account.account_id).unwrap();

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn routing_prefers_real_accounts_and_skips_inactive_virtuals() {
        let (ledger, _dir) = open_test_ledger().await;
        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();

        let va = ledger
            .create_virtual_account(corp.account_id, "order-77".into())
            .await
            .unwrap();

        let info = ledger
            .lookup_routing(&va.branch_code, &va.account_number)
            .unwrap();
        assert!(info.is_virtual_account);
        assert_eq!(info.parent_account_number, Some(corp.account_number.clone()));
        assert_eq!(info.label, Some("order-77".to_string()));

        let direct = ledger
            .lookup_routing(&corp.branch_code, &corp.account_number)
            .unwrap();
        assert!(!direct.is_virtual_account);

        ledger
            .update_virtual_account(va.virtual_account_id, None, Some(false))
            .await
            .unwrap();
        assert!(ledger
            .lookup_routing(&va.branch_code, &va.account_number)
            .is_err());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn pubsub_flag_is_corporate_only() {
        let (ledger, _dir) = open_test_ledger().await;
        let personal = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();

        let err = ledger
            .update_profile(personal.account_id, None, Some(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();
        let updated = ledger
            .update_profile(corp.account_id, None, Some(true))
            .await
            .unwrap();
        assert!(updated.pubsub_enabled);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn deposit_notice_published_for_opted_in_destination() {
        let (ledger, _dir) = open_test_ledger().await;
        let mut notices = ledger.subscribe_deposits().unwrap();
        assert!(ledger.subscribe_deposits().is_err());

        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();
        ledger
            .update_profile(corp.account_id, None, Some(true))
            .await
            .unwrap();
        let va = ledger
            .create_virtual_account(corp.account_id, "order-1".into())
            .await
            .unwrap();

        let payer = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        ledger.deposit(payer.account_id, 5_000).await.unwrap();

        ledger
            .transfer(
                payer.account_id,
                va.branch_code.clone(),
                va.account_number.clone(),
                2_000,
                None,
            )
            .await
            .unwrap();

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.to_account_id, corp.account_id);
        assert_eq!(notice.amount, 2_000);
        assert_eq!(notice.virtual_account_number, Some(va.account_number));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn credit_overflow_is_rejected_without_state_change() {
        let (ledger, _dir) = open_test_ledger().await;
        let account = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        let payer = ledger
            .open_account("1234".into(), "Bob".into(), AccountType::Personal)
            .await
            .unwrap();

        ledger.deposit(account.account_id, u64::MAX).await.unwrap();
        ledger.deposit(payer.account_id, 100).await.unwrap();

        // A further deposit would overflow: rejected, nothing staged.
        let err = ledger.deposit(account.account_id, 1).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Same on the transfer receiver side; the sender keeps its funds.
        let err = ledger
            .transfer(
                payer.account_id,
                account.branch_code.clone(),
                account.account_number.clone(),
                50,
                Some("ovf-1".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(ledger.get_account(&payer.account_id).unwrap().balance, 100);

        // And on the event-credit path; the dedup key stays unclaimed.
        let err = ledger
            .apply_deposit_event(
                "bank-deposit",
                "m-ovf",
                account.account_id,
                1,
                "Bank deposit".to_string(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // The writer keeps serving and both accounts still audit clean.
        assert_eq!(
            ledger.get_account(&account.account_id).unwrap().balance,
            u64::MAX
        );
        ledger.verify_account(&account.account_id).unwrap();
        ledger.verify_account(&payer.account_id).unwrap();
        ledger.withdraw(account.account_id, 1).await.unwrap();

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn change_pin_requires_old_pin() {
        let (ledger, _dir) = open_test_ledger().await;
        let account = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();

        let err = ledger
            .change_pin(account.account_id, "0000".into(), "5678".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        ledger
            .change_pin(account.account_id, "1234".into(), "5678".into())
            .await
            .unwrap();
        assert!(ledger
            .authenticate(&account.branch_code, &account.account_number, "5678")
            .is_ok());

        ledger.shutdown().await.unwrap();
    }
}
