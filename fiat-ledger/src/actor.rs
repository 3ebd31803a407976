//! Single-writer actor executing ledger transactions
//!
//! Every mutating operation is a message to one actor task. The actor reads
//! the affected documents, validates, stages all writes into a `WriteBatch`,
//! and commits it atomically. Single-writer execution serializes these
//! read-validate-write cycles, so two mutations touching the same account can
//! never interleave; one always observes the other's committed state.
//!
//! Pre-checks done by callers outside the actor are fast-rejects only; the
//! command handlers here re-validate everything from scratch and are the sole
//! authority.

use crate::{
    notify::DepositNotice,
    numbering,
    types::{
        Account, AccountId, AccountType, Counterparty, IdempotencyRecord, JournalEntry,
        TransferReceipt, VirtualAccount,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rocksdb::WriteBatch;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Direction of a single-account balance mutation
#[derive(Debug, Clone, Copy)]
pub enum BalanceOp {
    /// Add to the balance
    Credit(u64),
    /// Subtract from the balance; fails on insufficient funds
    Debit(u64),
}

impl BalanceOp {
    fn amount(&self) -> u64 {
        match self {
            BalanceOp::Credit(v) | BalanceOp::Debit(v) => *v,
        }
    }
}

/// Outcome of a transfer command
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Sender-side receipt (balance + transaction id)
    pub receipt: TransferReceipt,
    /// True when an idempotency key short-circuited re-execution
    pub replayed: bool,
    /// Deposit notice to publish, when the destination opted in
    pub notice: Option<DepositNotice>,
}

/// Message sent to the ledger actor
pub enum LedgerCommand {
    /// Open a new account, allocating its number
    OpenAccount {
        /// Secret PIN
        pin: String,
        /// Holder display name
        holder: String,
        /// Personal or corporate
        account_type: AccountType,
        /// Response channel
        response: oneshot::Sender<Result<Account>>,
    },

    /// Single-account atomic balance mutation plus journal entry
    Mutate {
        /// Account to mutate
        account_id: AccountId,
        /// Credit or debit
        op: BalanceOp,
        /// Journal entry type
        entry_type: crate::types::EntryType,
        /// Journal entry description
        description: String,
        /// Optional counterparty reference
        counterparty: Option<Counterparty>,
        /// Optional order correlation id
        related_order_id: Option<String>,
        /// Response channel
        response: oneshot::Sender<Result<TransferReceipt>>,
    },

    /// Two-account atomic transfer with optional idempotency key
    Transfer {
        /// Source account
        from_account_id: AccountId,
        /// Destination branch code
        to_branch_code: String,
        /// Destination account number (real or virtual)
        to_account_number: String,
        /// Amount in integral units
        amount: u64,
        /// Caller-supplied idempotency key
        idempotency_key: Option<String>,
        /// Response channel
        response: oneshot::Sender<Result<TransferOutcome>>,
    },

    /// Idempotency-guarded credit for an at-least-once event source
    ApplyEventCredit {
        /// Event type namespace (e.g. "bank-deposit")
        event_type: String,
        /// Delivery-system message id
        message_id: String,
        /// Account to credit
        account_id: AccountId,
        /// Amount in integral units
        amount: u64,
        /// Journal entry description
        description: String,
        /// Upstream reference (e.g. originating transaction id)
        reference: Option<String>,
        /// Response channel; `None` means duplicate, nothing applied
        response: oneshot::Sender<Result<Option<TransferReceipt>>>,
    },

    /// Create a virtual sub-account under a corporate parent
    CreateVirtualAccount {
        /// Parent account
        parent_account_id: AccountId,
        /// Caller-supplied label
        label: String,
        /// Response channel
        response: oneshot::Sender<Result<VirtualAccount>>,
    },

    /// Update a virtual account's label or active flag
    UpdateVirtualAccount {
        /// Virtual account to update
        virtual_account_id: Uuid,
        /// New label, if changing
        label: Option<String>,
        /// New active flag, if changing
        is_active: Option<bool>,
        /// Response channel
        response: oneshot::Sender<Result<VirtualAccount>>,
    },

    /// Metadata-only account update; no journal entry
    UpdateProfile {
        /// Account to update
        account_id: AccountId,
        /// New holder name, if changing
        holder: Option<String>,
        /// New pubsub flag, if changing (corporate only)
        pubsub_enabled: Option<bool>,
        /// Response channel
        response: oneshot::Sender<Result<Account>>,
    },

    /// Change PIN after re-verifying the old one
    ChangePin {
        /// Account to update
        account_id: AccountId,
        /// Current PIN
        old_pin: String,
        /// New PIN
        new_pin: String,
        /// Response channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Allocate the next value from a named counter
    Allocate {
        /// Counter namespace
        counter: String,
        /// Inclusive upper bound, if bounded
        max: Option<u64>,
        /// Response channel
        response: oneshot::Sender<Result<u64>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that executes ledger commands serially
pub struct LedgerActor {
    storage: Arc<Storage>,
    config: Arc<Config>,
    mailbox: mpsc::Receiver<LedgerCommand>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        config: Arc<Config>,
        mailbox: mpsc::Receiver<LedgerCommand>,
    ) -> Self {
        Self {
            storage,
            config,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(cmd) = self.mailbox.recv().await {
            match cmd {
                LedgerCommand::Shutdown => break,

                LedgerCommand::OpenAccount {
                    pin,
                    holder,
                    account_type,
                    response,
                } => {
                    let _ = response.send(self.open_account(pin, holder, account_type));
                }

                LedgerCommand::Mutate {
                    account_id,
                    op,
                    entry_type,
                    description,
                    counterparty,
                    related_order_id,
                    response,
                } => {
                    let _ = response.send(self.mutate_balance(
                        account_id,
                        op,
                        entry_type,
                        description,
                        counterparty,
                        related_order_id,
                    ));
                }

                LedgerCommand::Transfer {
                    from_account_id,
                    to_branch_code,
                    to_account_number,
                    amount,
                    idempotency_key,
                    response,
                } => {
                    let _ = response.send(self.transfer(
                        from_account_id,
                        &to_branch_code,
                        &to_account_number,
                        amount,
                        idempotency_key,
                    ));
                }

                LedgerCommand::ApplyEventCredit {
                    event_type,
                    message_id,
                    account_id,
                    amount,
                    description,
                    reference,
                    response,
                } => {
                    let _ = response.send(self.apply_event_credit(
                        &event_type,
                        &message_id,
                        account_id,
                        amount,
                        description,
                        reference,
                    ));
                }

                LedgerCommand::CreateVirtualAccount {
                    parent_account_id,
                    label,
                    response,
                } => {
                    let _ = response.send(self.create_virtual_account(parent_account_id, label));
                }

                LedgerCommand::UpdateVirtualAccount {
                    virtual_account_id,
                    label,
                    is_active,
                    response,
                } => {
                    let _ = response.send(self.update_virtual_account(
                        virtual_account_id,
                        label,
                        is_active,
                    ));
                }

                LedgerCommand::UpdateProfile {
                    account_id,
                    holder,
                    pubsub_enabled,
                    response,
                } => {
                    let _ = response.send(self.update_profile(account_id, holder, pubsub_enabled));
                }

                LedgerCommand::ChangePin {
                    account_id,
                    old_pin,
                    new_pin,
                    response,
                } => {
                    let _ = response.send(self.change_pin(account_id, &old_pin, &new_pin));
                }

                LedgerCommand::Allocate {
                    counter,
                    max,
                    response,
                } => {
                    let _ = response.send(self.allocate(&counter, max));
                }
            }
        }
    }

    /// Allocate `current + 1` from a named counter, atomically
    ///
    /// No two callers can observe the same value: the actor serializes all
    /// allocations and the counter write commits with the caller's batch or
    /// standalone here.
    fn allocate(&self, counter: &str, max: Option<u64>) -> Result<u64> {
        let mut batch = WriteBatch::default();
        let next = self.stage_allocation(&mut batch, counter, max)?;
        self.storage.commit(batch)?;
        Ok(next)
    }

    fn stage_allocation(&self, batch: &mut WriteBatch, counter: &str, max: Option<u64>) -> Result<u64> {
        let current = self.storage.get_counter(counter)?.unwrap_or(0);
        let next = current + 1;
        if let Some(max) = max {
            if next > max {
                return Err(Error::RangeExceeded(format!("{counter} range exceeded")));
            }
        }
        self.storage.stage_counter(batch, counter, next)?;
        Ok(next)
    }

    fn open_account(
        &self,
        pin: String,
        holder: String,
        account_type: AccountType,
    ) -> Result<Account> {
        let bank = &self.config.bank;
        let mut batch = WriteBatch::default();

        // Number allocation is part of the same transaction: exhaustion
        // fails here and no account document is ever staged.
        let (branch_code, account_number) = match account_type {
            AccountType::Personal => {
                let seq = self.stage_allocation(&mut batch, numbering::PERSONAL_COUNTER, None)?;
                (bank.personal_branch_code.clone(), numbering::personal_number(seq))
            }
            AccountType::Corporate => {
                let seq = self.stage_allocation(
                    &mut batch,
                    numbering::CORPORATE_COUNTER,
                    Some(numbering::CORPORATE_MAX),
                )?;
                (bank.corporate_branch_code.clone(), numbering::corporate_number(seq))
            }
        };

        let now = Utc::now();
        let account = Account {
            account_id: AccountId::generate(),
            account_number,
            account_type,
            holder,
            bank_code: bank.bank_code.clone(),
            branch_code,
            balance: 0,
            transaction_sequence: 0,
            pin,
            pubsub_enabled: false,
            created_at: now,
            updated_at: now,
        };

        self.storage.stage_account(&mut batch, &account)?;
        self.storage.commit(batch)?;

        tracing::info!(
            account_id = %account.account_id,
            account_number = %account.account_number,
            account_type = %account.account_type,
            "Account opened"
        );

        Ok(account)
    }

    /// The only sanctioned way to change a balance: new balance, bumped
    /// sequence, and one journal entry commit together.
    fn mutate_balance(
        &self,
        account_id: AccountId,
        op: BalanceOp,
        entry_type: crate::types::EntryType,
        description: String,
        counterparty: Option<Counterparty>,
        related_order_id: Option<String>,
    ) -> Result<TransferReceipt> {
        if op.amount() == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        let mut account = self
            .storage
            .get_account(&account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        let new_balance = match op {
            BalanceOp::Credit(amount) => account
                .balance
                .checked_add(amount)
                .ok_or_else(|| Error::Validation("credit would overflow balance".to_string()))?,
            BalanceOp::Debit(amount) => {
                if account.balance < amount {
                    return Err(Error::InsufficientBalance {
                        available: account.balance,
                        requested: amount,
                    });
                }
                account.balance - amount
            }
        };

        let new_seq = account.transaction_sequence + 1;
        let now = Utc::now();

        account.balance = new_balance;
        account.transaction_sequence = new_seq;
        account.updated_at = now;

        let entry = JournalEntry {
            transaction_id: Uuid::now_v7(),
            account_id,
            entry_type,
            amount: op.amount(),
            balance: new_balance,
            counterparty,
            sequence_number: new_seq,
            description,
            virtual_account_number: None,
            virtual_account_label: None,
            related_order_id,
            created_at: now,
        };

        let mut batch = WriteBatch::default();
        self.storage.stage_account(&mut batch, &account)?;
        self.storage.stage_journal_entry(&mut batch, &entry)?;
        self.storage.commit(batch)?;

        tracing::debug!(
            account_id = %account_id,
            entry_type = %entry.entry_type,
            amount = entry.amount,
            balance = new_balance,
            sequence = new_seq,
            "Balance mutated"
        );

        Ok(TransferReceipt {
            balance: new_balance,
            transaction_id: entry.transaction_id,
        })
    }

    fn transfer(
        &self,
        from_account_id: AccountId,
        to_branch_code: &str,
        to_account_number: &str,
        amount: u64,
        idempotency_key: Option<String>,
    ) -> Result<TransferOutcome> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        // Idempotent replay: answer with the stored result, touch nothing.
        let claim_key = idempotency_key.as_deref().map(|k| format!("transfer_{k}"));
        if let Some(ref key) = claim_key {
            if let Some(record) = self.storage.get_idempotency(key)? {
                let receipt = record.receipt.ok_or_else(|| {
                    Error::Storage(format!("idempotency record {key} has no result"))
                })?;
                return Ok(TransferOutcome {
                    receipt,
                    replayed: true,
                    notice: None,
                });
            }
        }

        // Destination resolution: real account first, then active virtual
        // alias settling to its parent.
        let mut via_virtual: Option<(String, String)> = None;
        let to_account = match self
            .storage
            .get_account_by_routing(to_branch_code, to_account_number)?
        {
            Some(account) => account,
            None => {
                let va = self
                    .storage
                    .get_virtual_by_routing(to_branch_code, to_account_number)?
                    .filter(|va| va.is_active)
                    .ok_or_else(|| {
                        Error::Validation("destination account not found".to_string())
                    })?;
                let parent = self
                    .storage
                    .get_account(&va.parent_account_id)?
                    .ok_or_else(|| {
                        Error::Validation("destination account not found".to_string())
                    })?;
                via_virtual = Some((va.account_number, va.label));
                parent
            }
        };

        if from_account_id == to_account.account_id {
            return Err(Error::Validation(
                "cannot transfer to the same account".to_string(),
            ));
        }

        let mut from_account = self
            .storage
            .get_account(&from_account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;
        let mut to_account = to_account;

        if from_account.balance < amount {
            return Err(Error::InsufficientBalance {
                available: from_account.balance,
                requested: amount,
            });
        }

        let receiver_balance = to_account
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::Validation("credit would overflow balance".to_string()))?;

        let now = Utc::now();

        let sender_balance = from_account.balance - amount;
        let sender_seq = from_account.transaction_sequence + 1;
        from_account.balance = sender_balance;
        from_account.transaction_sequence = sender_seq;
        from_account.updated_at = now;

        let receiver_seq = to_account.transaction_sequence + 1;
        to_account.balance = receiver_balance;
        to_account.transaction_sequence = receiver_seq;
        to_account.updated_at = now;

        let sender_entry = JournalEntry {
            transaction_id: Uuid::now_v7(),
            account_id: from_account_id,
            entry_type: crate::types::EntryType::TransferOut,
            amount,
            balance: sender_balance,
            counterparty: Some(to_account.counterparty()),
            sequence_number: sender_seq,
            description: format!("Transfer to {}", to_account.holder),
            virtual_account_number: None,
            virtual_account_label: None,
            related_order_id: None,
            created_at: now,
        };

        let (va_number, va_label) = match via_virtual {
            Some((number, label)) => (Some(number), Some(label)),
            None => (None, None),
        };

        let receiver_entry = JournalEntry {
            transaction_id: Uuid::now_v7(),
            account_id: to_account.account_id,
            entry_type: crate::types::EntryType::TransferIn,
            amount,
            balance: receiver_balance,
            counterparty: Some(from_account.counterparty()),
            sequence_number: receiver_seq,
            description: format!("Transfer from {}", from_account.holder),
            virtual_account_number: va_number.clone(),
            virtual_account_label: va_label,
            related_order_id: None,
            created_at: now,
        };

        let receipt = TransferReceipt {
            balance: sender_balance,
            transaction_id: sender_entry.transaction_id,
        };

        let mut batch = WriteBatch::default();
        self.storage.stage_account(&mut batch, &from_account)?;
        self.storage.stage_account(&mut batch, &to_account)?;
        self.storage.stage_journal_entry(&mut batch, &sender_entry)?;
        self.storage.stage_journal_entry(&mut batch, &receiver_entry)?;

        // The idempotency claim commits in the same batch as the balance
        // mutation: a crash leaves either both or neither, so a retry with
        // the same key can never re-execute a committed transfer.
        if let Some(key) = claim_key {
            let record = IdempotencyRecord {
                key,
                receipt: Some(receipt),
                processed_at: now,
            };
            self.storage.stage_idempotency(&mut batch, &record)?;
        }

        self.storage.commit(batch)?;

        tracing::info!(
            from = %from_account_id,
            to = %to_account.account_id,
            amount,
            transaction_id = %receipt.transaction_id,
            "Transfer committed"
        );

        let notice = if to_account.pubsub_enabled {
            Some(DepositNotice {
                transaction_id: receipt.transaction_id,
                to_account_id: to_account.account_id,
                amount,
                virtual_account_number: va_number,
            })
        } else {
            None
        };

        Ok(TransferOutcome {
            receipt,
            replayed: false,
            notice,
        })
    }

    /// Dedup claim and credit commit in one batch; duplicates apply nothing
    fn apply_event_credit(
        &self,
        event_type: &str,
        message_id: &str,
        account_id: AccountId,
        amount: u64,
        description: String,
        reference: Option<String>,
    ) -> Result<Option<TransferReceipt>> {
        if amount == 0 {
            return Err(Error::Validation("amount must be positive".to_string()));
        }

        let key = format!("{event_type}_{message_id}");
        if self.storage.get_idempotency(&key)?.is_some() {
            tracing::debug!(key = %key, "Duplicate event delivery skipped");
            return Ok(None);
        }

        let mut account = self
            .storage
            .get_account(&account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        let now = Utc::now();
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::Validation("credit would overflow balance".to_string()))?;
        let new_seq = account.transaction_sequence + 1;
        account.balance = new_balance;
        account.transaction_sequence = new_seq;
        account.updated_at = now;

        let entry = JournalEntry {
            transaction_id: Uuid::now_v7(),
            account_id,
            entry_type: crate::types::EntryType::Deposit,
            amount,
            balance: new_balance,
            counterparty: None,
            sequence_number: new_seq,
            description,
            virtual_account_number: None,
            virtual_account_label: None,
            related_order_id: reference,
            created_at: now,
        };

        let receipt = TransferReceipt {
            balance: new_balance,
            transaction_id: entry.transaction_id,
        };

        let record = IdempotencyRecord {
            key,
            receipt: Some(receipt),
            processed_at: now,
        };

        let mut batch = WriteBatch::default();
        self.storage.stage_account(&mut batch, &account)?;
        self.storage.stage_journal_entry(&mut batch, &entry)?;
        self.storage.stage_idempotency(&mut batch, &record)?;
        self.storage.commit(batch)?;

        tracing::info!(
            account_id = %account_id,
            amount,
            event_type,
            message_id,
            "External deposit credited"
        );

        Ok(Some(receipt))
    }

    fn create_virtual_account(
        &self,
        parent_account_id: AccountId,
        label: String,
    ) -> Result<VirtualAccount> {
        let parent = self
            .storage
            .get_account(&parent_account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        if parent.account_type != AccountType::Corporate {
            return Err(Error::Validation(
                "only corporate accounts can create virtual accounts".to_string(),
            ));
        }

        let prefix = numbering::corporate_prefix(&parent.account_number).to_string();
        let mut batch = WriteBatch::default();
        let seq = self.stage_allocation(
            &mut batch,
            &numbering::virtual_counter(&prefix),
            Some(numbering::VIRTUAL_MAX_PER_PREFIX),
        )?;

        let now = Utc::now();
        let va = VirtualAccount {
            virtual_account_id: Uuid::now_v7(),
            account_number: numbering::virtual_number(&prefix, seq),
            bank_code: parent.bank_code.clone(),
            branch_code: parent.branch_code.clone(),
            holder: parent.holder.clone(),
            parent_account_id,
            parent_account_number: parent.account_number.clone(),
            label,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.storage.stage_virtual_account(&mut batch, &va)?;
        self.storage.commit(batch)?;

        tracing::info!(
            virtual_account_id = %va.virtual_account_id,
            account_number = %va.account_number,
            parent = %parent_account_id,
            "Virtual account created"
        );

        Ok(va)
    }

    fn update_virtual_account(
        &self,
        virtual_account_id: Uuid,
        label: Option<String>,
        is_active: Option<bool>,
    ) -> Result<VirtualAccount> {
        let mut va = self
            .storage
            .get_virtual_account(&virtual_account_id)?
            .ok_or_else(|| Error::NotFound("Virtual account not found".to_string()))?;

        if let Some(label) = label {
            va.label = label;
        }
        if let Some(active) = is_active {
            va.is_active = active;
        }
        va.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_virtual_account(&mut batch, &va)?;
        self.storage.commit(batch)?;

        Ok(va)
    }

    fn update_profile(
        &self,
        account_id: AccountId,
        holder: Option<String>,
        pubsub_enabled: Option<bool>,
    ) -> Result<Account> {
        let mut account = self
            .storage
            .get_account(&account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        // Defensive re-check: the flag is corporate-only.
        if pubsub_enabled == Some(true) && account.account_type != AccountType::Corporate {
            return Err(Error::Validation(
                "pubsub notifications are corporate-only".to_string(),
            ));
        }

        if let Some(holder) = holder {
            account.holder = holder;
        }
        if let Some(enabled) = pubsub_enabled {
            account.pubsub_enabled = enabled;
        }
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_account(&mut batch, &account)?;
        self.storage.commit(batch)?;

        Ok(account)
    }

    fn change_pin(&self, account_id: AccountId, old_pin: &str, new_pin: &str) -> Result<()> {
        let mut account = self
            .storage
            .get_account(&account_id)?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        if account.pin != old_pin {
            return Err(Error::InvalidCredentials);
        }

        account.pin = new_pin.to_string();
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_account(&mut batch, &account)?;
        self.storage.commit(batch)?;

        Ok(())
    }
}

/// Handle for sending commands to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerCommand>) -> Self {
        Self { sender }
    }

    pub(crate) async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerCommand::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, config: Arc<Config>) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, config, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;

    async fn spawn_test_actor() -> (LedgerHandle, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let config = Arc::new(config);

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(storage, config);
        (handle, temp_dir)
    }

    async fn open_personal(handle: &LedgerHandle, holder: &str) -> Account {
        handle
            .send(|tx| LedgerCommand::OpenAccount {
                pin: "1234".to_string(),
                holder: holder.to_string(),
                account_type: AccountType::Personal,
                response: tx,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_account_allocates_sequential_numbers() {
        let (handle, _dir) = spawn_test_actor().await;

        let a = open_personal(&handle, "Alice").await;
        let b = open_personal(&handle, "Bob").await;

        assert_eq!(a.account_number, "0000001");
        assert_eq!(b.account_number, "0000002");
        assert_eq!(a.balance, 0);
        assert_eq!(a.transaction_sequence, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn debit_rejects_insufficient_balance() {
        let (handle, _dir) = spawn_test_actor().await;
        let account = open_personal(&handle, "Alice").await;

        let result = handle
            .send(|tx| LedgerCommand::Mutate {
                account_id: account.account_id,
                op: BalanceOp::Debit(100),
                entry_type: EntryType::AtmOut,
                description: "ATM".to_string(),
                counterparty: None,
                related_order_id: None,
                response: tx,
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::InsufficientBalance { available: 0, requested: 100 })
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn transfer_claim_commits_with_mutation() {
        let (handle, _dir) = spawn_test_actor().await;
        let a = open_personal(&handle, "Alice").await;
        let b = open_personal(&handle, "Bob").await;

        handle
            .send(|tx| LedgerCommand::Mutate {
                account_id: a.account_id,
                op: BalanceOp::Credit(10_000),
                entry_type: EntryType::AtmIn,
                description: "ATM".to_string(),
                counterparty: None,
                related_order_id: None,
                response: tx,
            })
            .await
            .unwrap();

        let first = handle
            .send(|tx| LedgerCommand::Transfer {
                from_account_id: a.account_id,
                to_branch_code: b.branch_code.clone(),
                to_account_number: b.account_number.clone(),
                amount: 3_000,
                idempotency_key: Some("k1".to_string()),
                response: tx,
            })
            .await
            .unwrap();

        assert!(!first.replayed);
        assert_eq!(first.receipt.balance, 7_000);

        // Replay with the same key: identical receipt, no re-execution,
        // even with different parameters.
        let replay = handle
            .send(|tx| LedgerCommand::Transfer {
                from_account_id: a.account_id,
                to_branch_code: b.branch_code.clone(),
                to_account_number: b.account_number.clone(),
                amount: 9_999,
                idempotency_key: Some("k1".to_string()),
                response: tx,
            })
            .await
            .unwrap();

        assert!(replay.replayed);
        assert_eq!(replay.receipt, first.receipt);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn event_credit_deduplicates_by_scoped_key() {
        let (handle, _dir) = spawn_test_actor().await;
        let account = open_personal(&handle, "Alice").await;

        let apply = |handle: &LedgerHandle, message_id: &str| {
            let message_id = message_id.to_string();
            let account_id = account.account_id;
            let handle = handle.clone();
            async move {
                handle
                    .send(|tx| LedgerCommand::ApplyEventCredit {
                        event_type: "bank-deposit".to_string(),
                        message_id,
                        account_id,
                        amount: 500,
                        description: "deposit".to_string(),
                        reference: None,
                        response: tx,
                    })
                    .await
            }
        };

        let first = apply(&handle, "m1").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().balance, 500);

        let duplicate = apply(&handle, "m1").await.unwrap();
        assert!(duplicate.is_none());

        // Same raw id, different event type namespace: applies.
        let other_scope = handle
            .send(|tx| LedgerCommand::ApplyEventCredit {
                event_type: "xrpl-deposit".to_string(),
                message_id: "m1".to_string(),
                account_id: account.account_id,
                amount: 500,
                description: "deposit".to_string(),
                reference: None,
                response: tx,
            })
            .await
            .unwrap();
        assert!(other_scope.is_some());
        assert_eq!(other_scope.unwrap().balance, 1_000);

        handle.shutdown().await.unwrap();
    }
}
