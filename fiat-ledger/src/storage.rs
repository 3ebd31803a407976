//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `virtual_accounts` - Virtual sub-account records (key: virtual_account_id)
//! - `journal` - Append-only journal (key: account_id || sequence_number BE)
//! - `counters` - Allocator counters (key: counter name)
//! - `idempotency` - Processed keys/events (key: scoped idempotency key)
//! - `indices` - Secondary indices (routing tuples, parent back-references)
//!
//! Mutations are staged into a `WriteBatch` and committed atomically; the
//! single-writer actor serializes the read-validate-stage-commit cycles so no
//! two transactions interleave on the same documents.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, IdempotencyRecord, JournalEntry, VirtualAccount},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_VIRTUAL_ACCOUNTS: &str = "virtual_accounts";
const CF_JOURNAL: &str = "journal";
const CF_COUNTERS: &str = "counters";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_VIRTUAL_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_JOURNAL, Options::default()),
            ColumnFamilyDescriptor::new(CF_COUNTERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Options::default()),
            ColumnFamilyDescriptor::new(CF_INDICES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened ledger store");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    fn routing_key(branch_code: &str, account_number: &str) -> Vec<u8> {
        format!("r|{branch_code}|{account_number}").into_bytes()
    }

    fn virtual_routing_key(branch_code: &str, account_number: &str) -> Vec<u8> {
        format!("vr|{branch_code}|{account_number}").into_bytes()
    }

    fn parent_index_key(parent: &AccountId, virtual_id: &Uuid) -> Vec<u8> {
        let mut key = b"p|".to_vec();
        key.extend_from_slice(parent.as_bytes());
        key.extend_from_slice(virtual_id.as_bytes());
        key
    }

    fn journal_key(account_id: &AccountId, sequence_number: u64) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.extend_from_slice(&sequence_number.to_be_bytes());
        key
    }

    // Account reads

    /// Get account by ID; absent accounts are `None`, never an error
    pub fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, account_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get account by its routing tuple
    pub fn get_account_by_routing(
        &self,
        branch_code: &str,
        account_number: &str,
    ) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::routing_key(branch_code, account_number);

        match self.db.get_cf(cf, &key)? {
            Some(id_bytes) => {
                let id_bytes: [u8; 16] = id_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt routing index entry".to_string()))?;
                self.get_account(&AccountId::from_uuid(Uuid::from_bytes(id_bytes)))
            }
            None => Ok(None),
        }
    }

    // Virtual account reads

    /// Get virtual account by ID
    pub fn get_virtual_account(&self, virtual_account_id: &Uuid) -> Result<Option<VirtualAccount>> {
        let cf = self.cf_handle(CF_VIRTUAL_ACCOUNTS)?;
        match self.db.get_cf(cf, virtual_account_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get virtual account by its routing tuple (active or not; callers check)
    pub fn get_virtual_by_routing(
        &self,
        branch_code: &str,
        account_number: &str,
    ) -> Result<Option<VirtualAccount>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::virtual_routing_key(branch_code, account_number);

        match self.db.get_cf(cf, &key)? {
            Some(id_bytes) => {
                let id_bytes: [u8; 16] = id_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt virtual routing index entry".to_string()))?;
                self.get_virtual_account(&Uuid::from_bytes(id_bytes))
            }
            None => Ok(None),
        }
    }

    /// List all virtual accounts owned by a parent account
    pub fn list_virtual_accounts(&self, parent: &AccountId) -> Result<Vec<VirtualAccount>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = b"p|".to_vec();
        prefix.extend_from_slice(parent.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut accounts = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("corrupt parent index entry".to_string()))?;
            if let Some(va) = self.get_virtual_account(&Uuid::from_bytes(id_bytes))? {
                accounts.push(va);
            }
        }

        Ok(accounts)
    }

    // Counters

    /// Current counter value; absent counters read as `None` (allocators treat as 0)
    pub fn get_counter(&self, name: &str) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_COUNTERS)?;
        match self.db.get_cf(cf, name.as_bytes())? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage(format!("corrupt counter {}", name)))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    // Idempotency

    /// Stored claim for a scoped idempotency key, if any
    pub fn get_idempotency(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Journal reads

    /// Journal entries for an account, newest first
    ///
    /// `before_seq` restarts the scan below a previous page's last sequence
    /// number; the read is bounded by `limit`. Sequence numbers start at 1,
    /// so `Some(0)` means the previous page was the last one.
    pub fn list_journal(
        &self,
        account_id: &AccountId,
        limit: usize,
        before_seq: Option<u64>,
    ) -> Result<Vec<JournalEntry>> {
        let cf = self.cf_handle(CF_JOURNAL)?;

        let start_seq = match before_seq {
            None => u64::MAX,
            Some(0) => return Ok(Vec::new()),
            Some(seq) => seq - 1,
        };
        let start_key = Self::journal_key(account_id, start_seq);
        let prefix = account_id.as_bytes();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Reverse));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
            if entries.len() >= limit {
                break;
            }
        }

        Ok(entries)
    }

    /// Journal entries for an account, oldest first (audit scans)
    pub fn scan_journal(&self, account_id: &AccountId) -> Result<Vec<JournalEntry>> {
        let cf = self.cf_handle(CF_JOURNAL)?;
        let prefix = account_id.as_bytes();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }

        Ok(entries)
    }

    // Batch staging (writes commit together or not at all)

    /// Stage an account write, including its routing index entry
    pub fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(cf, account.account_id.as_bytes(), bincode::serialize(account)?);

        let cf_idx = self.cf_handle(CF_INDICES)?;
        let key = Self::routing_key(&account.branch_code, &account.account_number);
        batch.put_cf(cf_idx, &key, account.account_id.as_bytes());

        Ok(())
    }

    /// Stage a virtual account write with its routing and parent indices
    pub fn stage_virtual_account(&self, batch: &mut WriteBatch, va: &VirtualAccount) -> Result<()> {
        let cf = self.cf_handle(CF_VIRTUAL_ACCOUNTS)?;
        batch.put_cf(cf, va.virtual_account_id.as_bytes(), bincode::serialize(va)?);

        let cf_idx = self.cf_handle(CF_INDICES)?;
        let routing = Self::virtual_routing_key(&va.branch_code, &va.account_number);
        batch.put_cf(cf_idx, &routing, va.virtual_account_id.as_bytes());

        let parent = Self::parent_index_key(&va.parent_account_id, &va.virtual_account_id);
        batch.put_cf(cf_idx, &parent, []);

        Ok(())
    }

    /// Stage an append-only journal entry at its sequence slot
    pub fn stage_journal_entry(&self, batch: &mut WriteBatch, entry: &JournalEntry) -> Result<()> {
        let cf = self.cf_handle(CF_JOURNAL)?;
        let key = Self::journal_key(&entry.account_id, entry.sequence_number);
        batch.put_cf(cf, &key, bincode::serialize(entry)?);
        Ok(())
    }

    /// Stage a counter value
    pub fn stage_counter(&self, batch: &mut WriteBatch, name: &str, value: u64) -> Result<()> {
        let cf = self.cf_handle(CF_COUNTERS)?;
        batch.put_cf(cf, name.as_bytes(), value.to_be_bytes());
        Ok(())
    }

    /// Stage an idempotency claim
    pub fn stage_idempotency(&self, batch: &mut WriteBatch, record: &IdempotencyRecord) -> Result<()> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;
        batch.put_cf(cf, record.key.as_bytes(), bincode::serialize(record)?);
        Ok(())
    }

    /// Atomically commit a staged batch
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }
}
