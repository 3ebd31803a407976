//! Storage layer for the token bridge
//!
//! # Column Families
//!
//! - `wallets` - Custodial wallet records (key: account_id)
//! - `orders` - Exchange orders (key: order_id)
//! - `token_journal` - Append-only token entries (key: account_id || sequence BE)
//! - `processed` - Dedup claims for inbound events (key: scoped event key)
//! - `whitelist` - Withdrawal beneficiaries (key: account_id || kind || dest)
//! - `trustlines` - Locally recorded trust lines (key: account_id || token)
//! - `reconciliation` - Dead-letter queue (key: item_id)
//! - `indices` - Secondary indices (address, virtual number, orders-by-account)
//!
//! Multi-key mutations go through a `WriteBatch`; read-modify-write sequences
//! (dedup claims, order status moves, wallet registration) additionally hold
//! the store's write lock so checks and claims cannot interleave.

use crate::{
    config::BridgeConfig,
    error::{Error, Result},
    types::{
        BankBeneficiary, ExchangeOrder, NetworkBeneficiary, OrderStatus, ReconciliationItem,
        TokenEntryKind, TokenId, TokenJournalEntry, TrustLine, Wallet,
    },
};
use chrono::Utc;
use fiat_ledger::AccountId;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const CF_WALLETS: &str = "wallets";
const CF_ORDERS: &str = "orders";
const CF_TOKEN_JOURNAL: &str = "token_journal";
const CF_PROCESSED: &str = "processed";
const CF_WHITELIST: &str = "whitelist";
const CF_TRUSTLINES: &str = "trustlines";
const CF_RECONCILIATION: &str = "reconciliation";
const CF_INDICES: &str = "indices";

/// What to append alongside a dedup claim
pub struct TokenEntrySpec {
    /// Wallet owner
    pub account_id: AccountId,
    /// Entry kind
    pub kind: TokenEntryKind,
    /// Token amount
    pub amount: Decimal,
    /// Token moved
    pub token: TokenId,
    /// Network transaction hash
    pub tx_hash: Option<String>,
    /// Related order
    pub related_order_id: Option<String>,
}

/// Storage wrapper for the bridge's RocksDB
pub struct BridgeStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl BridgeStore {
    /// Open or create the database
    pub fn open(config: &BridgeConfig) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TOKEN_JOURNAL, Options::default()),
            ColumnFamilyDescriptor::new(CF_PROCESSED, Options::default()),
            ColumnFamilyDescriptor::new(CF_WHITELIST, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRUSTLINES, Options::default()),
            ColumnFamilyDescriptor::new(CF_RECONCILIATION, Options::default()),
            ColumnFamilyDescriptor::new(CF_INDICES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened bridge store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    fn address_index_key(address: &str) -> Vec<u8> {
        format!("a|{address}").into_bytes()
    }

    fn virtual_number_index_key(number: &str) -> Vec<u8> {
        format!("v|{number}").into_bytes()
    }

    fn order_index_key(account_id: &AccountId, order_id: &Uuid) -> Vec<u8> {
        let mut key = b"o|".to_vec();
        key.extend_from_slice(account_id.as_bytes());
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    fn journal_key(account_id: &AccountId, sequence_number: u64) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.extend_from_slice(&sequence_number.to_be_bytes());
        key
    }

    fn whitelist_key(account_id: &AccountId, kind: u8, dest: &str) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.push(kind);
        key.extend_from_slice(dest.as_bytes());
        key
    }

    fn trustline_key(account_id: &AccountId, token: &TokenId) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.extend_from_slice(token.to_string().as_bytes());
        key
    }

    // Wallets

    /// Register a wallet; one per account, duplicates conflict
    pub fn register_wallet(&self, wallet: &Wallet) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get_wallet(&wallet.account_id)?.is_some() {
            return Err(Error::Conflict(format!(
                "wallet already registered for {}",
                wallet.account_id
            )));
        }

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, wallet)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn stage_wallet(&self, batch: &mut WriteBatch, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;
        batch.put_cf(cf, wallet.account_id.as_bytes(), bincode::serialize(wallet)?);

        let cf_idx = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_idx,
            Self::address_index_key(&wallet.address),
            wallet.account_id.as_bytes(),
        );
        if let Some(ref number) = wallet.virtual_account_number {
            batch.put_cf(
                cf_idx,
                Self::virtual_number_index_key(number),
                wallet.account_id.as_bytes(),
            );
        }
        Ok(())
    }

    /// Get wallet by owning account
    pub fn get_wallet(&self, account_id: &AccountId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        match self.db.get_cf(cf, account_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn get_wallet_by_index(&self, index_key: &[u8]) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, index_key)? {
            Some(id_bytes) => {
                let id_bytes: [u8; 16] = id_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt wallet index entry".to_string()))?;
                self.get_wallet(&AccountId::from_uuid(Uuid::from_bytes(id_bytes)))
            }
            None => Ok(None),
        }
    }

    /// Get wallet by network address
    pub fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        self.get_wallet_by_index(&Self::address_index_key(address))
    }

    /// Get wallet by its linked virtual account number
    pub fn get_wallet_by_virtual_number(&self, number: &str) -> Result<Option<Wallet>> {
        self.get_wallet_by_index(&Self::virtual_number_index_key(number))
    }

    /// Link a virtual account number to an existing wallet
    pub fn set_wallet_virtual_number(&self, account_id: &AccountId, number: String) -> Result<Wallet> {
        let _guard = self.write_lock.lock();

        let mut wallet = self
            .get_wallet(account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        if wallet.virtual_account_number.is_some() {
            return Err(Error::Conflict(format!(
                "wallet for {} already has a deposit route",
                account_id
            )));
        }
        if self.get_wallet_by_virtual_number(&number)?.is_some() {
            return Err(Error::Conflict(format!(
                "virtual account number {} already routed",
                number
            )));
        }

        wallet.virtual_account_number = Some(number);
        wallet.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;
        self.db.write(batch)?;
        Ok(wallet)
    }

    // Token journal

    /// Append a token journal entry, bumping the wallet's sequence
    pub fn append_token_entry(&self, spec: TokenEntrySpec) -> Result<TokenJournalEntry> {
        let _guard = self.write_lock.lock();
        self.append_token_entry_locked(spec, None)
    }

    /// Atomically claim a dedup key and append a token entry
    ///
    /// Returns `None` when the key was already claimed; nothing is written.
    pub fn claim_and_append(
        &self,
        claim_key: &str,
        spec: TokenEntrySpec,
    ) -> Result<Option<TokenJournalEntry>> {
        let _guard = self.write_lock.lock();

        if self.is_processed(claim_key)? {
            return Ok(None);
        }

        let entry = self.append_token_entry_locked(spec, Some(claim_key))?;
        Ok(Some(entry))
    }

    fn append_token_entry_locked(
        &self,
        spec: TokenEntrySpec,
        claim_key: Option<&str>,
    ) -> Result<TokenJournalEntry> {
        let mut wallet = self
            .get_wallet(&spec.account_id)?
            .ok_or_else(|| Error::NotFound("Wallet not found".to_string()))?;

        let now = Utc::now();
        let seq = wallet.token_sequence + 1;
        wallet.token_sequence = seq;
        wallet.updated_at = now;

        let entry = TokenJournalEntry {
            entry_id: Uuid::now_v7(),
            account_id: spec.account_id,
            kind: spec.kind,
            amount: spec.amount,
            token: spec.token,
            tx_hash: spec.tx_hash,
            related_order_id: spec.related_order_id,
            sequence_number: seq,
            created_at: now,
        };

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;

        let cf = self.cf_handle(CF_TOKEN_JOURNAL)?;
        let key = Self::journal_key(&entry.account_id, seq);
        batch.put_cf(cf, &key, bincode::serialize(&entry)?);

        if let Some(claim_key) = claim_key {
            let cf = self.cf_handle(CF_PROCESSED)?;
            batch.put_cf(cf, claim_key.as_bytes(), now.to_rfc3339().as_bytes());
        }

        self.db.write(batch)?;
        Ok(entry)
    }

    /// Whether a dedup key was already claimed
    pub fn is_processed(&self, key: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_PROCESSED)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?.is_some())
    }

    /// Token journal entries for a wallet, newest first
    ///
    /// Sequence numbers start at 1, so `before_seq = Some(0)` means the
    /// previous page was the last one.
    pub fn list_token_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        before_seq: Option<u64>,
    ) -> Result<Vec<TokenJournalEntry>> {
        let cf = self.cf_handle(CF_TOKEN_JOURNAL)?;

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

    // Orders

    /// Insert a fresh order row
    pub fn insert_order(&self, order: &ExchangeOrder) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf = self.cf_handle(CF_ORDERS)?;
        batch.put_cf(cf, order.order_id.as_bytes(), bincode::serialize(order)?);

        let cf_idx = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_idx,
            Self::order_index_key(&order.account_id, &order.order_id),
            [],
        );

        self.db.write(batch)?;
        Ok(())
    }

    /// Get order by ID
    pub fn get_order(&self, order_id: &Uuid) -> Result<Option<ExchangeOrder>> {
        let cf = self.cf_handle(CF_ORDERS)?;
        match self.db.get_cf(cf, order_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Move an order forward; terminal orders reject further updates
    pub fn update_order_status(
        &self,
        order_id: &Uuid,
        status: OrderStatus,
        tx_hash: Option<String>,
        failure_reason: Option<String>,
    ) -> Result<ExchangeOrder> {
        let _guard = self.write_lock.lock();

        let mut order = self
            .get_order(order_id)?
            .ok_or_else(|| Error::NotFound("Order not found".to_string()))?;

        if order.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "order {} is already {}",
                order_id, order.status
            )));
        }

        order.status = status;
        if tx_hash.is_some() {
            order.tx_hash = tx_hash;
        }
        if failure_reason.is_some() {
            order.failure_reason = failure_reason;
        }
        order.updated_at = Utc::now();

        let cf = self.cf_handle(CF_ORDERS)?;
        self.db
            .put_cf(cf, order.order_id.as_bytes(), bincode::serialize(&order)?)?;

        Ok(order)
    }

    /// All orders for an account
    pub fn list_orders(&self, account_id: &AccountId) -> Result<Vec<ExchangeOrder>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = b"o|".to_vec();
        prefix.extend_from_slice(account_id.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut orders = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("corrupt order index entry".to_string()))?;
            if let Some(order) = self.get_order(&Uuid::from_bytes(id_bytes))? {
                orders.push(order);
            }
        }

        Ok(orders)
    }

    // Whitelists

    /// Add a bank beneficiary; duplicates conflict
    pub fn add_bank_beneficiary(
        &self,
        account_id: &AccountId,
        beneficiary: &BankBeneficiary,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'b', &beneficiary.routing_key());

        if self.db.get_cf(cf, &key)?.is_some() {
            return Err(Error::Conflict("beneficiary already whitelisted".to_string()));
        }

        self.db.put_cf(cf, &key, bincode::serialize(beneficiary)?)?;
        Ok(())
    }

    /// Remove a bank beneficiary; missing entries error
    pub fn remove_bank_beneficiary(
        &self,
        account_id: &AccountId,
        routing_key: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'b', routing_key);

        if self.db.get_cf(cf, &key)?.is_none() {
            return Err(Error::NotFound("beneficiary not whitelisted".to_string()));
        }

        self.db.delete_cf(cf, &key)?;
        Ok(())
    }

    /// Check a bank beneficiary is whitelisted
    pub fn has_bank_beneficiary(
        &self,
        account_id: &AccountId,
        beneficiary: &BankBeneficiary,
    ) -> Result<bool> {
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'b', &beneficiary.routing_key());
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// List bank beneficiaries for an account
    pub fn list_bank_beneficiaries(&self, account_id: &AccountId) -> Result<Vec<BankBeneficiary>> {
        self.list_whitelist(account_id, b'b')
    }

    /// Add a network beneficiary; duplicates conflict
    pub fn add_network_beneficiary(
        &self,
        account_id: &AccountId,
        beneficiary: &NetworkBeneficiary,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'n', &beneficiary.address);

        if self.db.get_cf(cf, &key)?.is_some() {
            return Err(Error::Conflict("address already whitelisted".to_string()));
        }

        self.db.put_cf(cf, &key, bincode::serialize(beneficiary)?)?;
        Ok(())
    }

    /// Remove a network beneficiary; missing entries error
    pub fn remove_network_beneficiary(&self, account_id: &AccountId, address: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'n', address);

        if self.db.get_cf(cf, &key)?.is_none() {
            return Err(Error::NotFound("address not whitelisted".to_string()));
        }

        self.db.delete_cf(cf, &key)?;
        Ok(())
    }

    /// Check a network address is whitelisted
    pub fn has_network_beneficiary(&self, account_id: &AccountId, address: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_WHITELIST)?;
        let key = Self::whitelist_key(account_id, b'n', address);
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// List network beneficiaries for an account
    pub fn list_network_beneficiaries(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<NetworkBeneficiary>> {
        self.list_whitelist(account_id, b'n')
    }

    fn list_whitelist<T: serde::de::DeserializeOwned>(
        &self,
        account_id: &AccountId,
        kind: u8,
    ) -> Result<Vec<T>> {
        let cf = self.cf_handle(CF_WHITELIST)?;

        let mut prefix = account_id.as_bytes().to_vec();
        prefix.push(kind);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }

        Ok(entries)
    }

    // Trust lines

    /// Record a trust line locally (idempotent upsert)
    pub fn put_trust_line(&self, line: &TrustLine) -> Result<()> {
        let cf = self.cf_handle(CF_TRUSTLINES)?;
        let key = Self::trustline_key(&line.account_id, &line.token);
        self.db.put_cf(cf, &key, bincode::serialize(line)?)?;
        Ok(())
    }

    /// Locally recorded trust line, if any
    pub fn get_trust_line(&self, account_id: &AccountId, token: &TokenId) -> Result<Option<TrustLine>> {
        let cf = self.cf_handle(CF_TRUSTLINES)?;
        let key = Self::trustline_key(account_id, token);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Reconciliation queue

    /// Persist a dead-letter item for operator intervention
    pub fn push_reconciliation(&self, item: &ReconciliationItem) -> Result<()> {
        let cf = self.cf_handle(CF_RECONCILIATION)?;
        self.db
            .put_cf(cf, item.item_id.as_bytes(), bincode::serialize(item)?)?;

        tracing::error!(
            item_id = %item.item_id,
            account_id = %item.account_id,
            reason = %item.reason,
            "Reconciliation item recorded, manual reconciliation required"
        );
        Ok(())
    }

    /// All outstanding reconciliation items
    pub fn list_reconciliation(&self) -> Result<Vec<ReconciliationItem>> {
        let cf = self.cf_handle(CF_RECONCILIATION)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut items = Vec::new();
        for item in iter {
            let (_, value) = item?;
            items.push(bincode::deserialize(&value)?);
        }
        Ok(items)
    }
}
