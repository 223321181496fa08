//! # LedgerStore — Persistent Storage Engine
//!
//! The persistence layer for the platform, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB or tables in SQL). Each tree is an independent B+ tree with its
//! own keyspace:
//!
//! | Tree           | Key                      | Value                        |
//! |----------------|--------------------------|------------------------------|
//! | `wallets`      | wallet id (16B)          | `bincode(Wallet)`            |
//! | `transactions` | millis BE (8B) ++ id     | `bincode(TransactionRecord)` |
//! | `tx_ids`       | tx id (16B)              | composite key (24B)          |
//! | `gateway_refs` | order reference (UTF-8)  | tx id (16B)                  |
//! | `rules`        | wallet id (16B)          | `bincode(SpendingRule)`      |
//! | `requests`     | request id (16B)         | `bincode(MoneyRequest)`      |
//! | `audit`        | millis BE (8B) ++ id     | `bincode(AuditEntry)`        |
//!
//! Transaction keys lead with a big-endian timestamp so that sled's
//! lexicographic ordering matches chronological ordering — newest-first
//! history queries are a reverse range scan, and the daily-limit window is
//! a bounded scan. `tx_ids` is the reverse index for point lookups.
//!
//! ## Atomicity
//!
//! [`LedgerStore::atomic_apply`] is the platform's one write path for
//! balances. A batch is staged and validated against a consistent view
//! under the store's writer lock — wallet existence, non-negative balances,
//! terminal-state rules — and only then committed. Readers share the same
//! lock in read mode, so no caller ever observes half of a batch. The
//! writer lock doubles as the "single-writer queue" serialization strategy:
//! storage-level write conflicts cannot occur, and [`LedgerError::Conflict`]
//! is reserved for the gateway-reference uniqueness guard.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use super::transaction::{TransactionRecord, TxKind, TxStatus};
use super::wallet::{Wallet, WalletKind, WalletOwner};
use crate::audit::AuditEntry;
use crate::ids::{TransactionId, WalletId};
use crate::money::Amount;
use crate::requests::MoneyRequest;
use crate::rules::SpendingRule;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger storage operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A debit would take the wallet below zero. Callers pre-check; this
    /// guard catches anything that slips past them.
    #[error("insufficient funds on wallet {wallet}: available {available}, requested {requested}")]
    InsufficientFunds {
        wallet: WalletId,
        available: Amount,
        requested: Amount,
    },

    #[error("balance overflow on wallet {0}")]
    BalanceOverflow(WalletId),

    /// A status update targeted a transaction that already resolved.
    #[error("transaction {0} is already terminal")]
    AlreadyTerminal(TransactionId),

    /// Zero-amount deltas are no-ops and almost certainly caller bugs.
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,

    /// Concurrent-modification guard tripped (duplicate gateway reference).
    #[error("conflicting concurrent modification")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// LedgerOp
// ---------------------------------------------------------------------------

/// One operation inside an atomic batch.
///
/// A batch either applies in full or leaves no trace. `PutRequest` exists
/// so the money-request workflow can fold its APPROVED mark into the same
/// batch as the ledger mutation it triggers.
#[derive(Debug, Clone)]
pub enum LedgerOp {
    /// Add to a wallet's balance.
    Credit { wallet: WalletId, amount: Amount },
    /// Subtract from a wallet's balance. Fails the batch if the balance
    /// would go negative.
    Debit { wallet: WalletId, amount: Amount },
    /// Append a new transaction record.
    InsertTransaction(TransactionRecord),
    /// Resolve a PENDING transaction to a terminal status, optionally
    /// annotating its description.
    FinalizeTransaction {
        id: TransactionId,
        status: TxStatus,
        note: Option<String>,
    },
    /// Upsert a money request alongside the ledger mutation.
    PutRequest(MoneyRequest),
}

// ---------------------------------------------------------------------------
// LedgerStats
// ---------------------------------------------------------------------------

/// Read-only aggregation over the ledger, for the reporting surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LedgerStats {
    pub wallets: usize,
    pub total_balance: Amount,
    pub transactions: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub deposits: usize,
    pub transfers: usize,
    pub payments: usize,
    pub withdrawals: usize,
    /// Sum of COMPLETED transaction amounts.
    pub completed_volume: Amount,
}

// ---------------------------------------------------------------------------
// Key encoding
// ---------------------------------------------------------------------------

/// Composite key: big-endian millis since epoch, then the record id.
/// Lexicographic order == chronological order.
fn timestamped_key(at: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&(at.timestamp_millis().max(0) as u64).to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for wallets, transactions, spending rules,
/// money requests, and the audit trail.
///
/// # Thread Safety
///
/// Shareable across threads via `Arc<LedgerStore>`. Writes are serialized
/// through an internal writer lock; reads take the same lock in read mode
/// and are therefore snapshot-consistent with respect to batches.
#[derive(Debug)]
pub struct LedgerStore {
    /// The underlying sled database handle.
    db: Db,
    wallets: Tree,
    transactions: Tree,
    tx_ids: Tree,
    gateway_refs: Tree,
    rules: Tree,
    requests: Tree,
    audit: Tree,
    /// Writer lock: `atomic_apply` takes it exclusively, readers share it.
    serial: RwLock<()>,
}

impl LedgerStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that lives in memory and is cleaned up
    /// when dropped. Ideal for tests — no filesystem side effects.
    pub fn open_temporary() -> LedgerResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let wallets = db.open_tree("wallets")?;
        let transactions = db.open_tree("transactions")?;
        let tx_ids = db.open_tree("tx_ids")?;
        let gateway_refs = db.open_tree("gateway_refs")?;
        let rules = db.open_tree("rules")?;
        let requests = db.open_tree("requests")?;
        let audit = db.open_tree("audit")?;

        Ok(Self {
            db,
            wallets,
            transactions,
            tx_ids,
            gateway_refs,
            rules,
            requests,
            audit,
            serial: RwLock::new(()),
        })
    }

    /// Open a named sled tree from the underlying database.
    ///
    /// Used by the directory module, which keeps student and vendor
    /// records in the same database file but owns their lifecycle.
    pub fn open_tree(&self, name: &str) -> LedgerResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    // -- Atomic batch -------------------------------------------------------

    /// Apply a batch of ledger operations: all of them, or none of them.
    ///
    /// Stage 1 validates every operation against a consistent view taken
    /// under the writer lock — missing wallets, overdrafts, double
    /// finalization, and duplicate gateway references all fail the whole
    /// batch before anything is written. Stage 2 is pure writes.
    pub fn atomic_apply(&self, ops: &[LedgerOp]) -> LedgerResult<()> {
        let _guard = self.serial.write();

        // -- Stage 1: validate against a consistent snapshot.
        let mut staged_wallets: HashMap<WalletId, Wallet> = HashMap::new();
        let mut inserts: Vec<&TransactionRecord> = Vec::new();
        let mut finalized: Vec<([u8; 24], TransactionRecord)> = Vec::new();
        let mut request_puts: Vec<&MoneyRequest> = Vec::new();

        for op in ops {
            match op {
                LedgerOp::Credit { wallet, amount } => {
                    if amount.is_zero() {
                        return Err(LedgerError::ZeroAmount);
                    }
                    let w = self.stage_wallet(&mut staged_wallets, *wallet)?;
                    w.balance = w
                        .balance
                        .checked_add(*amount)
                        .ok_or(LedgerError::BalanceOverflow(*wallet))?;
                }
                LedgerOp::Debit { wallet, amount } => {
                    if amount.is_zero() {
                        return Err(LedgerError::ZeroAmount);
                    }
                    let w = self.stage_wallet(&mut staged_wallets, *wallet)?;
                    let available = w.balance;
                    w.balance = available.checked_sub(*amount).ok_or(
                        LedgerError::InsufficientFunds {
                            wallet: *wallet,
                            available,
                            requested: *amount,
                        },
                    )?;
                }
                LedgerOp::InsertTransaction(tx) => {
                    if tx.amount.is_zero() {
                        return Err(LedgerError::ZeroAmount);
                    }
                    if let Some(reference) = &tx.gateway_ref {
                        if self.gateway_refs.contains_key(reference.as_bytes())? {
                            return Err(LedgerError::Conflict);
                        }
                    }
                    inserts.push(tx);
                }
                LedgerOp::FinalizeTransaction { id, status, note } => {
                    let (key, mut tx) = self.locate_transaction(*id)?;
                    if !tx.finalize(*status, note.as_deref()) {
                        return Err(LedgerError::AlreadyTerminal(*id));
                    }
                    finalized.push((key, tx));
                }
                LedgerOp::PutRequest(request) => {
                    request_puts.push(request);
                }
            }
        }

        // -- Stage 2: commit. Validation is done; only writes remain.
        let mut wallet_batch = Batch::default();
        for wallet in staged_wallets.values() {
            wallet_batch.insert(wallet.id.as_bytes(), encode(wallet)?);
        }

        let mut tx_batch = Batch::default();
        let mut id_batch = Batch::default();
        let mut ref_batch = Batch::default();
        for tx in &inserts {
            let key = timestamped_key(tx.created_at, tx.id);
            tx_batch.insert(&key, encode(*tx)?);
            id_batch.insert(tx.id.as_bytes(), &key);
            if let Some(reference) = &tx.gateway_ref {
                ref_batch.insert(reference.as_bytes(), tx.id.as_bytes());
            }
        }
        for (key, tx) in &finalized {
            tx_batch.insert(key, encode(tx)?);
        }

        let mut request_batch = Batch::default();
        for request in &request_puts {
            request_batch.insert(request.id.as_bytes(), encode(*request)?);
        }

        self.wallets.apply_batch(wallet_batch)?;
        self.transactions.apply_batch(tx_batch)?;
        self.tx_ids.apply_batch(id_batch)?;
        self.gateway_refs.apply_batch(ref_batch)?;
        self.requests.apply_batch(request_batch)?;
        self.db.flush()?;

        Ok(())
    }

    /// Load a wallet into the staging map on first touch, so a batch that
    /// debits and credits the same wallet sees its own intermediate state.
    fn stage_wallet<'a>(
        &self,
        staged: &'a mut HashMap<WalletId, Wallet>,
        id: WalletId,
    ) -> LedgerResult<&'a mut Wallet> {
        if !staged.contains_key(&id) {
            let wallet = self.load_wallet(id)?;
            staged.insert(id, wallet);
        }
        Ok(staged.get_mut(&id).expect("staged above"))
    }

    // -- Wallet operations --------------------------------------------------

    /// Create and persist a fresh zero-balance wallet.
    pub fn create_wallet(
        &self,
        owner: WalletOwner,
        kind: WalletKind,
        now: DateTime<Utc>,
    ) -> LedgerResult<Wallet> {
        let _guard = self.serial.write();
        let wallet = Wallet::new(owner, kind, now);
        self.wallets.insert(wallet.id.as_bytes(), encode(&wallet)?)?;
        Ok(wallet)
    }

    /// Retrieve a wallet by id.
    pub fn get_wallet(&self, id: WalletId) -> LedgerResult<Wallet> {
        let _guard = self.serial.read();
        self.load_wallet(id)
    }

    fn load_wallet(&self, id: WalletId) -> LedgerResult<Wallet> {
        match self.wallets.get(id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(LedgerError::WalletNotFound(id)),
        }
    }

    /// Find the wallet of a given kind owned by the given principal.
    ///
    /// Linear scan: a campus has hundreds of wallets, not millions, and
    /// owner lookups are not on the payment hot path (the engine resolves
    /// them once per operation, outside any loop).
    pub fn find_wallet(&self, owner_id: Uuid, kind: WalletKind) -> LedgerResult<Option<Wallet>> {
        let _guard = self.serial.read();
        for item in self.wallets.iter() {
            let (_, bytes) = item?;
            let wallet: Wallet = decode(&bytes)?;
            if wallet.kind == kind && wallet.owner.id() == owner_id {
                return Ok(Some(wallet));
            }
        }
        Ok(None)
    }

    /// All wallets, for reporting.
    pub fn list_wallets(&self) -> LedgerResult<Vec<Wallet>> {
        let _guard = self.serial.read();
        let mut wallets = Vec::new();
        for item in self.wallets.iter() {
            let (_, bytes) = item?;
            wallets.push(decode(&bytes)?);
        }
        Ok(wallets)
    }

    // -- Transaction operations ---------------------------------------------

    /// Retrieve a transaction by id via the reverse index.
    pub fn get_transaction(&self, id: TransactionId) -> LedgerResult<TransactionRecord> {
        let _guard = self.serial.read();
        self.locate_transaction(id).map(|(_, tx)| tx)
    }

    fn locate_transaction(
        &self,
        id: TransactionId,
    ) -> LedgerResult<([u8; 24], TransactionRecord)> {
        let key_bytes = self
            .tx_ids
            .get(id.as_bytes())?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        let mut key = [0u8; 24];
        key.copy_from_slice(&key_bytes);
        let bytes = self
            .transactions
            .get(key)?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        Ok((key, decode(&bytes)?))
    }

    /// Look up a deposit by its gateway order reference. This is the
    /// idempotency probe: a second gateway callback finds the first
    /// record here and never reaches the credit path.
    pub fn find_by_gateway_ref(&self, reference: &str) -> LedgerResult<Option<TransactionRecord>> {
        let _guard = self.serial.read();
        let Some(id_bytes) = self.gateway_refs.get(reference.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.locate_transaction(id).map(|(_, tx)| Some(tx))
    }

    /// A wallet's transaction history, newest first.
    pub fn transactions_for_wallet(
        &self,
        wallet: WalletId,
        limit: usize,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let _guard = self.serial.read();
        let mut out = Vec::new();
        for item in self.transactions.iter().rev() {
            let (_, bytes) = item?;
            let tx: TransactionRecord = decode(&bytes)?;
            if tx.parties.involves(wallet) {
                out.push(tx);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// COMPLETED payment debits of a wallet from `start` onward. This is
    /// the daily-limit query: everything the wallet spent since local
    /// midnight, including payments committed in the same instant as the
    /// check — the rule evaluator runs inside the payment critical
    /// section, so an upper bound would race with same-timestamp commits.
    pub fn completed_payments_since(
        &self,
        wallet: WalletId,
        start: DateTime<Utc>,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let _guard = self.serial.read();
        let lo = timestamped_key(start, Uuid::nil());
        let mut out = Vec::new();
        for item in self.transactions.range(lo..) {
            let (_, bytes) = item?;
            let tx: TransactionRecord = decode(&bytes)?;
            if tx.kind == TxKind::Payment
                && tx.status == TxStatus::Completed
                && tx.parties.from_wallet() == Some(wallet)
            {
                out.push(tx);
            }
        }
        Ok(out)
    }

    /// All transactions, newest first, up to `limit`.
    pub fn list_transactions(&self, limit: usize) -> LedgerResult<Vec<TransactionRecord>> {
        let _guard = self.serial.read();
        let mut out = Vec::new();
        for item in self.transactions.iter().rev().take(limit) {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    // -- Spending rule operations -------------------------------------------

    /// Upsert the rule for a wallet. Keying by wallet id is what enforces
    /// "at most one live rule per wallet": a second set overwrites in
    /// place instead of accumulating duplicates.
    pub fn put_rule(&self, rule: &SpendingRule) -> LedgerResult<()> {
        let _guard = self.serial.write();
        self.rules
            .insert(rule.wallet_id.as_bytes(), encode(rule)?)?;
        Ok(())
    }

    /// The rule for a wallet, if one was ever set.
    pub fn get_rule(&self, wallet: WalletId) -> LedgerResult<Option<SpendingRule>> {
        let _guard = self.serial.read();
        match self.rules.get(wallet.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Money request operations -------------------------------------------

    /// Upsert a money request outside an atomic batch (creation and
    /// rejection have no ledger side effects).
    pub fn put_request(&self, request: &MoneyRequest) -> LedgerResult<()> {
        let _guard = self.serial.write();
        self.requests
            .insert(request.id.as_bytes(), encode(request)?)?;
        Ok(())
    }

    /// Retrieve a money request by id.
    pub fn get_request(&self, id: Uuid) -> LedgerResult<Option<MoneyRequest>> {
        let _guard = self.serial.read();
        match self.requests.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All money requests, newest first.
    pub fn list_requests(&self) -> LedgerResult<Vec<MoneyRequest>> {
        let _guard = self.serial.read();
        let mut out: Vec<MoneyRequest> = Vec::new();
        for item in self.requests.iter() {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    // -- Audit operations ---------------------------------------------------

    /// Append an audit entry. Deliberately *not* part of `atomic_apply`:
    /// the audit trail is written after the financial commit, outside the
    /// wallet critical section, and its failure must never unwind a
    /// completed operation (the audit module handles that policy).
    pub fn append_audit(&self, entry: &AuditEntry) -> LedgerResult<()> {
        let key = timestamped_key(entry.created_at, entry.id);
        self.audit.insert(key, encode(entry)?)?;
        Ok(())
    }

    /// All audit entries, newest first. The audit module applies filters
    /// and limits on top.
    pub fn audit_entries_rev(&self) -> LedgerResult<Vec<AuditEntry>> {
        let mut out = Vec::new();
        for item in self.audit.iter().rev() {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    // -- Reporting ----------------------------------------------------------

    /// Aggregate counters over the whole ledger.
    pub fn ledger_stats(&self) -> LedgerResult<LedgerStats> {
        let _guard = self.serial.read();
        let mut stats = LedgerStats::default();

        for item in self.wallets.iter() {
            let (_, bytes) = item?;
            let wallet: Wallet = decode(&bytes)?;
            stats.wallets += 1;
            stats.total_balance = stats
                .total_balance
                .checked_add(wallet.balance)
                .unwrap_or(stats.total_balance);
        }

        for item in self.transactions.iter() {
            let (_, bytes) = item?;
            let tx: TransactionRecord = decode(&bytes)?;
            stats.transactions += 1;
            match tx.status {
                TxStatus::Completed => {
                    stats.completed += 1;
                    stats.completed_volume = stats
                        .completed_volume
                        .checked_add(tx.amount)
                        .unwrap_or(stats.completed_volume);
                }
                TxStatus::Pending => stats.pending += 1,
                TxStatus::Failed => stats.failed += 1,
            }
            match tx.kind {
                TxKind::Deposit => stats.deposits += 1,
                TxKind::Transfer => stats.transfers += 1,
                TxKind::Payment => stats.payments += 1,
                TxKind::Withdrawal => stats.withdrawals += 1,
            }
        }

        Ok(stats)
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::TxParties;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn store_with_wallet(balance: Amount) -> (LedgerStore, Wallet) {
        let store = LedgerStore::open_temporary().unwrap();
        let wallet = store
            .create_wallet(
                WalletOwner::User(Uuid::new_v4()),
                WalletKind::Guardian,
                now(),
            )
            .unwrap();
        if !balance.is_zero() {
            store
                .atomic_apply(&[LedgerOp::Credit {
                    wallet: wallet.id,
                    amount: balance,
                }])
                .unwrap();
        }
        (store, wallet)
    }

    fn payment_tx(from: WalletId, to: WalletId, amount: Amount, at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord::new(
            TxParties::Both { from, to },
            amount,
            TxKind::Payment,
            TxStatus::Completed,
            "test payment",
            Uuid::new_v4(),
            at,
        )
    }

    #[test]
    fn open_persistent_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        let wallet = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();
        drop(store);

        let store = LedgerStore::open(dir.path()).unwrap();
        let reloaded = store.get_wallet(wallet.id).unwrap();
        assert_eq!(reloaded, wallet);
    }

    #[test]
    fn credit_then_debit_roundtrip() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));

        store
            .atomic_apply(&[LedgerOp::Debit {
                wallet: wallet.id,
                amount: Amount::from_rupees(40),
            }])
            .unwrap();

        let after = store.get_wallet(wallet.id).unwrap();
        assert_eq!(after.balance, Amount::from_rupees(60));
    }

    #[test]
    fn overdraft_fails_whole_batch() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(10));
        let other = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();

        let tx = payment_tx(wallet.id, other.id, Amount::from_rupees(20), now());
        let result = store.atomic_apply(&[
            LedgerOp::Debit {
                wallet: wallet.id,
                amount: Amount::from_rupees(20),
            },
            LedgerOp::Credit {
                wallet: other.id,
                amount: Amount::from_rupees(20),
            },
            LedgerOp::InsertTransaction(tx.clone()),
        ]);

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        // Nothing landed: balances untouched, no transaction visible.
        assert_eq!(
            store.get_wallet(wallet.id).unwrap().balance,
            Amount::from_rupees(10)
        );
        assert_eq!(store.get_wallet(other.id).unwrap().balance, Amount::ZERO);
        assert!(matches!(
            store.get_transaction(tx.id),
            Err(LedgerError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn missing_wallet_fails_batch() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(10));
        let result = store.atomic_apply(&[
            LedgerOp::Debit {
                wallet: wallet.id,
                amount: Amount::from_rupees(5),
            },
            LedgerOp::Credit {
                wallet: Uuid::new_v4(),
                amount: Amount::from_rupees(5),
            },
        ]);
        assert!(matches!(result, Err(LedgerError::WalletNotFound(_))));
        assert_eq!(
            store.get_wallet(wallet.id).unwrap().balance,
            Amount::from_rupees(10)
        );
    }

    #[test]
    fn zero_amount_rejected() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(10));
        let result = store.atomic_apply(&[LedgerOp::Credit {
            wallet: wallet.id,
            amount: Amount::ZERO,
        }]);
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
    }

    #[test]
    fn batch_sees_its_own_intermediate_state() {
        // Debit and credit the same wallet in one batch: the second op
        // must observe the first one's effect.
        let (store, wallet) = store_with_wallet(Amount::from_rupees(10));
        store
            .atomic_apply(&[
                LedgerOp::Debit {
                    wallet: wallet.id,
                    amount: Amount::from_rupees(10),
                },
                LedgerOp::Credit {
                    wallet: wallet.id,
                    amount: Amount::from_rupees(3),
                },
            ])
            .unwrap();
        assert_eq!(
            store.get_wallet(wallet.id).unwrap().balance,
            Amount::from_rupees(3)
        );
    }

    #[test]
    fn insert_and_lookup_transaction() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));
        let other = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();
        let tx = payment_tx(wallet.id, other.id, Amount::from_rupees(25), now());

        store
            .atomic_apply(&[LedgerOp::InsertTransaction(tx.clone())])
            .unwrap();

        let found = store.get_transaction(tx.id).unwrap();
        assert_eq!(found, tx);

        let history = store.transactions_for_wallet(wallet.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, tx.id);
    }

    #[test]
    fn history_is_newest_first() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));
        let other = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();

        for minutes in [0i64, 5, 10] {
            let at = now() + chrono::Duration::minutes(minutes);
            let tx = payment_tx(wallet.id, other.id, Amount::from_rupees(1), at);
            store
                .atomic_apply(&[LedgerOp::InsertTransaction(tx)])
                .unwrap();
        }

        let history = store.transactions_for_wallet(wallet.id, 10).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].created_at > history[1].created_at);
        assert!(history[1].created_at > history[2].created_at);
    }

    #[test]
    fn finalize_transitions_once() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));
        let tx = TransactionRecord::new(
            TxParties::From { from: wallet.id },
            Amount::from_rupees(50),
            TxKind::Withdrawal,
            TxStatus::Pending,
            "Settlement Request",
            Uuid::new_v4(),
            now(),
        );
        store
            .atomic_apply(&[LedgerOp::InsertTransaction(tx.clone())])
            .unwrap();

        store
            .atomic_apply(&[LedgerOp::FinalizeTransaction {
                id: tx.id,
                status: TxStatus::Completed,
                note: Some("Settled by Admin".to_string()),
            }])
            .unwrap();

        let settled = store.get_transaction(tx.id).unwrap();
        assert_eq!(settled.status, TxStatus::Completed);
        assert_eq!(settled.description, "Settled by Admin");

        let again = store.atomic_apply(&[LedgerOp::FinalizeTransaction {
            id: tx.id,
            status: TxStatus::Completed,
            note: None,
        }]);
        assert!(matches!(again, Err(LedgerError::AlreadyTerminal(_))));
    }

    #[test]
    fn duplicate_gateway_ref_rejected() {
        let (store, wallet) = store_with_wallet(Amount::ZERO);
        let make = || {
            TransactionRecord::new(
                TxParties::To { to: wallet.id },
                Amount::from_rupees(500),
                TxKind::Deposit,
                TxStatus::Pending,
                "gateway order",
                Uuid::new_v4(),
                now(),
            )
            .with_gateway_ref("order_9001")
        };

        store
            .atomic_apply(&[LedgerOp::InsertTransaction(make())])
            .unwrap();
        let second = store.atomic_apply(&[LedgerOp::InsertTransaction(make())]);
        assert!(matches!(second, Err(LedgerError::Conflict)));

        let found = store.find_by_gateway_ref("order_9001").unwrap();
        assert!(found.is_some());
        assert!(store.find_by_gateway_ref("order_9002").unwrap().is_none());
    }

    #[test]
    fn spend_query_starts_at_the_window_and_is_inclusive() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));
        let other = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();

        let t0 = now();
        for (minutes, amount) in [(-30i64, 5u64), (0, 10), (30, 20), (90, 40)] {
            let tx = payment_tx(
                wallet.id,
                other.id,
                Amount::from_rupees(amount),
                t0 + chrono::Duration::minutes(minutes),
            );
            store
                .atomic_apply(&[LedgerOp::InsertTransaction(tx)])
                .unwrap();
        }

        // Everything from t0 onward counts, including the payment at
        // exactly t0; the one before the window start does not.
        let in_window = store.completed_payments_since(wallet.id, t0).unwrap();
        let total: u64 = in_window.iter().map(|t| t.amount.paise()).sum();
        assert_eq!(in_window.len(), 3);
        assert_eq!(total, Amount::from_rupees(70).paise());
    }

    #[test]
    fn ledger_stats_aggregate() {
        let (store, wallet) = store_with_wallet(Amount::from_rupees(100));
        let other = store
            .create_wallet(WalletOwner::User(Uuid::new_v4()), WalletKind::Vendor, now())
            .unwrap();
        let tx = payment_tx(wallet.id, other.id, Amount::from_rupees(25), now());
        store
            .atomic_apply(&[LedgerOp::InsertTransaction(tx)])
            .unwrap();

        let stats = store.ledger_stats().unwrap();
        assert_eq!(stats.wallets, 2);
        assert_eq!(stats.total_balance, Amount::from_rupees(100));
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.payments, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.completed_volume, Amount::from_rupees(25));
    }
}
