//! # Ledger Module — Wallets, Transactions & the Storage Engine
//!
//! The ledger is where money lives in CampusPay. Every balance and every
//! movement of value passes through this module; nothing else on the
//! platform is allowed to touch a wallet row.
//!
//! ```text
//! wallet.rs      — Balance holders: guardian, student, and vendor wallets
//! transaction.rs — Immutable ledger entries with a one-shot status lifecycle
//! store.rs       — sled-backed engine with the all-or-nothing batch primitive
//! ```
//!
//! ## Design Principles
//!
//! 1. **Balances never go negative.** Callers pre-validate; the store
//!    re-checks every debit as defense in depth and fails the whole batch.
//!
//! 2. **Transactions are append-mostly.** The single permitted mutation is
//!    the PENDING → COMPLETED/FAILED transition, exactly once, optionally
//!    annotating the description at that moment.
//!
//! 3. **Batches are all-or-nothing.** `atomic_apply` stages every
//!    operation against a consistent snapshot, validates, then commits —
//!    a reader never observes half of a batch.

pub mod store;
pub mod transaction;
pub mod wallet;

pub use store::{LedgerError, LedgerOp, LedgerStats, LedgerStore};
pub use transaction::{LineItem, TransactionRecord, TxKind, TxParties, TxStatus};
pub use wallet::{Wallet, WalletKind, WalletOwner};
