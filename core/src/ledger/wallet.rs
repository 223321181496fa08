//! Wallet — the balance holder.
//!
//! A wallet belongs to exactly one owner: a user account (guardian or
//! vendor) or a student. Ownership is an enum, so "exactly one of the two"
//! is a shape the type system enforces rather than a runtime hope. Wallets
//! are created alongside their owner and never deleted; balances are only
//! ever mutated through [`LedgerStore::atomic_apply`](super::store::LedgerStore::atomic_apply).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ids::{StudentId, UserId, WalletId};
use crate::money::{Amount, Currency};

// ---------------------------------------------------------------------------
// WalletKind
// ---------------------------------------------------------------------------

/// Which side of the platform a wallet sits on.
///
/// The kind determines which operations may touch the wallet: deposits land
/// on guardian wallets, payments debit student wallets, withdrawals debit
/// vendor wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    /// Funded from outside via the payment gateway; source of transfers.
    Guardian,
    /// Spend-only sub-wallet, funded by a guardian.
    Student,
    /// Receives payments; drained by the settlement workflow.
    Vendor,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guardian => write!(f, "GUARDIAN"),
            Self::Student => write!(f, "STUDENT"),
            Self::Vendor => write!(f, "VENDOR"),
        }
    }
}

// ---------------------------------------------------------------------------
// WalletOwner
// ---------------------------------------------------------------------------

/// The owning principal of a wallet — exactly one of a user account or a
/// student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletOwner {
    /// A guardian or vendor account from the identity provider.
    User(UserId),
    /// A student (non-authenticating principal).
    Student(StudentId),
}

impl WalletOwner {
    /// Returns the owner's id regardless of which arm it is.
    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) => *id,
            Self::Student(id) => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A balance-holding account.
///
/// The `balance ≥ 0` invariant is maintained jointly: the transfer engine
/// pre-checks every debit inside the wallet's critical section, and the
/// store re-checks when applying the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Primary key.
    pub id: WalletId,
    /// The single owning principal.
    pub owner: WalletOwner,
    /// Which side of the platform this wallet serves.
    pub kind: WalletKind,
    /// Current balance. Never negative.
    pub balance: Amount,
    /// Denomination of the balance.
    pub currency: Currency,
    /// When the wallet was created.
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates a new empty wallet for the given owner.
    pub fn new(owner: WalletOwner, kind: WalletKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            kind,
            balance: Amount::ZERO,
            currency: Currency::Inr,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
