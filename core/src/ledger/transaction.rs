//! Transaction — the immutable ledger entry.
//!
//! Every balance movement produces exactly one record. Records are never
//! deleted and, once terminal, never mutated — with one deliberate
//! exception: the description may be annotated at the moment a PENDING
//! record resolves (gateway payment reference, settlement note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ids::{TransactionId, UserId, WalletId};
use crate::money::Amount;

// ---------------------------------------------------------------------------
// TxKind
// ---------------------------------------------------------------------------

/// Discriminant for the operation a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// External funds entering a guardian wallet.
    Deposit,
    /// Guardian wallet → student wallet.
    Transfer,
    /// Student wallet → vendor wallet, at the counter.
    Payment,
    /// Vendor wallet → outside world, via the settlement workflow.
    Withdrawal,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Transfer => write!(f, "TRANSFER"),
            Self::Payment => write!(f, "PAYMENT"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// TxStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a transaction.
///
/// `Pending` may transition to `Completed` or `Failed` exactly once.
/// Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// In flight: a gateway order awaiting confirmation, or a withdrawal
    /// awaiting administrative settlement.
    Pending,
    /// Finalized successfully.
    Completed,
    /// Finalized unsuccessfully (e.g. gateway signature rejection).
    Failed,
}

impl TxStatus {
    /// Returns `true` for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// TxParties
// ---------------------------------------------------------------------------

/// The wallets involved in a transaction.
///
/// "At least one of from/to must be set" is a constructor-level fact here:
/// there is no arm with neither. Deposits have only a destination,
/// withdrawals only a source, transfers and payments both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxParties {
    /// Money left this wallet for the outside world.
    From {
        /// The debited wallet.
        from: WalletId,
    },
    /// Money arrived into this wallet from the outside world.
    To {
        /// The credited wallet.
        to: WalletId,
    },
    /// Money moved between two platform wallets.
    Both {
        /// The debited wallet.
        from: WalletId,
        /// The credited wallet.
        to: WalletId,
    },
}

impl TxParties {
    /// The debited wallet, if any.
    pub fn from_wallet(&self) -> Option<WalletId> {
        match self {
            Self::From { from } | Self::Both { from, .. } => Some(*from),
            Self::To { .. } => None,
        }
    }

    /// The credited wallet, if any.
    pub fn to_wallet(&self) -> Option<WalletId> {
        match self {
            Self::To { to } | Self::Both { to, .. } => Some(*to),
            Self::From { .. } => None,
        }
    }

    /// Returns `true` if the wallet appears on either side.
    pub fn involves(&self, wallet: WalletId) -> bool {
        self.from_wallet() == Some(wallet) || self.to_wallet() == Some(wallet)
    }
}

// ---------------------------------------------------------------------------
// LineItem
// ---------------------------------------------------------------------------

/// One line of an itemized cart payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Menu item reference, when the vendor billed from their menu.
    pub menu_item_id: Option<Uuid>,
    /// Item name as billed.
    pub name: String,
    /// Unit price.
    pub unit_price: Amount,
    /// Quantity purchased. Always ≥ 1.
    pub quantity: u32,
}

impl LineItem {
    /// `unit_price × quantity`, `None` on overflow.
    pub fn line_total(&self) -> Option<Amount> {
        self.unit_price.checked_mul(self.quantity)
    }
}

// ---------------------------------------------------------------------------
// TransactionRecord
// ---------------------------------------------------------------------------

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Primary key.
    pub id: TransactionId,
    /// The wallets on either side of the movement.
    pub parties: TxParties,
    /// The amount moved. Always > 0.
    pub amount: Amount,
    /// The operation class.
    pub kind: TxKind,
    /// Lifecycle state.
    pub status: TxStatus,
    /// Human-readable context ("Chai x2, Samosa x1", "Settled by Admin").
    pub description: String,
    /// The authenticated principal that initiated the movement.
    pub initiated_by: UserId,
    /// External gateway order reference, for deposit idempotency. The
    /// store indexes this so a duplicate gateway callback can be detected
    /// before any credit happens.
    pub gateway_ref: Option<String>,
    /// Itemized cart lines, when the payment was billed per item.
    pub items: Vec<LineItem>,
    /// Creation instant. Also the timestamp the daily-limit window uses.
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Creates a new record. Use the builder-style setters for the
    /// optional fields.
    pub fn new(
        parties: TxParties,
        amount: Amount,
        kind: TxKind,
        status: TxStatus,
        description: impl Into<String>,
        initiated_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parties,
            amount,
            kind,
            status,
            description: description.into(),
            initiated_by,
            gateway_ref: None,
            items: Vec::new(),
            created_at: now,
        }
    }

    /// Attaches a gateway order reference.
    pub fn with_gateway_ref(mut self, reference: impl Into<String>) -> Self {
        self.gateway_ref = Some(reference.into());
        self
    }

    /// Attaches itemized cart lines.
    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    /// Applies the one permitted mutation: PENDING → terminal, annotating
    /// the description if a note is supplied.
    ///
    /// Returns `false` (and changes nothing) if the record is already
    /// terminal or the target status is not terminal.
    pub fn finalize(&mut self, status: TxStatus, note: Option<&str>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        if let Some(note) = note {
            self.description = note.to_string();
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample(status: TxStatus) -> TransactionRecord {
        TransactionRecord::new(
            TxParties::Both {
                from: Uuid::new_v4(),
                to: Uuid::new_v4(),
            },
            Amount::from_rupees(150),
            TxKind::Payment,
            status,
            "Canteen purchase",
            Uuid::new_v4(),
            now(),
        )
    }

    #[test]
    fn parties_expose_both_sides() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();

        let both = TxParties::Both { from, to };
        assert_eq!(both.from_wallet(), Some(from));
        assert_eq!(both.to_wallet(), Some(to));
        assert!(both.involves(from));
        assert!(both.involves(to));
        assert!(!both.involves(Uuid::new_v4()));

        let deposit = TxParties::To { to };
        assert_eq!(deposit.from_wallet(), None);
        assert_eq!(deposit.to_wallet(), Some(to));

        let withdrawal = TxParties::From { from };
        assert_eq!(withdrawal.to_wallet(), None);
        assert_eq!(withdrawal.from_wallet(), Some(from));
    }

    #[test]
    fn finalize_resolves_pending_exactly_once() {
        let mut tx = sample(TxStatus::Pending);

        assert!(tx.finalize(TxStatus::Completed, Some("Settled by Admin")));
        assert_eq!(tx.status, TxStatus::Completed);
        assert_eq!(tx.description, "Settled by Admin");

        // Terminal records are immutable.
        assert!(!tx.finalize(TxStatus::Failed, Some("too late")));
        assert_eq!(tx.status, TxStatus::Completed);
        assert_eq!(tx.description, "Settled by Admin");
    }

    #[test]
    fn finalize_rejects_pending_as_target() {
        let mut tx = sample(TxStatus::Pending);
        assert!(!tx.finalize(TxStatus::Pending, None));
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[test]
    fn finalize_without_note_keeps_description() {
        let mut tx = sample(TxStatus::Pending);
        assert!(tx.finalize(TxStatus::Failed, None));
        assert_eq!(tx.description, "Canteen purchase");
    }

    #[test]
    fn line_totals_are_checked() {
        let item = LineItem {
            menu_item_id: None,
            name: "Chai".to_string(),
            unit_price: Amount::from_rupees(15),
            quantity: 3,
        };
        assert_eq!(item.line_total(), Some(Amount::from_rupees(45)));

        let absurd = LineItem {
            unit_price: Amount::from_paise(u64::MAX),
            quantity: 2,
            ..item
        };
        assert_eq!(absurd.line_total(), None);
    }

    #[test]
    fn status_terminality() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(TxStatus::Completed.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
    }

    #[test]
    fn serde_roundtrip_with_items() {
        let tx = sample(TxStatus::Completed).with_items(vec![LineItem {
            menu_item_id: Some(Uuid::new_v4()),
            name: "Samosa".to_string(),
            unit_price: Amount::from_rupees(12),
            quantity: 2,
        }]);
        let bytes = bincode::serialize(&tx).unwrap();
        let recovered: TransactionRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(recovered, tx);
    }
}
