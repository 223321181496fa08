//! # Audit Log — Append-Only Action Trail
//!
//! Every security- and finance-relevant action leaves an entry here:
//! who did what, to which entity, from where, and when. Entries are never
//! mutated or deleted through normal operation.
//!
//! ## Best-Effort by Design
//!
//! [`AuditLog::record`] never fails from the caller's perspective. A
//! payment that committed must stay committed even if the audit write
//! hits a disk error — the failure goes to the operational log channel
//! (`tracing::error!`) and the financial result stands. This is why audit
//! writes happen *after* the ledger batch commits, outside the wallet
//! critical section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config;
use crate::error::CoreResult;
use crate::ledger::store::LedgerStore;

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// Action codes, rendered as stable SCREAMING_SNAKE strings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    MoneyAdded,
    WalletRecharge,
    MoneyTransferred,
    VendorPayment,
    FailedPinAttempt,
    FailedOtpAttempt,
    WithdrawalRequested,
    SettlementApproved,
    StudentCreated,
    StudentPinUpdated,
    StudentStatusUpdated,
    SpendingLimitSet,
    DeviceRegistered,
    OtpGenerated,
    VendorRegistered,
    VendorApproved,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::MoneyAdded => "MONEY_ADDED",
            Self::WalletRecharge => "WALLET_RECHARGE",
            Self::MoneyTransferred => "MONEY_TRANSFERRED",
            Self::VendorPayment => "VENDOR_PAYMENT",
            Self::FailedPinAttempt => "FAILED_PIN_ATTEMPT",
            Self::FailedOtpAttempt => "FAILED_OTP_ATTEMPT",
            Self::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            Self::SettlementApproved => "SETTLEMENT_APPROVED",
            Self::StudentCreated => "STUDENT_CREATED",
            Self::StudentPinUpdated => "STUDENT_PIN_UPDATED",
            Self::StudentStatusUpdated => "STUDENT_STATUS_UPDATED",
            Self::SpendingLimitSet => "SPENDING_LIMIT_SET",
            Self::DeviceRegistered => "DEVICE_REGISTERED",
            Self::OtpGenerated => "OTP_GENERATED",
            Self::VendorRegistered => "VENDOR_REGISTERED",
            Self::VendorApproved => "VENDOR_APPROVED",
        };
        write!(f, "{code}")
    }
}

impl AuditAction {
    /// Every action code, for filter parsing and exhaustive displays.
    pub const ALL: [AuditAction; 16] = [
        Self::MoneyAdded,
        Self::WalletRecharge,
        Self::MoneyTransferred,
        Self::VendorPayment,
        Self::FailedPinAttempt,
        Self::FailedOtpAttempt,
        Self::WithdrawalRequested,
        Self::SettlementApproved,
        Self::StudentCreated,
        Self::StudentPinUpdated,
        Self::StudentStatusUpdated,
        Self::SpendingLimitSet,
        Self::DeviceRegistered,
        Self::OtpGenerated,
        Self::VendorRegistered,
        Self::VendorApproved,
    ];
}

impl std::str::FromStr for AuditAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.to_string() == s)
            .ok_or(())
    }
}

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// The entity class an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Student,
    Wallet,
    Transaction,
    WalletRule,
    Vendor,
    MoneyRequest,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Student => "STUDENT",
            Self::Wallet => "WALLET",
            Self::Transaction => "TRANSACTION",
            Self::WalletRule => "WALLET_RULE",
            Self::Vendor => "VENDOR",
            Self::MoneyRequest => "MONEY_REQUEST",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// One append-only record of a security or financial action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Primary key.
    pub id: Uuid,
    /// What happened.
    pub action: AuditAction,
    /// Who did it (principal id; for failed attempts, the vendor that
    /// submitted the credential).
    pub actor: Uuid,
    /// What class of entity it happened to.
    pub entity_type: EntityType,
    /// The affected entity's id. A string because it can carry either an
    /// internal UUID or a human-entered external student id.
    pub entity_id: String,
    /// JSON-serialized detail blob. Stored as a string so the storage
    /// layer never has to interpret it.
    pub details: String,
    /// Origin address of the request, when the transport knows it.
    pub origin: Option<String>,
    /// When the action happened.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AuditQuery
// ---------------------------------------------------------------------------

/// Filters for reading the trail. All optional; unset means "any".
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Page size. Zero means the default; values above the hard cap are
    /// clamped.
    pub limit: usize,
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// The audit trail service.
pub struct AuditLog {
    store: Arc<LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(store: Arc<LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an entry. Infallible from the caller's view: persistence
    /// failures are reported on the operational log channel and swallowed,
    /// so the originating financial operation is never unwound.
    pub fn record(
        &self,
        action: AuditAction,
        actor: Uuid,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: serde_json::Value,
        origin: Option<&str>,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action,
            actor,
            entity_type,
            entity_id: entity_id.into(),
            details: details.to_string(),
            origin: origin.map(str::to_string),
            created_at: self.clock.now(),
        };

        if let Err(err) = self.store.append_audit(&entry) {
            tracing::error!(
                action = %entry.action,
                actor = %entry.actor,
                error = %err,
                "failed to persist audit entry"
            );
        }
    }

    /// Read the trail, newest first, with filters applied.
    pub fn query(&self, query: &AuditQuery) -> CoreResult<Vec<AuditEntry>> {
        let limit = match query.limit {
            0 => config::DEFAULT_AUDIT_LIMIT,
            n => n.min(config::MAX_AUDIT_LIMIT),
        };

        let entries = self.store.audit_entries_rev()?;
        Ok(entries
            .into_iter()
            .filter(|e| query.actor.map_or(true, |a| e.actor == a))
            .filter(|e| query.action.map_or(true, |a| e.action == a))
            .filter(|e| query.entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| query.from.map_or(true, |t| e.created_at >= t))
            .filter(|e| query.to.map_or(true, |t| e.created_at <= t))
            .take(limit)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
