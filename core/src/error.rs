//! # Core Error Taxonomy
//!
//! One enum for every failure a caller of the core can observe. Variants
//! are *kinds*, not exception classes: the presentation layer switches on
//! [`CoreError::code`] to produce structured, machine-readable responses,
//! and clients never have to parse prose.
//!
//! Propagation policy:
//!
//! - Financial-state errors are returned synchronously, never swallowed.
//! - Storage conflicts are retried internally once before surfacing as
//!   [`CoreError::Conflict`].
//! - Audit-log write failures are *not* here — they go to the operational
//!   log channel and never fail the originating operation.

use thiserror::Error;

use crate::ledger::store::LedgerError;
use crate::money::Amount;

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;

/// Every failure kind the core surfaces to its callers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced entity does not exist.
    #[error("{entity} not found")]
    NotFound {
        /// Which entity class was missing ("wallet", "student", ...).
        entity: &'static str,
    },

    /// The caller's role or ownership does not permit the operation.
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),

    /// A debit would exceed the available balance.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the check.
        available: Amount,
        /// Amount the operation asked for.
        requested: Amount,
    },

    /// The proposed payment would breach the wallet's daily spending limit.
    /// Carries both figures so clients can render "₹150 of ₹200 spent".
    #[error("daily spending limit exceeded: limit {daily_limit}, spent today {spent_today}")]
    DailyLimitExceeded {
        /// The configured daily ceiling.
        daily_limit: Amount,
        /// COMPLETED payment volume since local midnight.
        spent_today: Amount,
    },

    /// PIN or OTP verification failed. Always audited before being returned.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// OTP issuance requires a prior device registration.
    #[error("device not registered")]
    DeviceNotRegistered,

    /// The student account is blocked by their guardian.
    #[error("student account is blocked")]
    StudentBlocked,

    /// The vendor has not been approved by an administrator.
    #[error("vendor not approved")]
    VendorNotApproved,

    /// Double resolution of a terminal entity (money request, gateway
    /// deposit confirmation).
    #[error("already processed")]
    AlreadyProcessed,

    /// Settlement was attempted on a transaction that is not a PENDING
    /// withdrawal.
    #[error("invalid transaction for settlement")]
    InvalidTransaction,

    /// Storage-level concurrent modification, surfaced after the internal
    /// retry was exhausted.
    #[error("storage conflict, retry the operation")]
    Conflict,

    /// Malformed input: bad amount, bad PIN format, oversized cart.
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage or serialization failure underneath the ledger.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::NotAuthorized(_) => "NOT_AUTHORIZED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::DeviceNotRegistered => "DEVICE_NOT_REGISTERED",
            Self::StudentBlocked => "STUDENT_BLOCKED",
            Self::VendorNotApproved => "VENDOR_NOT_APPROVED",
            Self::AlreadyProcessed => "ALREADY_PROCESSED",
            Self::InvalidTransaction => "INVALID_TRANSACTION",
            Self::Conflict => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(_) => Self::NotFound { entity: "wallet" },
            LedgerError::TransactionNotFound(_) => Self::NotFound {
                entity: "transaction",
            },
            LedgerError::InsufficientFunds {
                available,
                requested,
                ..
            } => Self::InsufficientFunds {
                available,
                requested,
            },
            LedgerError::AlreadyTerminal(_) => Self::AlreadyProcessed,
            LedgerError::BalanceOverflow(_) => {
                Self::Validation("balance overflow".to_string())
            }
            LedgerError::ZeroAmount => {
                Self::Validation("zero-amount operations are not permitted".to_string())
            }
            LedgerError::Conflict => Self::Conflict,
            LedgerError::Storage(e) => Self::Storage(e.to_string()),
            LedgerError::Serialization(msg) => Self::Storage(msg),
        }
    }
}
