//! Identifier aliases and the authenticated principal.
//!
//! All entities are keyed by UUIDs. The aliases exist so that signatures
//! read as domain statements (`fn settle(admin: &Principal, tx: TransactionId)`)
//! rather than soups of `Uuid`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A wallet's primary key.
pub type WalletId = Uuid;

/// A ledger transaction's primary key.
pub type TransactionId = Uuid;

/// A user account's primary key (guardian, vendor, or admin — anyone who
/// authenticates through the fronting identity provider).
pub type UserId = Uuid;

/// A student's internal primary key. Distinct from the human-entered
/// college ID printed on the student's card (see `Student::external_id`).
pub type StudentId = Uuid;

/// A money request's primary key.
pub type RequestId = Uuid;

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// Role carried by an authenticated principal.
///
/// Students do not log in to spend — they authenticate per-payment with a
/// PIN or OTP at the vendor terminal. The `Student` role exists for the
/// companion app session (device registration, OTP issuance, money requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guardian,
    Vendor,
    Admin,
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guardian => write!(f, "GUARDIAN"),
            Self::Vendor => write!(f, "VENDOR"),
            Self::Admin => write!(f, "ADMIN"),
            Self::Student => write!(f, "STUDENT"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GUARDIAN" => Ok(Self::Guardian),
            "VENDOR" => Ok(Self::Vendor),
            "ADMIN" => Ok(Self::Admin),
            "STUDENT" => Ok(Self::Student),
            _ => Err(()),
        }
    }
}

/// An authenticated caller, as asserted by the fronting identity provider.
///
/// The core trusts this pair and performs its own authorization on top of
/// it (role equality, ownership checks). It never re-verifies the session
/// credential — only the per-payment PIN/OTP path re-authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The account id (for `Role::Student`, the student's internal id).
    pub id: Uuid,
    /// The caller's role.
    pub role: Role,
}

impl Principal {
    /// Convenience constructor.
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Role-equality gate. Every mutating core operation starts here.
    pub fn require(&self, role: Role) -> Result<(), crate::error::CoreError> {
        if self.role == role {
            Ok(())
        } else {
            Err(crate::error::CoreError::NotAuthorized("role mismatch"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_roundtrip() {
        for role in [Role::Guardian, Role::Vendor, Role::Admin, Role::Student] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!("guardian".parse::<Role>(), Ok(Role::Guardian));
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert!("superuser".parse::<Role>().is_err());
    }
}
