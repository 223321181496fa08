//! # Money Requests — the Guardian-Approval Workflow
//!
//! A student asks for money; their guardian approves or rejects. PENDING
//! is the only non-terminal state and resolution happens exactly once.
//! Approval is the interesting transition: it triggers a guardian →
//! student transfer, and the APPROVED mark commits in the *same atomic
//! batch* as the ledger mutation — there is no window where the money
//! moved but the request still looks open, or vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::directory::Directory;
use crate::engine::TransferEngine;
use crate::error::{CoreError, CoreResult};
use crate::ids::{Principal, RequestId, Role, StudentId, UserId};
use crate::ledger::store::{LedgerOp, LedgerStore};
use crate::money::Amount;

// ---------------------------------------------------------------------------
// MoneyRequest
// ---------------------------------------------------------------------------

/// Lifecycle state. `Pending` resolves to exactly one of the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A student's ask for funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyRequest {
    pub id: RequestId,
    pub student: StudentId,
    pub amount: Amount,
    pub reason: Option<String>,
    pub status: RequestStatus,
    /// The guardian that resolved the request, once terminal.
    pub reviewed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RequestWorkflow
// ---------------------------------------------------------------------------

/// Tracks money requests and resolves approvals into transfers.
pub struct RequestWorkflow {
    ledger: Arc<LedgerStore>,
    directory: Arc<Directory>,
    engine: Arc<TransferEngine>,
    clock: Arc<dyn Clock>,
}

impl RequestWorkflow {
    pub fn new(
        ledger: Arc<LedgerStore>,
        directory: Arc<Directory>,
        engine: Arc<TransferEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            directory,
            engine,
            clock,
        }
    }

    /// Student files a request. No ledger effect.
    pub fn create(
        &self,
        student: &Principal,
        amount: Amount,
        reason: Option<&str>,
    ) -> CoreResult<MoneyRequest> {
        student.require(Role::Student)?;
        if amount.is_zero() {
            return Err(CoreError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        let record = self.directory.student(student.id)?;

        let request = MoneyRequest {
            id: Uuid::new_v4(),
            student: record.id,
            amount,
            reason: reason.map(str::to_string),
            status: RequestStatus::Pending,
            reviewed_by: None,
            created_at: self.clock.now(),
        };
        self.ledger.put_request(&request)?;
        Ok(request)
    }

    /// Guardian approves: ownership check, PENDING check, funds check,
    /// then the transfer and the APPROVED mark in one atomic batch.
    pub fn approve(&self, guardian: &Principal, request_id: RequestId) -> CoreResult<MoneyRequest> {
        guardian.require(Role::Guardian)?;

        let request = self
            .ledger
            .get_request(request_id)?
            .ok_or(CoreError::NotFound { entity: "request" })?;
        if request.status.is_terminal() {
            return Err(CoreError::AlreadyProcessed);
        }

        let student = self.directory.student(request.student)?;
        if student.guardian != guardian.id {
            return Err(CoreError::NotAuthorized("not this student's guardian"));
        }

        let approved = MoneyRequest {
            status: RequestStatus::Approved,
            reviewed_by: Some(guardian.id),
            ..request.clone()
        };
        let description = match &request.reason {
            Some(reason) => format!("Request Approved: {reason}"),
            None => "Request Approved".to_string(),
        };

        // Funds are checked (and the balance debited) inside the engine's
        // critical section; the request flip rides the same batch.
        self.engine.execute_guardian_transfer(
            guardian.id,
            &student,
            request.amount,
            description,
            vec![LedgerOp::PutRequest(approved.clone())],
        )?;

        Ok(approved)
    }

    /// Guardian rejects: terminal mark, no ledger effect.
    pub fn reject(&self, guardian: &Principal, request_id: RequestId) -> CoreResult<MoneyRequest> {
        guardian.require(Role::Guardian)?;

        let request = self
            .ledger
            .get_request(request_id)?
            .ok_or(CoreError::NotFound { entity: "request" })?;
        if request.status.is_terminal() {
            return Err(CoreError::AlreadyProcessed);
        }

        let student = self.directory.student(request.student)?;
        if student.guardian != guardian.id {
            return Err(CoreError::NotAuthorized("not this student's guardian"));
        }

        let rejected = MoneyRequest {
            status: RequestStatus::Rejected,
            reviewed_by: Some(guardian.id),
            ..request
        };
        self.ledger.put_request(&rejected)?;
        Ok(rejected)
    }

    /// The student's own requests, newest first.
    pub fn list_for_student(&self, student: &Principal) -> CoreResult<Vec<MoneyRequest>> {
        student.require(Role::Student)?;
        Ok(self
            .ledger
            .list_requests()?
            .into_iter()
            .filter(|r| r.student == student.id)
            .collect())
    }

    /// Requests from any of the guardian's students, newest first.
    pub fn list_for_guardian(&self, guardian: &Principal) -> CoreResult<Vec<MoneyRequest>> {
        guardian.require(Role::Guardian)?;
        let students: Vec<StudentId> = self
            .directory
            .students_of(guardian.id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(self
            .ledger
            .list_requests()?
            .into_iter()
            .filter(|r| students.contains(&r.student))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
//
// Workflow tests need the full engine wiring and live in `tests/e2e.rs`;
// the unit tests here cover the plain data rules.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_open_state() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_display_matches_wire_codes() {
        assert_eq!(RequestStatus::Pending.to_string(), "PENDING");
        assert_eq!(RequestStatus::Approved.to_string(), "APPROVED");
        assert_eq!(RequestStatus::Rejected.to_string(), "REJECTED");
    }

    #[test]
    fn serde_roundtrip() {
        let request = MoneyRequest {
            id: Uuid::new_v4(),
            student: Uuid::new_v4(),
            amount: Amount::from_rupees(250),
            reason: Some("field trip".to_string()),
            status: RequestStatus::Pending,
            reviewed_by: None,
            created_at: Utc::now(),
        };
        let bytes = bincode::serialize(&request).unwrap();
        let recovered: MoneyRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(recovered, request);
    }
}
