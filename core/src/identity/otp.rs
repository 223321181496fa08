//! Single-use OTP issuance and validation.
//!
//! Codes are keyed by the student's *external* id — the one the vendor
//! types at the terminal — and carry the internal id as the validation
//! payload, so a successful validation hands the engine exactly the
//! student it authenticated.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config;
use crate::ids::StudentId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a code failed to validate. The distinctions matter operationally:
/// `NoCode` after a success is the single-use guarantee working, `Expired`
/// means the handoff took too long, `Mismatch` is a typo or a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("no active code for this student")]
    NoCode,
    #[error("code expired")]
    Expired,
    #[error("code mismatch")]
    Mismatch,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What issuance hands back to the student's device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedOtp {
    /// The 6-digit numeric code.
    pub code: String,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    student: StudentId,
    expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// OtpStore
// ---------------------------------------------------------------------------

/// Ephemeral OTP state: external student id → active code.
///
/// Backed by an in-process concurrent map. Expiry is evaluated lazily at
/// validation time against the injected clock, so there is no sweeper
/// thread and tests never sleep. A crash loses outstanding codes, which
/// is exactly the right failure mode for a 60-second credential.
pub struct OtpStore {
    entries: DashMap<String, OtpEntry>,
    clock: Arc<dyn Clock>,
}

impl OtpStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Issues a fresh code for the student, overwriting any prior
    /// unconsumed code — at most one code is live per student.
    pub fn issue(&self, external_id: &str, student: StudentId) -> IssuedOtp {
        let code = generate_code();
        let expires_at = self.clock.now()
            + Duration::from_std(config::OTP_TTL).expect("OTP_TTL fits in chrono::Duration");

        self.entries.insert(
            external_id.to_string(),
            OtpEntry {
                code: code.clone(),
                student,
                expires_at,
            },
        );

        IssuedOtp { code, expires_at }
    }

    /// Validates and consumes a code.
    ///
    /// Success removes the entry, so an immediate replay of the same code
    /// fails with [`OtpError::NoCode`] even inside the TTL. Expired
    /// entries are removed on sight. A mismatch leaves the entry in place
    /// — a typo at the counter shouldn't force reissuing.
    pub fn validate(&self, external_id: &str, code: &str) -> Result<StudentId, OtpError> {
        // Clone out of the map so no shard lock is held across the
        // remove calls below.
        let Some(entry) = self.entries.get(external_id).map(|e| e.value().clone()) else {
            return Err(OtpError::NoCode);
        };

        if self.clock.now() >= entry.expires_at {
            self.entries.remove(external_id);
            return Err(OtpError::Expired);
        }

        if entry.code != code {
            return Err(OtpError::Mismatch);
        }

        self.entries.remove(external_id);
        Ok(entry.student)
    }
}

/// A uniformly random 6-digit code, zero-padding excluded by construction
/// (the range starts at 100000, matching what the terminal keypad expects).
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(100_000..1_000_000u32).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn setup() -> (OtpStore, ManualClock) {
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let store = OtpStore::new(Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn issue_then_validate_succeeds_once() {
        let (store, _clock) = setup();
        let student = Uuid::new_v4();

        let issued = store.issue("STU-001", student);
        assert_eq!(issued.code.len(), 6);

        assert_eq!(store.validate("STU-001", &issued.code), Ok(student));
        // Single-use: the same code is gone immediately.
        assert_eq!(
            store.validate("STU-001", &issued.code),
            Err(OtpError::NoCode)
        );
    }

    #[test]
    fn expired_code_is_rejected_and_removed() {
        let (store, clock) = setup();
        let issued = store.issue("STU-001", Uuid::new_v4());

        clock.advance(Duration::seconds(61));
        assert_eq!(
            store.validate("STU-001", &issued.code),
            Err(OtpError::Expired)
        );
        // Entry was purged; subsequent attempts see NoCode.
        assert_eq!(
            store.validate("STU-001", &issued.code),
            Err(OtpError::NoCode)
        );
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let (store, clock) = setup();
        let issued = store.issue("STU-001", Uuid::new_v4());

        // At exactly expires_at the code is dead (`now >= expires_at`).
        clock.set(issued.expires_at);
        assert_eq!(
            store.validate("STU-001", &issued.code),
            Err(OtpError::Expired)
        );
    }

    #[test]
    fn mismatch_keeps_the_code_alive() {
        let (store, _clock) = setup();
        let student = Uuid::new_v4();
        let issued = store.issue("STU-001", student);

        let wrong = if issued.code == "123456" { "654321" } else { "123456" };
        assert_eq!(store.validate("STU-001", wrong), Err(OtpError::Mismatch));
        // The real code still works after a typo.
        assert_eq!(store.validate("STU-001", &issued.code), Ok(student));
    }

    #[test]
    fn reissue_overwrites_prior_code() {
        let (store, _clock) = setup();
        let student = Uuid::new_v4();

        let first = store.issue("STU-001", student);
        let second = store.issue("STU-001", student);

        if first.code != second.code {
            assert_eq!(
                store.validate("STU-001", &first.code),
                Err(OtpError::Mismatch)
            );
        }
        assert_eq!(store.validate("STU-001", &second.code), Ok(student));
    }

    #[test]
    fn unknown_student_has_no_code() {
        let (store, _clock) = setup();
        assert_eq!(store.validate("STU-404", "123456"), Err(OtpError::NoCode));
    }
}
