//! The identity verifier facade.
//!
//! One handle owning the OTP store and the device registry, plus
//! pass-throughs to the PIN functions. The transfer engine and the API
//! layer depend on this type rather than the parts.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::device::DeviceRegistry;
use super::otp::{IssuedOtp, OtpError, OtpStore};
use super::pin;
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::ids::StudentId;

/// Validates student credentials and owns their ephemeral state.
pub struct IdentityVerifier {
    otp: OtpStore,
    devices: DeviceRegistry,
}

impl IdentityVerifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            otp: OtpStore::new(clock),
            devices: DeviceRegistry::new(),
        }
    }

    // -- Devices ------------------------------------------------------------

    /// Records a device binding. The caller has already passed the
    /// device-level biometric gate; nothing further is verified here.
    pub fn register_device(
        &self,
        device_key: &str,
        student: StudentId,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.devices.register(device_key, student, device_name, now);
    }

    /// Whether the student has any registered device.
    pub fn has_device(&self, student: StudentId) -> bool {
        self.devices.has_device(student)
    }

    // -- OTP ----------------------------------------------------------------

    /// Issues an OTP for the student, gated on the presented device key
    /// being bound to them.
    pub fn issue_otp(
        &self,
        device_key: &str,
        external_id: &str,
        student: StudentId,
    ) -> CoreResult<IssuedOtp> {
        if !self.devices.is_bound(device_key, student) {
            return Err(CoreError::DeviceNotRegistered);
        }
        Ok(self.otp.issue(external_id, student))
    }

    /// Validates (and consumes) an OTP presented at a vendor terminal.
    pub fn validate_otp(&self, external_id: &str, code: &str) -> Result<StudentId, OtpError> {
        self.otp.validate(external_id, code)
    }

    // -- PIN ----------------------------------------------------------------

    /// Checks a candidate PIN against the stored hash. `Ok(false)` means
    /// mismatch; the caller audits and reports.
    pub fn verify_pin(&self, pin: &str, pin_hash: &str) -> CoreResult<bool> {
        pin::verify_pin(pin, pin_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn setup() -> (IdentityVerifier, ManualClock) {
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let verifier = IdentityVerifier::new(Arc::new(clock.clone()));
        (verifier, clock)
    }

    #[test]
    fn otp_requires_registered_device() {
        let (verifier, clock) = setup();
        let student = Uuid::new_v4();

        let denied = verifier.issue_otp("unknown-device", "STU-001", student);
        assert!(matches!(denied, Err(CoreError::DeviceNotRegistered)));

        verifier.register_device("phone-1", student, Some("phone"), clock.now());
        let issued = verifier.issue_otp("phone-1", "STU-001", student).unwrap();
        assert_eq!(
            verifier.validate_otp("STU-001", &issued.code),
            Ok(student)
        );
    }

    #[test]
    fn device_bound_to_other_student_does_not_qualify() {
        let (verifier, clock) = setup();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();

        verifier.register_device("phone-1", owner, None, clock.now());
        let denied = verifier.issue_otp("phone-1", "STU-002", intruder);
        assert!(matches!(denied, Err(CoreError::DeviceNotRegistered)));
    }
}
