//! Device registry — the gate in front of OTP issuance.
//!
//! A student's device key is bound to their internal id when the mobile
//! app completes its biometric enrollment. Issuance later requires the
//! presented device key to be bound to the requesting student; nothing
//! else secret is involved at registration time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::ids::StudentId;

/// One registered device binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// The student the device belongs to.
    pub student: StudentId,
    /// Friendly name reported by the app ("Ravi's phone").
    pub device_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// In-process device-key → binding map.
///
/// Re-registering a key overwrites the prior binding, which is what you
/// want when a phone is handed down to a sibling.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a device key to a student.
    pub fn register(
        &self,
        device_key: &str,
        student: StudentId,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.devices.insert(
            device_key.to_string(),
            DeviceRecord {
                student,
                device_name: device_name.map(str::to_string),
                registered_at: now,
            },
        );
    }

    /// Is this exact key bound to this exact student?
    pub fn is_bound(&self, device_key: &str, student: StudentId) -> bool {
        self.devices
            .get(device_key)
            .map_or(false, |record| record.student == student)
    }

    /// Does the student have any registered device at all?
    pub fn has_device(&self, student: StudentId) -> bool {
        self.devices.iter().any(|entry| entry.student == student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn register_and_check_binding() {
        let registry = DeviceRegistry::new();
        let student = Uuid::new_v4();

        assert!(!registry.has_device(student));
        registry.register("device-abc", student, Some("Ravi's phone"), now());

        assert!(registry.is_bound("device-abc", student));
        assert!(registry.has_device(student));
        assert!(!registry.is_bound("device-abc", Uuid::new_v4()));
        assert!(!registry.is_bound("device-xyz", student));
    }

    #[test]
    fn reregistration_rebinds_the_key() {
        let registry = DeviceRegistry::new();
        let older = Uuid::new_v4();
        let younger = Uuid::new_v4();

        registry.register("family-phone", older, None, now());
        registry.register("family-phone", younger, None, now());

        assert!(!registry.is_bound("family-phone", older));
        assert!(registry.is_bound("family-phone", younger));
    }
}
