//! # Identity Module — PIN & OTP Verification
//!
//! Students never log in to spend. At the counter they prove who they are
//! with one of two credentials:
//!
//! ```text
//! pin.rs      — 4–6 digit PIN, bcrypt-hashed, set by the guardian
//! otp.rs      — single-use 6-digit code, 60 s TTL, issued to a registered device
//! device.rs   — the device registry that gates OTP issuance
//! verifier.rs — the facade the transfer engine talks to
//! ```
//!
//! The OTP contract is strict: one code per student at a time (issuing
//! overwrites), one use per code (validation deletes), and expiry is
//! evaluated lazily against the injected clock — no background sweeper.
//!
//! Device registration trusts the caller: the mobile app performs its
//! biometric gate *before* calling in, and this module only records the
//! binding. What it will not do is issue an OTP to a student with no
//! registered device.

pub mod device;
pub mod otp;
pub mod pin;
pub mod verifier;

pub use device::{DeviceRecord, DeviceRegistry};
pub use otp::{IssuedOtp, OtpError, OtpStore};
pub use verifier::IdentityVerifier;
