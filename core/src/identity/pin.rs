//! PIN hashing and verification.
//!
//! PINs are short numeric secrets chosen by guardians, which makes the
//! hash function do the heavy lifting: bcrypt with a real work factor, so
//! a leaked store doesn't turn into a 10⁴–10⁶ dictionary sprint. Plaintext
//! PINs exist only transiently in request payloads — they are never stored
//! and never returned.

use crate::config;
use crate::error::{CoreError, CoreResult};

/// Validates the PIN format: 4–6 ASCII digits, nothing else.
pub fn validate_pin_format(pin: &str) -> CoreResult<()> {
    let digits = pin.len();
    if digits < config::PIN_MIN_DIGITS
        || digits > config::PIN_MAX_DIGITS
        || !pin.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(CoreError::Validation(format!(
            "PIN must be {}-{} digits",
            config::PIN_MIN_DIGITS,
            config::PIN_MAX_DIGITS
        )));
    }
    Ok(())
}

/// Hashes a (format-validated) PIN for storage.
pub fn hash_pin(pin: &str) -> CoreResult<String> {
    validate_pin_format(pin)?;
    bcrypt::hash(pin, config::PIN_HASH_COST)
        .map_err(|e| CoreError::Storage(format!("pin hashing failed: {e}")))
}

/// Verifies a candidate PIN against a stored hash.
///
/// Returns `Ok(false)` on mismatch — the caller decides how to audit and
/// report it. A malformed stored hash is a storage error, not a mismatch.
pub fn verify_pin(pin: &str, pin_hash: &str) -> CoreResult<bool> {
    bcrypt::verify(pin, pin_hash)
        .map_err(|e| CoreError::Storage(format!("pin verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_accepts_four_to_six_digits() {
        assert!(validate_pin_format("1234").is_ok());
        assert!(validate_pin_format("123456").is_ok());
    }

    #[test]
    fn format_rejects_bad_inputs() {
        for bad in ["123", "1234567", "12a4", "12 34", "", "१२३४"] {
            assert!(validate_pin_format(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn hash_verify_roundtrip() {
        let hash = hash_pin("4812").unwrap();
        assert_ne!(hash, "4812");
        assert!(verify_pin("4812", &hash).unwrap());
        assert!(!verify_pin("4813", &hash).unwrap());
    }

    #[test]
    fn hash_rejects_malformed_pin() {
        assert!(hash_pin("letmein").is_err());
    }
}
