//! # Platform Configuration & Constants
//!
//! Every magic number in CampusPay lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team chai.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Minimum PIN length in digits. Four digits is the floor parents are
/// willing to make a ten-year-old memorize.
pub const PIN_MIN_DIGITS: usize = 4;

/// Maximum PIN length in digits.
pub const PIN_MAX_DIGITS: usize = 6;

/// bcrypt work factor for PIN hashing. 10 keeps verification around tens of
/// milliseconds on commodity hardware — slow enough to blunt offline
/// guessing, fast enough for a lunch-rush queue at the canteen.
pub const PIN_HASH_COST: u32 = 10;

/// OTP validity window. Codes are displayed on the student's device and
/// read out at the counter, so 60 seconds covers the realistic handoff.
pub const OTP_TTL: Duration = Duration::from_secs(60);

/// Number of digits in an OTP code.
pub const OTP_DIGITS: u32 = 6;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum transaction description length in bytes. Enough for an itemized
/// receipt summary, not enough for your novel.
pub const MAX_DESCRIPTION_LENGTH: usize = 512;

/// Maximum number of line items in a single cart payment.
pub const MAX_CART_ITEMS: usize = 64;

// ---------------------------------------------------------------------------
// Query Defaults
// ---------------------------------------------------------------------------

/// Default page size for wallet transaction history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default page size for audit log queries.
pub const DEFAULT_AUDIT_LIMIT: usize = 100;

/// Hard cap on audit log query page size. Beyond this, use an export job.
pub const MAX_AUDIT_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Network Defaults
// ---------------------------------------------------------------------------

/// Default REST API port.
pub const DEFAULT_API_PORT: u16 = 8470;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8471;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_bounds_are_ordered() {
        assert!(PIN_MIN_DIGITS <= PIN_MAX_DIGITS);
    }

    #[test]
    fn otp_window_is_positive() {
        assert!(OTP_TTL.as_secs() > 0);
        assert!(OTP_DIGITS >= 6);
    }

    #[test]
    fn audit_limits_are_ordered() {
        assert!(DEFAULT_AUDIT_LIMIT <= MAX_AUDIT_LIMIT);
    }
}
