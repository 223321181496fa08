//! Fixed-point money.
//!
//! Every amount on the platform is an integer count of paise (10⁻² INR).
//! No floating point anywhere near a balance — the `2` in "₹10.52" is for
//! display only, the arithmetic never divides. All arithmetic is checked:
//! overflow is an error, not a wrap.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Currency denomination.
///
/// The platform is a closed loop: one campus, one currency. The enum exists
/// so that wallets record their denomination explicitly and a future
/// multi-campus deployment doesn't have to guess what a bare integer meant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Indian Rupee (smallest unit: paisa, 10^-2).
    #[default]
    Inr,
}

impl Currency {
    /// Number of decimal places for display formatting.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Inr => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inr => write!(f, "INR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A monetary amount in paise.
///
/// `Amount` is unsigned: debits and credits are distinct operations on the
/// ledger, not signs on a number. The zero amount is constructible (it is a
/// valid balance) but every balance-moving operation rejects it.
///
/// # Examples
///
/// ```
/// use campuspay_core::money::Amount;
///
/// let chai = Amount::from_rupees(15);
/// let samosa = Amount::from_paise(1_250);
/// let bill = chai.checked_add(samosa).unwrap();
/// assert_eq!(bill.to_string(), "27.50 INR");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount {
    paise: u64,
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount { paise: 0 };

    /// Creates an amount from a raw paise count.
    pub const fn from_paise(paise: u64) -> Self {
        Self { paise }
    }

    /// Creates an amount from whole rupees. Convenience for tests and
    /// seed data; real inputs arrive already denominated in paise.
    pub const fn from_rupees(rupees: u64) -> Self {
        Self {
            paise: rupees * 100,
        }
    }

    /// Returns the raw paise count.
    pub const fn paise(&self) -> u64 {
        self.paise
    }

    /// Returns `true` if the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.paise == 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.paise.checked_add(other.paise).map(Amount::from_paise)
    }

    /// Checked subtraction. `None` if `other` exceeds `self` — an `Amount`
    /// can never hold a negative value.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.paise.checked_sub(other.paise).map(Amount::from_paise)
    }

    /// Checked multiplication by a quantity (line-item totals).
    pub fn checked_mul(self, quantity: u32) -> Option<Amount> {
        self.paise
            .checked_mul(u64::from(quantity))
            .map(Amount::from_paise)
    }

    /// Subtraction clamped at zero. Used for "remaining budget" style
    /// displays, never for balance mutation.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount::from_paise(self.paise.saturating_sub(other.paise))
    }

    /// Decimal rendering without the currency suffix, e.g. `"27.50"`.
    pub fn display_decimal(&self) -> String {
        let divisor = 10u64.pow(Currency::Inr.decimals());
        format!("{}.{:02}", self.paise / divisor, self.paise % divisor)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display_decimal(), Currency::Inr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
