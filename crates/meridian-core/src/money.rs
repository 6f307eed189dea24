//! # Money and Rates
//!
//! Integer money and basis-point rates used by every price, discount, refund
//! and cash figure in the back office.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A register must reconcile to the cent                                  │
//! │                                                                         │
//! │  opening 100.00 + cash sale 40.00 − payout 10.00 = expected 130.00     │
//! │                                                                         │
//! │  With floats every intermediate total drifts; with i64 minor units the │
//! │  expected balance and the counted balance compare exactly, so a        │
//! │  difference of −5.00 really is a shortage of five.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use meridian_core::money::{Money, Rate};
//!
//! let line = Money::from_cents(2000) * 3_i64;       // 60.00
//! let discount = line.percent(Rate::from_bps(1500)); // 15% = 9.00
//! assert_eq!((line - discount).cents(), 5100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Basis points in one hundred percent.
pub const FULL_RATE_BPS: u32 = 10_000;

// =============================================================================
// Money
// =============================================================================

/// A monetary value in minor currency units (cents).
///
/// Signed so that shortages and register differences can be negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a value from whole major units (`Money::from_major(40)` is 40.00).
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns `rate` of this amount, rounding half up.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::{Money, Rate};
    ///
    /// // 20% employee discount on 33.33 → 6.67 (6.666 rounded)
    /// let amount = Money::from_cents(3333);
    /// assert_eq!(amount.percent(Rate::from_bps(2000)).cents(), 667);
    /// ```
    pub fn percent(&self, rate: Rate) -> Money {
        // i128 keeps large totals from overflowing during the multiply
        let scaled = (self.0 as i128 * rate.bps() as i128 + 5_000) / FULL_RATE_BPS as i128;
        Money(scaled as i64)
    }

    /// Returns `part / whole` of this amount, truncating toward zero.
    ///
    /// Used to price a partial return of a line: `line_total × returned / sold`.
    /// Returns zero when `whole` is zero.
    pub fn prorate(&self, part: i64, whole: i64) -> Money {
        if whole == 0 {
            return Money::zero();
        }
        Money((self.0 as i128 * part as i128 / whole as i128) as i64)
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Returns the larger of two amounts.
    #[inline]
    pub fn max(self, other: Money) -> Money {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage in basis points (1 bps = 0.01%, 1500 bps = 15%).
///
/// Line discounts, tax rates, percentage coupons and discount ceilings all use
/// this type so that comparisons like "15% exceeds the 10% ceiling" are exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from whole percent (`Rate::from_percent(30)` is 30%).
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        Rate(percent * 100)
    }

    /// Creates a rate from a decimal percentage (config files, e.g. `12.5`).
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// True when the rate is above 100%.
    #[inline]
    pub const fn exceeds_full(&self) -> bool {
        self.0 > FULL_RATE_BPS
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}%", self.0 / 100)
        } else {
            write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(13000).to_string(), "130.00");
        assert_eq!(Money::from_cents(-500).to_string(), "-5.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Rate::from_percent(10).to_string(), "10%");
        assert_eq!(Rate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_percent_rounds_half_up() {
        // 50% of 0.05 = 0.025 → 0.03
        assert_eq!(Money::from_cents(5).percent(Rate::from_percent(50)).cents(), 3);
        assert_eq!(Money::from_major(20).percent(Rate::from_percent(50)), Money::from_major(10));
        assert_eq!(Money::from_major(20).percent(Rate::zero()), Money::zero());
    }

    #[test]
    fn test_prorate() {
        // one of three units of a 10.00 line → 3.33
        assert_eq!(Money::from_cents(1000).prorate(1, 3).cents(), 333);
        assert_eq!(Money::from_cents(1000).prorate(3, 3).cents(), 1000);
        assert_eq!(Money::from_cents(1000).prorate(1, 0), Money::zero());
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!((b * 4_i64).cents(), 1000);
        assert_eq!((-b).cents(), -250);
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>().cents(), 1500);
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
    }

    #[test]
    fn test_rate_conversions() {
        assert_eq!(Rate::from_percent(30).bps(), 3000);
        assert_eq!(Rate::from_percentage(12.5).bps(), 1250);
        assert_eq!(Rate::from_percentage(-3.0).bps(), 0);
        assert!(Rate::from_bps(10_001).exceeds_full());
        assert!(!Rate::from_percent(100).exceeds_full());
    }
}
