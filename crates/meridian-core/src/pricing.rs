//! # Sale Pricing
//!
//! Line and header arithmetic for checkout.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line:                                                              │
//! │    subtotal  = qty × unit_price                                         │
//! │    discount  = subtotal × discount%          (half up)                  │
//! │    tax       = 0                             (current tax model)        │
//! │    total     = subtotal − discount + tax                                │
//! │                                                                         │
//! │  header:                                                                │
//! │    Σ subtotal, Σ discount, Σ tax                                        │
//! │    employee  = (subtotal − discount) × employee%   (employee purchase) │
//! │    total     = subtotal − discount − employee + tax                     │
//! │    coupon    = min(coupon amount, total)                                │
//! │    total    −= coupon                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};

/// A priced sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinePrice {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Prices one line.
///
/// `tax` is accepted so the rate travels with the line, but the current tax
/// model evaluates every rate to zero.
///
/// ## Example
/// ```rust
/// use meridian_core::money::{Money, Rate};
/// use meridian_core::pricing::price_line;
///
/// let line = price_line(3, Money::from_cents(2000), Rate::from_percent(15), Rate::zero());
/// assert_eq!(line.subtotal.cents(), 6000);
/// assert_eq!(line.discount.cents(), 900);
/// assert_eq!(line.total.cents(), 5100);
/// ```
pub fn price_line(quantity: i64, unit_price: Money, discount: Rate, _tax: Rate) -> LinePrice {
    let subtotal = unit_price * quantity;
    let discount = subtotal.percent(discount);
    let tax = Money::zero();
    LinePrice {
        subtotal,
        discount,
        tax,
        total: subtotal - discount + tax,
    }
}

/// Header totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub employee_discount: Money,
    pub coupon_discount: Money,
    pub total: Money,
}

impl SaleTotals {
    /// Sums the lines and applies the employee discount when given.
    pub fn from_lines(lines: &[LinePrice], employee_rate: Option<Rate>) -> SaleTotals {
        let subtotal: Money = lines.iter().map(|l| l.subtotal).sum();
        let discount: Money = lines.iter().map(|l| l.discount).sum();
        let tax: Money = lines.iter().map(|l| l.tax).sum();
        let employee_discount = employee_rate
            .map(|rate| (subtotal - discount).percent(rate))
            .unwrap_or_default();

        SaleTotals {
            subtotal,
            discount,
            tax,
            employee_discount,
            coupon_discount: Money::zero(),
            total: subtotal - discount - employee_discount + tax,
        }
    }

    /// Subtracts a coupon amount, capped at the remaining total. Returns the
    /// amount actually applied.
    pub fn apply_coupon(&mut self, amount: Money) -> Money {
        let applied = amount.max(Money::zero()).min(self.total);
        self.coupon_discount = applied;
        self.total -= applied;
        applied
    }

    /// Line, employee and coupon discounts together.
    pub fn all_discounts(&self) -> Money {
        self.discount + self.employee_discount + self.coupon_discount
    }
}

/// Checks cash tendered against the total and returns the change.
pub fn settle_cash(total: Money, received: Option<Money>) -> CoreResult<Money> {
    let received = received.unwrap_or_default();
    if received < total {
        return Err(CoreError::InsufficientCashReceived {
            required: total,
            received,
        });
    }
    Ok(received - total)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_always_zero() {
        let line = price_line(2, Money::from_major(10), Rate::zero(), Rate::from_bps(825));
        assert_eq!(line.tax, Money::zero());
        assert_eq!(line.total, Money::from_major(20));
    }

    #[test]
    fn test_employee_discount_on_discounted_subtotal() {
        let lines = [
            price_line(1, Money::from_major(100), Rate::from_percent(10), Rate::zero()),
            price_line(2, Money::from_major(50), Rate::zero(), Rate::zero()),
        ];
        let totals = SaleTotals::from_lines(&lines, Some(Rate::from_percent(20)));
        assert_eq!(totals.subtotal, Money::from_major(200));
        assert_eq!(totals.discount, Money::from_major(10));
        // 20% of 190
        assert_eq!(totals.employee_discount, Money::from_major(38));
        assert_eq!(totals.total, Money::from_major(152));
    }

    #[test]
    fn test_coupon_capped_at_total() {
        let lines = [price_line(1, Money::from_major(20), Rate::zero(), Rate::zero())];
        let mut totals = SaleTotals::from_lines(&lines, None);
        let applied = totals.apply_coupon(Money::from_major(25));
        assert_eq!(applied, Money::from_major(20));
        assert_eq!(totals.total, Money::zero());
        assert_eq!(totals.all_discounts(), Money::from_major(20));
    }

    #[test]
    fn test_settle_cash() {
        let total = Money::from_major(40);
        assert_eq!(settle_cash(total, Some(Money::from_major(50))).unwrap(), Money::from_major(10));
        assert_eq!(settle_cash(total, Some(total)).unwrap(), Money::zero());
        match settle_cash(total, Some(Money::from_major(30))) {
            Err(CoreError::InsufficientCashReceived { required, received }) => {
                assert_eq!(required, total);
                assert_eq!(received, Money::from_major(30));
            }
            other => panic!("expected InsufficientCashReceived, got {:?}", other),
        }
        assert!(settle_cash(total, None).is_err());
    }
}
