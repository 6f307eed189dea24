//! # Sale Records
//!
//! The persisted shape of a checkout. A sale is written once, atomically, with
//! its items; afterwards only the return workflow touches it (cumulative
//! returned amount, per-line returned quantity, status).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::stock::StockKey;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileWallet,
    BankTransfer,
}

impl PaymentMethod {
    /// True when the till drawer is involved.
    pub fn involves_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    pub fn all() -> [PaymentMethod; 4] {
        [
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::MobileWallet,
            PaymentMethod::BankTransfer,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Refunded,
    PartiallyRefunded,
    Cancelled,
}

impl SaleStatus {
    /// Status implied by the cumulative approved refund amount. Only called
    /// once a return has been approved.
    ///
    /// ```text
    /// returned >= total  → Refunded
    /// 0 < returned < tot → PartiallyRefunded
    /// otherwise          → Completed
    /// ```
    pub fn from_refunds(total: Money, returned: Money) -> SaleStatus {
        if returned >= total {
            SaleStatus::Refunded
        } else if returned.is_positive() {
            SaleStatus::PartiallyRefunded
        } else {
            SaleStatus::Completed
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// `YYYYMMDD-<branch code>-NNNN`
    pub receipt_number: String,
    pub branch_id: String,
    pub register_session_id: Option<String>,
    /// Who rang the sale.
    pub cashier_id: String,
    /// Salesperson credited with the sale.
    pub staff_id: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub employee_discount_cents: i64,
    pub coupon_id: Option<String>,
    pub coupon_discount_cents: i64,
    pub total_cents: i64,
    pub cash_received_cents: Option<i64>,
    pub change_cents: Option<i64>,
    /// Cumulative approved refunds.
    pub returned_cents: i64,
    pub is_gift: bool,
    pub is_employee_purchase: bool,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn returned(&self) -> Money {
        Money::from_cents(self.returned_cents)
    }

    /// Every discount applied to the sale (line + employee + coupon).
    pub fn all_discounts(&self) -> Money {
        Money::from_cents(self.discount_cents + self.employee_discount_cents + self.coupon_discount_cents)
    }

    /// Amount still refundable once `pending` unapproved refunds are honoured.
    pub fn refundable(&self, pending: Money) -> Money {
        (self.total() - self.returned() - pending).max(Money::zero())
    }

    /// Records an approved refund and recomputes the status.
    pub fn apply_refund(&mut self, amount: Money, at: DateTime<Utc>) {
        self.returned_cents += amount.cents();
        self.status = SaleStatus::from_refunds(self.total(), self.returned());
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Zero-based position on the receipt.
    pub line_no: i64,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_bps: u32,
    /// Carried for forward compatibility; the current tax model charges nothing.
    pub tax_bps: u32,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    /// Units taken back by approved or pending returns.
    pub returned_quantity: i64,
    /// Refund value already attributed to this line.
    pub refunded_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    #[inline]
    pub fn discount_rate(&self) -> Rate {
        Rate::from_bps(self.discount_bps)
    }

    pub fn stock_key(&self, branch_id: &str) -> StockKey {
        StockKey::new(&self.product_id, self.variant_id.clone(), branch_id)
    }

    /// Units that can still be returned.
    pub fn returnable_quantity(&self) -> i64 {
        self.quantity - self.returned_quantity
    }
}

/// One row per discounted line: who granted it and under which ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiscountAuthorizationLog {
    pub id: String,
    pub sale_id: String,
    pub sale_item_id: String,
    pub actor_id: String,
    pub role: String,
    pub requested_bps: u32,
    pub max_allowed_bps: u32,
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// What checkout hands back: the sale, its lines and the change due.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub change: Option<Money>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_refunds() {
        let total = Money::from_major(100);
        assert_eq!(SaleStatus::from_refunds(total, Money::zero()), SaleStatus::Completed);
        assert_eq!(
            SaleStatus::from_refunds(total, Money::from_major(40)),
            SaleStatus::PartiallyRefunded
        );
        assert_eq!(SaleStatus::from_refunds(total, total), SaleStatus::Refunded);
    }

    #[test]
    fn test_payment_method_cash() {
        assert!(PaymentMethod::Cash.involves_cash());
        assert!(!PaymentMethod::Card.involves_cash());
    }
}
