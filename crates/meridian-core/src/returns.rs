//! # Returns and Refunds
//!
//! Planning a return against a prior sale and pricing the refund.
//!
//! ## Refund Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per item:  refund = line_total × returned_qty / sold_qty  (truncated) │
//! │             last outstanding units refund the line remainder:          │
//! │             refund = line_total − already refunded on the line         │
//! │                                                                         │
//! │  return:    amount = min(Σ item refunds, total − returned − pending)   │
//! │                                                                         │
//! │  so Σ return amounts over a sale never exceeds the sale total, even    │
//! │  when employee or coupon discounts sit on top of the line totals.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::sale::{PaymentMethod, Sale, SaleItem, SaleStatus};
use crate::validation::{validate_line_count, validate_quantity};

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    Cash,
    /// Back to whatever paid for the sale.
    OriginalPayment,
    StoreCredit,
}

impl RefundMethod {
    /// True when the refund leaves the till drawer.
    pub fn pays_out_cash(&self, sale_payment: PaymentMethod) -> bool {
        match self {
            RefundMethod::Cash => true,
            RefundMethod::OriginalPayment => sale_payment.involves_cash(),
            RefundMethod::StoreCredit => false,
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReturn {
    pub id: String,
    pub sale_id: String,
    pub branch_id: String,
    /// Register session the refund is booked against. Starts as the sale's
    /// session and is settled when the return is approved.
    pub register_session_id: Option<String>,
    pub refund_method: RefundMethod,
    pub return_amount_cents: i64,
    /// True when this refund leaves the drawer.
    pub cash_refund: bool,
    pub status: ReturnStatus,
    pub reason: String,
    pub requested_by: String,
    pub decided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl SaleReturn {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.return_amount_cents)
    }

    /// Moves a Pending return to Approved or Rejected.
    pub fn decide(&mut self, approve: bool, actor_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != ReturnStatus::Pending {
            return Err(CoreError::transition(
                "return",
                &self.id,
                self.status,
                if approve { "approve" } else { "reject" },
            ));
        }
        self.status = if approve {
            ReturnStatus::Approved
        } else {
            ReturnStatus::Rejected
        };
        self.decided_by = Some(actor_id.to_string());
        self.decided_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnItem {
    pub id: String,
    pub return_id: String,
    pub sale_item_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    pub refund_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnWithItems {
    pub sale_return: SaleReturn,
    pub items: Vec<ReturnItem>,
}

/// A requested return quantity for one sale item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnLine {
    pub sale_item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Planning
// =============================================================================

/// One validated line of a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    /// Index into the sale's items.
    pub item_index: usize,
    pub quantity: i64,
    pub refund: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPlan {
    pub items: Vec<PlannedItem>,
    /// Header amount after capping at the sale's refundable remainder.
    pub amount: Money,
}

/// Refund value of returning `quantity` units of `item`.
pub fn line_refund(item: &SaleItem, quantity: i64) -> Money {
    if quantity >= item.returnable_quantity() {
        item.line_total() - Money::from_cents(item.refunded_cents)
    } else {
        item.line_total().prorate(quantity, item.quantity)
    }
}

/// Validates a return request against the sale and prices it.
///
/// `pending` is the sum of this sale's returns that are still awaiting a
/// decision; their quantities are already counted in `returned_quantity`.
pub fn plan_return(
    sale: &Sale,
    items: &[SaleItem],
    lines: &[ReturnLine],
    pending: Money,
) -> CoreResult<ReturnPlan> {
    if matches!(sale.status, SaleStatus::Cancelled | SaleStatus::Refunded) {
        return Err(CoreError::transition("sale", &sale.id, sale.status, "return"));
    }
    validate_line_count("return lines", lines.len())?;

    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.sale_item_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "sale_item_id".to_string(),
                value: line.sale_item_id.clone(),
            }
            .into());
        }
        validate_quantity("return quantity", line.quantity)?;

        let (index, item) = items
            .iter()
            .enumerate()
            .find(|(_, i)| i.id == line.sale_item_id && i.sale_id == sale.id)
            .ok_or_else(|| CoreError::not_found("sale item", &line.sale_item_id))?;

        let returnable = item.returnable_quantity();
        if line.quantity > returnable {
            return Err(ValidationError::OutOfRange {
                field: format!("return quantity for sale item {}", item.id),
                min: 1,
                max: returnable,
            }
            .into());
        }

        planned.push(PlannedItem {
            item_index: index,
            quantity: line.quantity,
            refund: line_refund(item, line.quantity),
        });
    }

    let requested: Money = planned.iter().map(|p| p.refund).sum();
    Ok(ReturnPlan {
        items: planned,
        amount: requested.min(sale.refundable(pending)),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(total: i64) -> Sale {
        Sale {
            id: "s-1".into(),
            receipt_number: "20260101-DT-0001".into(),
            branch_id: "b-1".into(),
            register_session_id: None,
            cashier_id: "u-1".into(),
            staff_id: None,
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            subtotal_cents: total,
            discount_cents: 0,
            tax_cents: 0,
            employee_discount_cents: 0,
            coupon_id: None,
            coupon_discount_cents: 0,
            total_cents: total,
            cash_received_cents: Some(total),
            change_cents: Some(0),
            returned_cents: 0,
            is_gift: false,
            is_employee_purchase: false,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(id: &str, quantity: i64, line_total: i64) -> SaleItem {
        SaleItem {
            id: id.into(),
            sale_id: "s-1".into(),
            line_no: 0,
            product_id: "p-1".into(),
            variant_id: None,
            quantity,
            unit_price_cents: line_total / quantity,
            discount_bps: 0,
            tax_bps: 0,
            discount_cents: 0,
            tax_cents: 0,
            line_total_cents: line_total,
            returned_quantity: 0,
            refunded_cents: 0,
        }
    }

    fn line(id: &str, quantity: i64) -> ReturnLine {
        ReturnLine {
            sale_item_id: id.into(),
            quantity,
        }
    }

    #[test]
    fn test_partial_then_remainder() {
        let mut it = item("i-1", 3, 1000);
        assert_eq!(line_refund(&it, 1), Money::from_cents(333));

        it.returned_quantity = 1;
        it.refunded_cents = 333;
        assert_eq!(line_refund(&it, 1), Money::from_cents(333));

        it.returned_quantity = 2;
        it.refunded_cents = 666;
        // the last unit picks up the rounding remainder
        assert_eq!(line_refund(&it, 1), Money::from_cents(334));
    }

    #[test]
    fn test_plan_caps_at_refundable() {
        // line totals 100.00 but the sale total after a coupon is 80.00
        let s = sale(8000);
        let items = vec![item("i-1", 2, 10000)];
        let plan = plan_return(&s, &items, &[line("i-1", 2)], Money::zero()).unwrap();
        assert_eq!(plan.amount, Money::from_cents(8000));

        let plan = plan_return(&s, &items, &[line("i-1", 1)], Money::from_cents(5000)).unwrap();
        assert_eq!(plan.amount, Money::from_cents(3000));
    }

    #[test]
    fn test_plan_rejects_bad_lines() {
        let s = sale(1000);
        let items = vec![item("i-1", 2, 1000)];
        assert!(plan_return(&s, &items, &[line("i-1", 3)], Money::zero()).is_err());
        assert!(plan_return(&s, &items, &[line("nope", 1)], Money::zero()).is_err());
        assert!(plan_return(&s, &items, &[line("i-1", 1), line("i-1", 1)], Money::zero()).is_err());
        assert!(plan_return(&s, &items, &[], Money::zero()).is_err());

        let mut refunded = sale(1000);
        refunded.status = SaleStatus::Refunded;
        assert!(matches!(
            plan_return(&refunded, &items, &[line("i-1", 1)], Money::zero()),
            Err(CoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_refund_method_cash() {
        assert!(RefundMethod::Cash.pays_out_cash(PaymentMethod::Card));
        assert!(RefundMethod::OriginalPayment.pays_out_cash(PaymentMethod::Cash));
        assert!(!RefundMethod::OriginalPayment.pays_out_cash(PaymentMethod::Card));
        assert!(!RefundMethod::StoreCredit.pays_out_cash(PaymentMethod::Cash));
    }
}
