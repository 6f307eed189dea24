//! # Shift Report
//!
//! Read-only summary of a closed register session. Compiled from rows the
//! other workflows already committed; it adds no invariants of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::register::{CashMovement, RegisterSession, RegisterStatus, RegisterTally};
use crate::returns::{ReturnStatus, SaleReturn};
use crate::sale::{PaymentMethod, Sale, SaleItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    pub count: i64,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftReport {
    pub session_id: String,
    pub branch_id: String,
    pub user_id: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    pub opening_balance: Money,
    pub closing_balance: Money,
    pub expected_balance: Money,
    pub difference: Money,

    pub sales_count: i64,
    pub gross_sales: Money,
    /// Only methods that were used, in a fixed order.
    pub payments: Vec<PaymentBreakdown>,
    pub total_discounts: Money,
    pub items_sold: i64,

    /// Approved returns booked on this session.
    pub refund_count: i64,
    pub refund_total: Money,
    pub cash_refunds: Money,
    pub cash_in: Money,
    pub cash_out: Money,
}

/// Everything rung on one session.
pub struct ShiftActivity<'a> {
    pub sales: &'a [Sale],
    pub items: &'a [SaleItem],
    /// Returns booked on the session, any status. A refund paid from this
    /// drawer counts here even when the sale was rung on another session.
    pub returns: &'a [SaleReturn],
    pub movements: &'a [CashMovement],
}

impl ShiftReport {
    /// Builds the report. The session must be closed.
    pub fn compile(session: &RegisterSession, activity: &ShiftActivity<'_>) -> CoreResult<ShiftReport> {
        if session.status != RegisterStatus::Closed {
            return Err(CoreError::transition(
                "register session",
                &session.id,
                session.status,
                "report on",
            ));
        }

        let tally = RegisterTally::from_movements(session.opening_balance(), activity.movements);

        let payments = PaymentMethod::all()
            .into_iter()
            .filter_map(|method| {
                let matching: Vec<&Sale> = activity
                    .sales
                    .iter()
                    .filter(|s| s.payment_method == method)
                    .collect();
                if matching.is_empty() {
                    return None;
                }
                Some(PaymentBreakdown {
                    method,
                    count: matching.len() as i64,
                    total: matching.iter().map(|s| s.total()).sum(),
                })
            })
            .collect();

        let approved: Vec<&SaleReturn> = activity
            .returns
            .iter()
            .filter(|r| r.status == ReturnStatus::Approved)
            .collect();

        Ok(ShiftReport {
            session_id: session.id.clone(),
            branch_id: session.branch_id.clone(),
            user_id: session.user_id.clone(),
            opened_at: session.opened_at,
            closed_at: session.closed_at,
            opening_balance: session.opening_balance(),
            closing_balance: Money::from_cents(session.closing_balance_cents.unwrap_or_default()),
            expected_balance: Money::from_cents(session.expected_balance_cents.unwrap_or_default()),
            difference: Money::from_cents(session.difference_cents.unwrap_or_default()),
            sales_count: activity.sales.len() as i64,
            gross_sales: activity.sales.iter().map(|s| s.total()).sum(),
            payments,
            total_discounts: activity.sales.iter().map(|s| s.all_discounts()).sum(),
            items_sold: activity.items.iter().map(|i| i.quantity).sum(),
            refund_count: approved.len() as i64,
            refund_total: approved.iter().map(|r| r.amount()).sum(),
            cash_refunds: tally.cash_refunds,
            cash_in: tally.cash_in,
            cash_out: tally.cash_out,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
