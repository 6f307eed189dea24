//! # Report Service
//!
//! Shift reports for closed register sessions.

use meridian_core::report::ShiftActivity;
use meridian_core::{CoreError, ShiftReport};
use meridian_db::{Database, Repositories};

use crate::error::OpsResult;

#[derive(Debug, Clone)]
pub struct ReportService {
    db: Database,
}

impl ReportService {
    pub fn new(db: Database) -> Self {
        ReportService { db }
    }

    /// Summarizes everything rung on a session. Open sessions are refused.
    pub async fn shift_report(&self, session_id: &str) -> OpsResult<ShiftReport> {
        let mut conn = self.db.session().await?;
        let session = conn
            .registers()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("register session", session_id))?;

        let sales = conn.sales().list_for_session(&session.id).await?;
        let items = conn.sales().items_for_session(&session.id).await?;
        let returns = conn.returns().list_for_session(&session.id).await?;
        let movements = conn.registers().movements(&session.id).await?;

        let report = ShiftReport::compile(
            &session,
            &ShiftActivity {
                sales: &sales,
                items: &items,
                returns: &returns,
                movements: &movements,
            },
        )?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::services::{CloseRegister, OpenRegister, ReturnRequest, SaleLine, SaleRequest};
    use crate::testing::{cashier, fixture, manager};
    use meridian_core::{Money, PaymentMethod, RefundMethod, ReturnLine};

    #[tokio::test]
    async fn test_open_session_has_no_report() {
        let fx = fixture().await;
        let session = fx
            .office
            .registers()
            .open(
                &cashier(),
                OpenRegister {
                    branch_id: fx.store.id.clone(),
                    opening_balance_cents: 0,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let err = fx.office.reports().shift_report(&session.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

        let err = fx.office.reports().shift_report("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_closed_session_report() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        fx.stock(&fx.store.id, &fx.mug.id, 5).await;
        let registers = fx.office.registers();
        let session = registers
            .open(
                &cashier(),
                OpenRegister {
                    branch_id: fx.store.id.clone(),
                    opening_balance_cents: 10_000,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let mut cash =
            SaleRequest::new(&fx.store.id, PaymentMethod::Cash, vec![SaleLine::new(&fx.shirt.id, 2)]);
        cash.register_session_id = Some(session.id.clone());
        cash.cash_received_cents = Some(5_000);
        let cash_receipt = fx.office.sales().sell(&cashier(), cash).await.unwrap();

        let mut card =
            SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.mug.id, 1)]);
        card.register_session_id = Some(session.id.clone());
        fx.office.sales().sell(&cashier(), card).await.unwrap();

        fx.office
            .returns()
            .create(
                &cashier(),
                ReturnRequest {
                    sale_id: cash_receipt.sale.id.clone(),
                    refund_method: RefundMethod::OriginalPayment,
                    lines: vec![ReturnLine {
                        sale_item_id: cash_receipt.items[0].id.clone(),
                        quantity: 1,
                    }],
                    reason: "torn seam".into(),
                },
            )
            .await
            .unwrap();

        registers
            .close(
                &cashier(),
                &session.id,
                CloseRegister {
                    counted_cents: 12_000,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let report = fx.office.reports().shift_report(&session.id).await.unwrap();
        assert_eq!(report.sales_count, 2);
        assert_eq!(report.gross_sales, Money::from_cents(4_800));
        assert_eq!(report.items_sold, 3);
        assert_eq!(report.payments.len(), 2);
        assert_eq!(report.refund_count, 1);
        assert_eq!(report.refund_total, Money::from_cents(2_000));
        assert_eq!(report.cash_refunds, Money::from_cents(2_000));
        assert_eq!(report.expected_balance, Money::from_cents(12_000));
        assert_eq!(report.difference, Money::zero());
    }

    #[tokio::test]
    async fn test_refund_counts_on_the_drawer_that_paid_it() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let registers = fx.office.registers();
        let open = |opening: i64| OpenRegister {
            branch_id: fx.store.id.clone(),
            opening_balance_cents: opening,
            notes: None,
        };

        let first = registers.open(&cashier(), open(0)).await.unwrap();
        let mut cash =
            SaleRequest::new(&fx.store.id, PaymentMethod::Cash, vec![SaleLine::new(&fx.shirt.id, 1)]);
        cash.register_session_id = Some(first.id.clone());
        cash.cash_received_cents = Some(2_000);
        let receipt = fx.office.sales().sell(&cashier(), cash).await.unwrap();
        let close = |counted: i64| CloseRegister {
            counted_cents: counted,
            notes: None,
        };
        registers.close(&cashier(), &first.id, close(2_000)).await.unwrap();

        let second = registers.open(&manager(), open(5_000)).await.unwrap();
        fx.office
            .returns()
            .create(
                &manager(),
                ReturnRequest {
                    sale_id: receipt.sale.id.clone(),
                    refund_method: RefundMethod::Cash,
                    lines: vec![ReturnLine {
                        sale_item_id: receipt.items[0].id.clone(),
                        quantity: 1,
                    }],
                    reason: "gift duplicate".into(),
                },
            )
            .await
            .unwrap();
        registers.close(&manager(), &second.id, close(3_000)).await.unwrap();

        let rung = fx.office.reports().shift_report(&first.id).await.unwrap();
        assert_eq!(rung.sales_count, 1);
        assert_eq!(rung.refund_count, 0);
        assert_eq!(rung.cash_refunds, Money::zero());

        let paid = fx.office.reports().shift_report(&second.id).await.unwrap();
        assert_eq!(paid.sales_count, 0);
        assert_eq!(paid.refund_count, 1);
        assert_eq!(paid.refund_total, Money::from_cents(2_000));
        assert_eq!(paid.cash_refunds, Money::from_cents(2_000));
        assert_eq!(paid.difference, Money::zero());
    }
}
