//! # Register Service
//!
//! Cash drawer sessions: open with a float, record cash in and out, close
//! with a counted balance and reconcile.
//!
//! ## Reconciliation
//! ```text
//! expected = opening + cash sales − cash refunds + cash in − cash out
//! difference = counted − expected      (positive: overage, negative: shortage)
//! ```
//!
//! Sales and returns write their own `Sale` / `Return` cash movements inside
//! their units of work, so a close that acquires the write gate after them
//! always sees them.

use serde::{Deserialize, Serialize};
use tracing::info;

use meridian_core::validation::{validate_amount_cents, validate_positive_amount};
use meridian_core::{
    Actor, CashMovement, CashMovementKind, CoreError, Money, RegisterSession, RegisterStatus,
    RegisterTally,
};
use meridian_db::{generate_id, Database, Repositories};

use super::require_branch;
use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRegister {
    pub branch_id: String,
    pub opening_balance_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRegister {
    /// Cash physically counted in the drawer.
    pub counted_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashFlow {
    In,
    Out,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashEntry {
    pub flow: CashFlow,
    pub amount_cents: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterService {
    db: Database,
}

impl RegisterService {
    pub fn new(db: Database) -> Self {
        RegisterService { db }
    }

    /// Opens a session for `actor`. One open session per user.
    pub async fn open(&self, actor: &Actor, open: OpenRegister) -> OpsResult<RegisterSession> {
        validate_amount_cents("opening_balance_cents", open.opening_balance_cents)?;

        let mut uow = self.db.begin().await?;
        require_branch(&mut uow, &open.branch_id).await?;
        if let Some(existing) = uow.registers().open_for_user(&actor.id).await? {
            return Err(CoreError::RegisterAlreadyOpen {
                session_id: existing.id,
            }
            .into());
        }

        let now = uow.now();
        let session = RegisterSession {
            id: generate_id(),
            branch_id: open.branch_id,
            user_id: actor.id.clone(),
            status: RegisterStatus::Open,
            opening_balance_cents: open.opening_balance_cents,
            closing_balance_cents: None,
            expected_balance_cents: None,
            difference_cents: None,
            notes: open.notes,
            opened_at: now,
            closed_at: None,
        };
        uow.registers().insert_session(&session).await?;
        uow.registers()
            .insert_movement(&CashMovement {
                id: generate_id(),
                session_id: session.id.clone(),
                kind: CashMovementKind::Opening,
                amount_cents: session.opening_balance_cents,
                reference_id: None,
                note: None,
                actor_id: actor.id.clone(),
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        info!(
            session_id = %session.id,
            branch_id = %session.branch_id,
            user_id = %session.user_id,
            opening = %session.opening_balance(),
            "Register opened"
        );
        Ok(session)
    }

    /// Closes a session against the counted drawer balance.
    pub async fn close(&self, actor: &Actor, session_id: &str, close: CloseRegister) -> OpsResult<RegisterSession> {
        validate_amount_cents("counted_cents", close.counted_cents)?;

        let mut uow = self.db.begin().await?;
        let mut session = uow
            .registers()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("register session", session_id))?;
        if !session.is_open() {
            return Err(CoreError::RegisterAlreadyClosed {
                session_id: session.id,
            }
            .into());
        }

        let movements = uow.registers().movements(&session.id).await?;
        let tally = RegisterTally::from_movements(session.opening_balance(), &movements);
        let reconciliation = tally.reconcile(Money::from_cents(close.counted_cents));

        let now = uow.now();
        session.close(&reconciliation, close.notes, now)?;
        uow.registers().update_close(&session).await?;
        uow.registers()
            .insert_movement(&CashMovement {
                id: generate_id(),
                session_id: session.id.clone(),
                kind: CashMovementKind::Closing,
                amount_cents: close.counted_cents,
                reference_id: None,
                note: None,
                actor_id: actor.id.clone(),
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        info!(
            session_id = %session.id,
            expected = %reconciliation.expected,
            counted = %reconciliation.counted,
            difference = %reconciliation.difference,
            "Register closed"
        );
        Ok(session)
    }

    /// Records a pay-in or pay-out on an open session.
    pub async fn record_cash(&self, actor: &Actor, session_id: &str, entry: CashEntry) -> OpsResult<CashMovement> {
        validate_positive_amount("amount_cents", entry.amount_cents)?;

        let mut uow = self.db.begin().await?;
        let session = uow
            .registers()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("register session", session_id))?;
        session.ensure_open("record cash")?;

        let movement = CashMovement {
            id: generate_id(),
            session_id: session.id,
            kind: match entry.flow {
                CashFlow::In => CashMovementKind::CashIn,
                CashFlow::Out => CashMovementKind::CashOut,
            },
            amount_cents: entry.amount_cents,
            reference_id: None,
            note: entry.note,
            actor_id: actor.id.clone(),
            created_at: uow.now(),
        };
        uow.registers().insert_movement(&movement).await?;
        uow.commit().await?;

        info!(
            session_id = %movement.session_id,
            kind = ?movement.kind,
            amount = %movement.amount(),
            "Cash movement recorded"
        );
        Ok(movement)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn current_session(&self, user_id: &str) -> OpsResult<Option<RegisterSession>> {
        let mut session = self.db.session().await?;
        Ok(session.registers().open_for_user(user_id).await?)
    }

    pub async fn get(&self, session_id: &str) -> OpsResult<RegisterSession> {
        let mut session = self.db.session().await?;
        Ok(session
            .registers()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("register session", session_id))?)
    }

    /// Running cash figures; for an open session this is the interim
    /// expected balance.
    pub async fn tally(&self, session_id: &str) -> OpsResult<RegisterTally> {
        let mut conn = self.db.session().await?;
        let session = conn
            .registers()
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("register session", session_id))?;
        let movements = conn.registers().movements(&session.id).await?;
        Ok(RegisterTally::from_movements(session.opening_balance(), &movements))
    }

    pub async fn movements(&self, session_id: &str) -> OpsResult<Vec<CashMovement>> {
        let mut session = self.db.session().await?;
        Ok(session.registers().movements(session_id).await?)
    }

    pub async fn list_for_branch(&self, branch_id: &str, limit: u32) -> OpsResult<Vec<RegisterSession>> {
        let mut session = self.db.session().await?;
        Ok(session.registers().list_for_branch(branch_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::{ReturnRequest, SaleLine, SaleRequest};
    use crate::testing::{cashier, fixture, manager, Fixture};
    use meridian_core::{PaymentMethod, RefundMethod, ReturnLine, SaleReceipt};

    async fn open(fx: &Fixture, actor: &Actor, opening: i64) -> RegisterSession {
        fx.office
            .registers()
            .open(
                actor,
                OpenRegister {
                    branch_id: fx.store.id.clone(),
                    opening_balance_cents: opening,
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    async fn cash_sale(fx: &Fixture, session_id: &str, qty: i64) -> SaleReceipt {
        let mut request =
            SaleRequest::new(&fx.store.id, PaymentMethod::Cash, vec![SaleLine::new(&fx.shirt.id, qty)]);
        request.register_session_id = Some(session_id.to_string());
        request.cash_received_cents = Some(qty * 2_000);
        fx.office.sales().sell(&cashier(), request).await.unwrap()
    }

    #[tokio::test]
    async fn test_reconciliation_reports_shortage() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let registers = fx.office.registers();

        let session = open(&fx, &cashier(), 10_000).await;
        cash_sale(&fx, &session.id, 2).await;
        registers
            .record_cash(
                &cashier(),
                &session.id,
                CashEntry {
                    flow: CashFlow::Out,
                    amount_cents: 1_000,
                    note: Some("window cleaner".into()),
                },
            )
            .await
            .unwrap();

        let tally = registers.tally(&session.id).await.unwrap();
        assert_eq!(tally.expected(), Money::from_cents(13_000));

        let closed = registers
            .close(
                &cashier(),
                &session.id,
                CloseRegister {
                    counted_cents: 12_500,
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.status, RegisterStatus::Closed);
        assert_eq!(closed.expected_balance_cents, Some(13_000));
        assert_eq!(closed.difference_cents, Some(-500));

        let kinds: Vec<CashMovementKind> = registers
            .movements(&session.id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                CashMovementKind::Opening,
                CashMovementKind::Sale,
                CashMovementKind::CashOut,
                CashMovementKind::Closing,
            ]
        );
    }

    #[tokio::test]
    async fn test_second_open_and_second_close_rejected() {
        let fx = fixture().await;
        let registers = fx.office.registers();
        let session = open(&fx, &cashier(), 5_000).await;

        let err = registers
            .open(
                &cashier(),
                OpenRegister {
                    branch_id: fx.warehouse.id.clone(),
                    opening_balance_cents: 0,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RegisterAlreadyOpen);

        let close = || CloseRegister {
            counted_cents: 5_000,
            notes: None,
        };
        let closed = registers.close(&cashier(), &session.id, close()).await.unwrap();
        assert_eq!(closed.difference_cents, Some(0));
        let err = registers.close(&cashier(), &session.id, close()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RegisterAlreadyClosed);

        assert!(registers.current_session(&cashier().id).await.unwrap().is_none());
        let reopened = open(&fx, &cashier(), 0).await;
        assert_eq!(registers.list_for_branch(&fx.store.id, 10).await.unwrap().len(), 2);
        assert_eq!(
            registers.current_session(&cashier().id).await.unwrap().map(|s| s.id),
            Some(reopened.id)
        );
    }

    #[tokio::test]
    async fn test_sale_on_closed_register_rejected() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let session = open(&fx, &cashier(), 0).await;
        fx.office
            .registers()
            .close(
                &cashier(),
                &session.id,
                CloseRegister {
                    counted_cents: 0,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let mut request =
            SaleRequest::new(&fx.store.id, PaymentMethod::Cash, vec![SaleLine::new(&fx.shirt.id, 1)]);
        request.register_session_id = Some(session.id.clone());
        request.cash_received_cents = Some(2_000);
        let err = fx.office.sales().sell(&cashier(), request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 5);
    }

    #[tokio::test]
    async fn test_cash_refund_lands_on_register() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let registers = fx.office.registers();
        let session = open(&fx, &cashier(), 10_000).await;
        let receipt = cash_sale(&fx, &session.id, 2).await;

        let refund = fx
            .office
            .returns()
            .create(
                &cashier(),
                ReturnRequest {
                    sale_id: receipt.sale.id.clone(),
                    refund_method: RefundMethod::Cash,
                    lines: vec![ReturnLine {
                        sale_item_id: receipt.items[0].id.clone(),
                        quantity: 1,
                    }],
                    reason: "changed mind".into(),
                },
            )
            .await
            .unwrap();
        assert!(refund.sale_return.cash_refund);
        assert_eq!(refund.sale_return.register_session_id.as_deref(), Some(session.id.as_str()));

        let tally = registers.tally(&session.id).await.unwrap();
        assert_eq!(tally.cash_sales, Money::from_cents(4_000));
        assert_eq!(tally.cash_refunds, Money::from_cents(2_000));
        assert_eq!(tally.expected(), Money::from_cents(12_000));
    }

    #[tokio::test]
    async fn test_refund_after_close_uses_actor_session() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let registers = fx.office.registers();
        let first = open(&fx, &cashier(), 0).await;
        let receipt = cash_sale(&fx, &first.id, 1).await;
        registers
            .close(
                &cashier(),
                &first.id,
                CloseRegister {
                    counted_cents: 2_000,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let second = open(&fx, &manager(), 5_000).await;

        let refund = fx
            .office
            .returns()
            .create(
                &manager(),
                ReturnRequest {
                    sale_id: receipt.sale.id.clone(),
                    refund_method: RefundMethod::OriginalPayment,
                    lines: vec![ReturnLine {
                        sale_item_id: receipt.items[0].id.clone(),
                        quantity: 1,
                    }],
                    reason: "faulty zip".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(refund.sale_return.register_session_id.as_deref(), Some(second.id.as_str()));

        assert_eq!(registers.tally(&first.id).await.unwrap().cash_refunds, Money::zero());
        assert_eq!(registers.tally(&second.id).await.unwrap().expected(), Money::from_cents(3_000));
    }

    #[tokio::test]
    async fn test_cash_entries_need_open_session_and_positive_amount() {
        let fx = fixture().await;
        let registers = fx.office.registers();
        let session = open(&fx, &cashier(), 0).await;

        let err = registers
            .record_cash(
                &cashier(),
                &session.id,
                CashEntry {
                    flow: CashFlow::In,
                    amount_cents: 0,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = registers
            .record_cash(
                &cashier(),
                "missing",
                CashEntry {
                    flow: CashFlow::In,
                    amount_cents: 100,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
