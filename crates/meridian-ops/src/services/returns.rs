//! # Return Service
//!
//! Takes sold units back, credits the ledger and refunds the customer.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create ──┬── require_approval = false ──► Approved                    │
//! │           │     ledger +qty, sale refund state, cash movement          │
//! │           │                                                            │
//! │           └── require_approval = true ───► Pending                     │
//! │                 ledger +qty only                                       │
//! │                    │                                                   │
//! │                    ├── approve ──► sale refund state, cash movement    │
//! │                    └── reject ───► ledger −qty, line quantities freed  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cash Refunds
//! A refund leaves the drawer when the refund method pays out cash and the
//! sale was rung on a register. The movement is booked on the sale's session
//! while it is open, otherwise on the refunding actor's open session. With
//! neither, the refund completes without a drawer movement.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use meridian_core::returns::plan_return;
use meridian_core::validation::validate_required;
use meridian_core::{
    Actor, CashMovement, CashMovementKind, CoreError, Money, MovementCause, MovementReference,
    MovementType, RefundMethod, ReturnItem, ReturnLine, ReturnStatus, ReturnWithItems, Sale,
    SaleReturn, StockKey,
};
use meridian_db::{generate_id, Database, Repositories, UnitOfWork};

use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub sale_id: String,
    pub refund_method: RefundMethod,
    pub lines: Vec<ReturnLine>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ReturnService {
    db: Database,
    require_approval: bool,
}

impl ReturnService {
    pub fn new(db: Database, require_approval: bool) -> Self {
        ReturnService {
            db,
            require_approval,
        }
    }

    /// Records a return against a sale.
    pub async fn create(&self, actor: &Actor, request: ReturnRequest) -> OpsResult<ReturnWithItems> {
        validate_required("reason", &request.reason)?;

        let mut uow = self.db.begin().await?;
        let now = uow.now();
        let mut sale = load_sale(&mut uow, &request.sale_id).await?;
        let sale_items = uow.sales().items(&sale.id).await?;
        let pending = Money::from_cents(uow.returns().pending_amount_for_sale(&sale.id).await?);

        let plan = plan_return(&sale, &sale_items, &request.lines, pending)?;

        let mut sale_return = SaleReturn {
            id: generate_id(),
            sale_id: sale.id.clone(),
            branch_id: sale.branch_id.clone(),
            register_session_id: sale.register_session_id.clone(),
            refund_method: request.refund_method,
            return_amount_cents: plan.amount.cents(),
            cash_refund: request.refund_method.pays_out_cash(sale.payment_method)
                && sale.register_session_id.is_some(),
            status: ReturnStatus::Pending,
            reason: request.reason.trim().to_string(),
            requested_by: actor.id.clone(),
            decided_by: None,
            created_at: now,
            decided_at: None,
        };
        let items: Vec<ReturnItem> = plan
            .items
            .iter()
            .map(|planned| {
                let sold = &sale_items[planned.item_index];
                ReturnItem {
                    id: generate_id(),
                    return_id: sale_return.id.clone(),
                    sale_item_id: sold.id.clone(),
                    product_id: sold.product_id.clone(),
                    variant_id: sold.variant_id.clone(),
                    quantity: planned.quantity,
                    refund_cents: planned.refund.cents(),
                }
            })
            .collect();

        if !self.require_approval {
            sale_return.decide(true, &actor.id, now)?;
            sale_return.register_session_id =
                refund_session(&mut uow, &sale, &sale_return, &actor.id).await?;
        }
        uow.returns().insert(&sale_return, &items).await?;

        let cause = MovementCause::new(
            MovementType::Return,
            MovementReference::Return(sale_return.id.clone()),
            &actor.id,
        );
        for item in &items {
            uow.sales()
                .adjust_item_returns(&item.sale_item_id, item.quantity, item.refund_cents)
                .await?;
            let key = StockKey::new(&item.product_id, item.variant_id.clone(), &sale_return.branch_id);
            uow.ledger().adjust(&key, item.quantity, &cause).await?;
        }

        if sale_return.status == ReturnStatus::Approved {
            settle_refund(&mut uow, &mut sale, &sale_return, &actor.id).await?;
        }
        uow.commit().await?;

        info!(
            return_id = %sale_return.id,
            sale_id = %sale.id,
            amount = %sale_return.amount(),
            status = ?sale_return.status,
            "Return recorded"
        );
        Ok(ReturnWithItems { sale_return, items })
    }

    /// Approves a pending return: the sale's refund state and the drawer
    /// catch up with the stock that already came back.
    pub async fn approve(&self, actor: &Actor, return_id: &str) -> OpsResult<ReturnWithItems> {
        let mut uow = self.db.begin().await?;
        let now = uow.now();
        let ReturnWithItems { mut sale_return, items } = uow.returns().get_with_items(return_id).await?;
        let mut sale = load_sale(&mut uow, &sale_return.sale_id).await?;

        sale_return.decide(true, &actor.id, now)?;
        sale_return.register_session_id = refund_session(&mut uow, &sale, &sale_return, &actor.id).await?;
        uow.returns().update_decision(&sale_return).await?;
        settle_refund(&mut uow, &mut sale, &sale_return, &actor.id).await?;
        uow.commit().await?;

        info!(return_id = %sale_return.id, approved_by = %actor.id, "Return approved");
        Ok(ReturnWithItems { sale_return, items })
    }

    /// Rejects a pending return and takes the credited units back out of
    /// stock.
    pub async fn reject(&self, actor: &Actor, return_id: &str) -> OpsResult<ReturnWithItems> {
        let mut uow = self.db.begin().await?;
        let now = uow.now();
        let ReturnWithItems { mut sale_return, items } = uow.returns().get_with_items(return_id).await?;

        sale_return.decide(false, &actor.id, now)?;
        uow.returns().update_decision(&sale_return).await?;

        let cause = MovementCause::new(
            MovementType::Return,
            MovementReference::Return(sale_return.id.clone()),
            &actor.id,
        )
        .with_note("return rejected");
        for item in &items {
            uow.sales()
                .adjust_item_returns(&item.sale_item_id, -item.quantity, -item.refund_cents)
                .await?;
            let key = StockKey::new(&item.product_id, item.variant_id.clone(), &sale_return.branch_id);
            uow.ledger().adjust(&key, -item.quantity, &cause).await?;
        }
        uow.commit().await?;

        info!(return_id = %sale_return.id, rejected_by = %actor.id, "Return rejected");
        Ok(ReturnWithItems { sale_return, items })
    }

    pub async fn get(&self, return_id: &str) -> OpsResult<ReturnWithItems> {
        let mut session = self.db.session().await?;
        Ok(session.returns().get_with_items(return_id).await?)
    }

    pub async fn list_for_sale(&self, sale_id: &str) -> OpsResult<Vec<SaleReturn>> {
        let mut session = self.db.session().await?;
        Ok(session.returns().list_for_sale(sale_id).await?)
    }
}

async fn load_sale(uow: &mut UnitOfWork, sale_id: &str) -> OpsResult<Sale> {
    Ok(uow
        .sales()
        .get(sale_id)
        .await?
        .ok_or_else(|| CoreError::not_found("sale", sale_id))?)
}

/// The open session a cash refund is paid from, if any.
async fn refund_session(
    uow: &mut UnitOfWork,
    sale: &Sale,
    sale_return: &SaleReturn,
    actor_id: &str,
) -> OpsResult<Option<String>> {
    if !sale_return.cash_refund {
        return Ok(sale.register_session_id.clone());
    }
    if let Some(session_id) = sale.register_session_id.as_deref() {
        if let Some(session) = uow.registers().get(session_id).await? {
            if session.is_open() {
                return Ok(Some(session.id));
            }
        }
    }
    let fallback = uow.registers().open_for_user(actor_id).await?;
    if fallback.is_none() {
        warn!(
            sale_id = %sale.id,
            return_id = %sale_return.id,
            "Cash refund with no open register session"
        );
    }
    Ok(fallback.map(|s| s.id))
}

/// Books an approved refund on the sale and, for cash refunds, the drawer.
async fn settle_refund(
    uow: &mut UnitOfWork,
    sale: &mut Sale,
    sale_return: &SaleReturn,
    actor_id: &str,
) -> OpsResult<()> {
    sale.apply_refund(sale_return.amount(), uow.now());
    uow.sales().update_refund_state(sale).await?;

    let session_id = match (&sale_return.register_session_id, sale_return.cash_refund) {
        (Some(session_id), true) if sale_return.amount().is_positive() => session_id,
        _ => return Ok(()),
    };
    let movement = CashMovement {
        id: generate_id(),
        session_id: session_id.clone(),
        kind: CashMovementKind::Return,
        amount_cents: sale_return.return_amount_cents,
        reference_id: Some(sale_return.id.clone()),
        note: None,
        actor_id: actor_id.to_string(),
        created_at: uow.now(),
    };
    uow.registers().insert_movement(&movement).await?;
    Ok(())
}
