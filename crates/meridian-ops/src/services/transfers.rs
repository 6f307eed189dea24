//! # Transfer Service
//!
//! Drives [`Transfer`] through its state machine and moves the stock each
//! step calls for.
//!
//! ## Stock Effects
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────────┐
//! │ Step         │ Ledger                                                   │
//! ├──────────────┼──────────────────────────────────────────────────────────┤
//! │ request      │ staged: none                                             │
//! │              │ immediate: requested qty source ──► destination          │
//! │ approve      │ approved qty source ──► destination                      │
//! │ complete     │ shortfall (approved − received) destination ──► source   │
//! │ reject       │ none                                                     │
//! │ cancel       │ Approved: approved qty destination ──► source            │
//! └──────────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every move is one two-branch `Transfer` movement. A shortage on any line
//! rolls back the whole step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meridian_core::transfer::{resolve_quantities, TransferAction};
use meridian_core::validation::validate_distinct;
use meridian_core::{
    Actor, CoreError, ItemQuantity, MovementCause, MovementReference, MovementType, Transfer,
    TransferItem, TransferMode, TransferStatus, TransferWithItems,
};
use meridian_db::{generate_id, Database, Repositories, UnitOfWork};

use super::{require_branch, require_product, validate_stock_lines, StockLine};
use crate::config::TransferSettings;
use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub items: Vec<StockLine>,
    pub notes: Option<String>,
    /// Overrides the configured mode for this transfer.
    pub mode: Option<TransferMode>,
}

#[derive(Debug, Clone)]
pub struct TransferService {
    db: Database,
    settings: TransferSettings,
}

impl TransferService {
    pub fn new(db: Database, settings: TransferSettings) -> Self {
        TransferService { db, settings }
    }

    // =========================================================================
    // Request
    // =========================================================================

    /// Creates a transfer. Immediate transfers move stock now and come back
    /// Completed.
    pub async fn request(&self, actor: &Actor, request: TransferRequest) -> OpsResult<TransferWithItems> {
        validate_distinct(
            "from_branch_id",
            &request.from_branch_id,
            "to_branch_id",
            &request.to_branch_id,
        )?;
        validate_stock_lines("items", &request.items)?;
        let mode = request.mode.unwrap_or(self.settings.mode);

        let mut uow = self.db.begin().await?;
        require_branch(&mut uow, &request.from_branch_id).await?;
        require_branch(&mut uow, &request.to_branch_id).await?;
        for line in &request.items {
            require_product(&mut uow, &line.product_id).await?;
        }

        let now = uow.now();
        let mut transfer = Transfer {
            id: generate_id(),
            from_branch_id: request.from_branch_id,
            to_branch_id: request.to_branch_id,
            mode,
            status: TransferStatus::Pending,
            requested_by: actor.id.clone(),
            approved_by: None,
            completed_by: None,
            closed_by: None,
            notes: request.notes,
            close_reason: None,
            created_at: now,
            approved_at: None,
            completed_at: None,
            closed_at: None,
        };
        let mut items: Vec<TransferItem> = request
            .items
            .iter()
            .map(|line| TransferItem {
                id: generate_id(),
                transfer_id: transfer.id.clone(),
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                requested_qty: line.quantity,
                approved_qty: None,
                received_qty: None,
            })
            .collect();

        if mode == TransferMode::Immediate {
            transfer.status = TransferStatus::Completed;
            transfer.approved_by = Some(actor.id.clone());
            transfer.completed_by = Some(actor.id.clone());
            transfer.approved_at = Some(now);
            transfer.completed_at = Some(now);
            for item in &mut items {
                item.approved_qty = Some(item.requested_qty);
                item.received_qty = Some(item.requested_qty);
            }
        }

        uow.transfers().insert(&transfer, &items).await?;

        if mode == TransferMode::Immediate {
            let quantities: Vec<i64> = items.iter().map(|i| i.requested_qty).collect();
            move_items(
                &mut uow,
                &transfer,
                &items,
                &quantities,
                Direction::Forward,
                &actor.id,
            )
            .await?;
        }
        uow.commit().await?;

        info!(
            transfer_id = %transfer.id,
            from = %transfer.from_branch_id,
            to = %transfer.to_branch_id,
            mode = %mode,
            status = ?transfer.status,
            "Transfer requested"
        );
        Ok(TransferWithItems { transfer, items })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Approves a Pending transfer and moves the approved quantities.
    ///
    /// Items without an override are approved in full.
    pub async fn approve(
        &self,
        actor: &Actor,
        transfer_id: &str,
        overrides: &[ItemQuantity],
    ) -> OpsResult<TransferWithItems> {
        let mut uow = self.db.begin().await?;
        let TransferWithItems { mut transfer, mut items } =
            uow.transfers().get_with_items(transfer_id).await?;

        let next = transfer.next_status(TransferAction::Approve)?;
        let quantities = resolve_quantities(&items, overrides, TransferAction::Approve)?;

        for (item, qty) in items.iter_mut().zip(&quantities) {
            item.approved_qty = Some(*qty);
            uow.transfers().update_item(item).await?;
        }
        move_items(
            &mut uow,
            &transfer,
            &items,
            &quantities,
            Direction::Forward,
            &actor.id,
        )
        .await?;

        transfer.status = next;
        transfer.approved_by = Some(actor.id.clone());
        transfer.approved_at = Some(uow.now());
        uow.transfers().update(&transfer).await?;
        uow.commit().await?;

        info!(transfer_id = %transfer.id, approved_by = %actor.id, "Transfer approved");
        Ok(TransferWithItems { transfer, items })
    }

    /// Records what arrived. Units approved but not received go back to the
    /// source branch.
    pub async fn complete(
        &self,
        actor: &Actor,
        transfer_id: &str,
        overrides: &[ItemQuantity],
    ) -> OpsResult<TransferWithItems> {
        let mut uow = self.db.begin().await?;
        let TransferWithItems { mut transfer, mut items } =
            uow.transfers().get_with_items(transfer_id).await?;

        let next = transfer.next_status(TransferAction::Complete)?;
        let received = resolve_quantities(&items, overrides, TransferAction::Complete)?;

        for (item, qty) in items.iter_mut().zip(&received) {
            item.received_qty = Some(*qty);
            uow.transfers().update_item(item).await?;
        }
        let shortfalls: Vec<i64> = items.iter().map(TransferItem::shortfall).collect();
        move_items(
            &mut uow,
            &transfer,
            &items,
            &shortfalls,
            Direction::Back,
            &actor.id,
        )
        .await?;

        transfer.status = next;
        transfer.completed_by = Some(actor.id.clone());
        transfer.completed_at = Some(uow.now());
        uow.transfers().update(&transfer).await?;
        uow.commit().await?;

        info!(
            transfer_id = %transfer.id,
            completed_by = %actor.id,
            returned_units = shortfalls.iter().sum::<i64>(),
            "Transfer completed"
        );
        Ok(TransferWithItems { transfer, items })
    }

    /// Rejects a Pending transfer. No stock has moved yet.
    pub async fn reject(&self, actor: &Actor, transfer_id: &str, reason: Option<String>) -> OpsResult<Transfer> {
        let mut uow = self.db.begin().await?;
        let mut transfer = uow
            .transfers()
            .get(transfer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("transfer", transfer_id))?;

        transfer.status = transfer.next_status(TransferAction::Reject)?;
        transfer.closed_by = Some(actor.id.clone());
        transfer.close_reason = reason;
        transfer.closed_at = Some(uow.now());
        uow.transfers().update(&transfer).await?;
        uow.commit().await?;

        info!(transfer_id = %transfer.id, rejected_by = %actor.id, "Transfer rejected");
        Ok(transfer)
    }

    /// Cancels a Pending or Approved transfer. Stock already moved at approve
    /// goes back to the source.
    pub async fn cancel(&self, actor: &Actor, transfer_id: &str, reason: Option<String>) -> OpsResult<Transfer> {
        let mut uow = self.db.begin().await?;
        let TransferWithItems { mut transfer, items } =
            uow.transfers().get_with_items(transfer_id).await?;

        let next = transfer.next_status(TransferAction::Cancel)?;
        transfer.ensure_can_cancel(&actor.id, self.settings.is_superuser(&actor.role))?;

        if transfer.has_moved_stock() {
            let approved: Vec<i64> = items.iter().map(TransferItem::approved).collect();
            move_items(
                &mut uow,
                &transfer,
                &items,
                &approved,
                Direction::Back,
                &actor.id,
            )
            .await?;
        }

        transfer.status = next;
        transfer.closed_by = Some(actor.id.clone());
        transfer.close_reason = reason;
        transfer.closed_at = Some(uow.now());
        uow.transfers().update(&transfer).await?;
        uow.commit().await?;

        info!(transfer_id = %transfer.id, cancelled_by = %actor.id, "Transfer cancelled");
        Ok(transfer)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, transfer_id: &str) -> OpsResult<TransferWithItems> {
        let mut session = self.db.session().await?;
        Ok(session.transfers().get_with_items(transfer_id).await?)
    }

    /// Transfers touching `branch_id` on either side, newest first.
    pub async fn list(
        &self,
        branch_id: Option<&str>,
        status: Option<TransferStatus>,
        limit: u32,
    ) -> OpsResult<Vec<Transfer>> {
        let mut session = self.db.session().await?;
        Ok(session.transfers().list(branch_id, status, limit).await?)
    }
}

// =============================================================================
// Ledger Moves
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Source to destination.
    Forward,
    /// Destination back to source.
    Back,
}

/// Moves `quantities[i]` of `items[i]`; zero quantities are skipped.
async fn move_items(
    uow: &mut UnitOfWork,
    transfer: &Transfer,
    items: &[TransferItem],
    quantities: &[i64],
    direction: Direction,
    actor_id: &str,
) -> OpsResult<()> {
    let (from, to) = match direction {
        Direction::Forward => (&transfer.from_branch_id, &transfer.to_branch_id),
        Direction::Back => (&transfer.to_branch_id, &transfer.from_branch_id),
    };
    let cause = MovementCause::new(
        MovementType::Transfer,
        MovementReference::Transfer(transfer.id.clone()),
        actor_id,
    );

    for (item, &qty) in items.iter().zip(quantities) {
        if qty == 0 {
            continue;
        }
        uow.ledger()
            .move_stock(&item.stock_key(from), to, qty, &cause)
            .await?;
        debug!(transfer_id = %transfer.id, item_id = %item.id, qty, ?direction, "Transfer line moved");
    }
    Ok(())
}
