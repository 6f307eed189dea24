//! # Inventory Service
//!
//! Goods receipts, manual corrections, reservations and the read side of the
//! ledger (levels, low-stock, movement history).
//!
//! Every quantity change goes through [`meridian_db::StockLedger`], so each
//! one leaves a movement behind. Reservations and reorder points change the
//! row only.

use serde::{Deserialize, Serialize};
use tracing::info;

use meridian_core::validation::{validate_count, validate_quantity, validate_required};
use meridian_core::{
    Actor, MovementCause, MovementRecord, MovementReference, MovementType, StockKey, StockRecord,
};
use meridian_db::{generate_id, Database, MovementFilter, Repositories};

use super::{require_branch, require_product, validate_stock_lines, StockLine};
use crate::error::OpsResult;

/// Goods arriving at a branch from a supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub branch_id: String,
    /// Purchase order or delivery note number.
    pub reference: String,
    pub lines: Vec<StockLine>,
    pub note: Option<String>,
}

/// A signed manual correction at one stock row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub branch_id: String,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Database,
}

impl InventoryService {
    pub fn new(db: Database) -> Self {
        InventoryService { db }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Books received goods, one `Purchase` movement per line.
    pub async fn receive_purchase(
        &self,
        actor: &Actor,
        receipt: PurchaseReceipt,
    ) -> OpsResult<Vec<StockRecord>> {
        validate_required("reference", &receipt.reference)?;
        validate_stock_lines("lines", &receipt.lines)?;

        let mut uow = self.db.begin().await?;
        require_branch(&mut uow, &receipt.branch_id).await?;

        let mut cause = MovementCause::new(
            MovementType::Purchase,
            MovementReference::Purchase(receipt.reference.trim().to_string()),
            &actor.id,
        );
        if let Some(note) = receipt.note.as_deref() {
            cause = cause.with_note(note);
        }

        let mut records = Vec::with_capacity(receipt.lines.len());
        for line in &receipt.lines {
            require_product(&mut uow, &line.product_id).await?;
            let key = line.key(&receipt.branch_id);
            records.push(uow.ledger().adjust(&key, line.quantity, &cause).await?);
        }
        uow.commit().await?;

        info!(
            branch_id = %receipt.branch_id,
            reference = %receipt.reference,
            lines = records.len(),
            "Purchase received"
        );
        Ok(records)
    }

    /// Applies a manual correction. Negative deltas cannot take available
    /// stock below zero.
    pub async fn adjust_stock(&self, actor: &Actor, adjustment: StockAdjustment) -> OpsResult<StockRecord> {
        validate_quantity("delta", adjustment.delta.saturating_abs())?;
        validate_required("reason", &adjustment.reason)?;

        let mut uow = self.db.begin().await?;
        require_branch(&mut uow, &adjustment.branch_id).await?;
        require_product(&mut uow, &adjustment.product_id).await?;

        let key = StockKey::new(
            &adjustment.product_id,
            adjustment.variant_id.clone(),
            &adjustment.branch_id,
        );
        let cause = MovementCause::new(
            MovementType::Adjustment,
            MovementReference::Adjustment(generate_id()),
            &actor.id,
        )
        .with_note(adjustment.reason.trim());
        let record = uow.ledger().adjust(&key, adjustment.delta, &cause).await?;
        uow.commit().await?;

        info!(
            key = %key,
            delta = adjustment.delta,
            actor_id = %actor.id,
            "Stock adjusted manually"
        );
        Ok(record)
    }

    pub async fn reserve(&self, key: &StockKey, quantity: i64) -> OpsResult<StockRecord> {
        let mut uow = self.db.begin().await?;
        let record = uow.ledger().reserve(key, quantity).await?;
        uow.commit().await?;
        Ok(record)
    }

    pub async fn release(&self, key: &StockKey, quantity: i64) -> OpsResult<StockRecord> {
        let mut uow = self.db.begin().await?;
        let record = uow.ledger().release(key, quantity).await?;
        uow.commit().await?;
        Ok(record)
    }

    pub async fn set_reorder_point(&self, key: &StockKey, point: i64) -> OpsResult<StockRecord> {
        validate_count("reorder_point", point)?;

        let mut uow = self.db.begin().await?;
        require_branch(&mut uow, &key.branch_id).await?;
        require_product(&mut uow, &key.product_id).await?;
        let record = uow.ledger().set_reorder_point(key, point).await?;
        uow.commit().await?;
        Ok(record)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The row for `key`; a key never stocked reads as all zeros.
    pub async fn stock_level(&self, key: &StockKey) -> OpsResult<StockRecord> {
        let mut session = self.db.session().await?;
        let found = session.stock().find(key).await?;
        Ok(found.unwrap_or_else(|| StockRecord::empty(generate_id(), key, chrono::Utc::now())))
    }

    pub async fn stock_for_branch(&self, branch_id: &str) -> OpsResult<Vec<StockRecord>> {
        let mut session = self.db.session().await?;
        Ok(session.stock().list_for_branch(branch_id).await?)
    }

    pub async fn stock_for_product(&self, product_id: &str) -> OpsResult<Vec<StockRecord>> {
        let mut session = self.db.session().await?;
        Ok(session.stock().list_for_product(product_id).await?)
    }

    /// Rows whose available quantity has fallen to their reorder point.
    pub async fn low_stock(&self, branch_id: Option<&str>) -> OpsResult<Vec<StockRecord>> {
        let mut session = self.db.session().await?;
        Ok(session.stock().below_reorder_point(branch_id).await?)
    }

    pub async fn movements(&self, filter: &MovementFilter) -> OpsResult<Vec<MovementRecord>> {
        let mut session = self.db.session().await?;
        Ok(session.movements().list(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, OpsError};
    use crate::testing::{fixture, manager};
    use meridian_core::CoreError;

    #[tokio::test]
    async fn test_purchase_writes_one_movement_per_line() {
        let fx = fixture().await;
        let inventory = fx.office.inventory();

        let records = inventory
            .receive_purchase(
                &manager(),
                PurchaseReceipt {
                    branch_id: fx.warehouse.id.clone(),
                    reference: "PO-1001".into(),
                    lines: vec![StockLine::new(&fx.shirt.id, 40), StockLine::new(&fx.mug.id, 12)],
                    note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(records[0].quantity(), 40);
        assert_eq!(records[1].quantity(), 12);

        let movements = inventory
            .movements(&MovementFilter {
                reference: Some(MovementReference::Purchase("PO-1001".into())),
                ..MovementFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.movement_type == MovementType::Purchase));
        assert!(movements.iter().all(|m| m.to_branch_id.as_deref() == Some(fx.warehouse.id.as_str())));
    }

    #[tokio::test]
    async fn test_purchase_rolls_back_on_unknown_product() {
        let fx = fixture().await;
        let inventory = fx.office.inventory();

        let err = inventory
            .receive_purchase(
                &manager(),
                PurchaseReceipt {
                    branch_id: fx.store.id.clone(),
                    reference: "PO-1002".into(),
                    lines: vec![StockLine::new(&fx.shirt.id, 5), StockLine::new("ghost", 5)],
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let level = inventory.stock_level(&StockKey::new(&fx.shirt.id, None, &fx.store.id)).await.unwrap();
        assert_eq!(level.quantity(), 0);
    }

    #[tokio::test]
    async fn test_adjustment_respects_available_quantity() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 10).await;
        let key = StockKey::new(&fx.shirt.id, None, &fx.store.id);
        let inventory = fx.office.inventory();

        inventory.reserve(&key, 4).await.unwrap();

        let err = inventory
            .adjust_stock(
                &manager(),
                StockAdjustment {
                    product_id: fx.shirt.id.clone(),
                    variant_id: None,
                    branch_id: fx.store.id.clone(),
                    delta: -7,
                    reason: "stocktake".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpsError::Domain(CoreError::InsufficientStock { available: 6, requested: 7, .. })
        ));

        let record = inventory
            .adjust_stock(
                &manager(),
                StockAdjustment {
                    product_id: fx.shirt.id.clone(),
                    variant_id: None,
                    branch_id: fx.store.id.clone(),
                    delta: -6,
                    reason: "stocktake".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.quantity(), 4);
        assert_eq!(record.available_quantity(), 0);
        assert!(record.is_consistent());
    }

    #[tokio::test]
    async fn test_adjustment_note_is_kept_on_movement() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 3).await;
        let inventory = fx.office.inventory();

        inventory
            .adjust_stock(
                &manager(),
                StockAdjustment {
                    product_id: fx.mug.id.clone(),
                    variant_id: None,
                    branch_id: fx.store.id.clone(),
                    delta: -1,
                    reason: "chipped on shelf".into(),
                },
            )
            .await
            .unwrap();

        let movements = inventory
            .movements(&MovementFilter {
                movement_type: Some(MovementType::Adjustment),
                product_id: Some(fx.mug.id.clone()),
                ..MovementFilter::default()
            })
            .await
            .unwrap();
        let last = movements.last().unwrap();
        assert_eq!(last.quantity, 1);
        assert_eq!(last.from_branch_id.as_deref(), Some(fx.store.id.as_str()));
        assert_eq!(last.note.as_deref(), Some("chipped on shelf"));
    }

    #[tokio::test]
    async fn test_reserve_and_release_write_no_movement() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let key = StockKey::new(&fx.shirt.id, None, &fx.store.id);
        let inventory = fx.office.inventory();
        let before = inventory.movements(&MovementFilter::default()).await.unwrap().len();

        let reserved = inventory.reserve(&key, 3).await.unwrap();
        assert_eq!(reserved.available_quantity(), 2);
        assert!(inventory.reserve(&key, 3).await.is_err());
        let released = inventory.release(&key, 3).await.unwrap();
        assert_eq!(released.available_quantity(), 5);

        let after = inventory.movements(&MovementFilter::default()).await.unwrap().len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_low_stock_lists_rows_at_reorder_point() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 3).await;
        fx.stock(&fx.store.id, &fx.mug.id, 20).await;
        let inventory = fx.office.inventory();

        inventory
            .set_reorder_point(&StockKey::new(&fx.shirt.id, None, &fx.store.id), 5)
            .await
            .unwrap();
        inventory
            .set_reorder_point(&StockKey::new(&fx.mug.id, None, &fx.store.id), 5)
            .await
            .unwrap();

        let low = inventory.low_stock(Some(&fx.store.id)).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_id(), fx.shirt.id);
        assert!(inventory.low_stock(Some(&fx.warehouse.id)).await.unwrap().is_empty());
    }
}
