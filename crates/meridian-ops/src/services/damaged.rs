//! # Damaged Item Service
//!
//! Pulls damaged units off the shelf into the repair branch and, once
//! inspected, sends them back to their origin or on to the discard branch.
//!
//! The repair and discard branches are the first active branches of kind
//! `repair` and `discard`. When one is missing the operation fails with
//! `MissingRepairBranch` / `MissingDiscardBranch` and nothing is recorded.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use meridian_core::validation::{validate_amount_cents, validate_quantity};
use meridian_core::{
    Actor, BranchKind, CoreError, DamageStatus, DamageType, DamagedItem, Decision, MovementCause,
    MovementReference, MovementType, RepairDecision, ValidationError,
};
use meridian_db::{generate_id, DamagedItemFilter, Database, Repositories};

use super::{require_branch, require_product};
use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageReport {
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Branch the damaged units are taken from.
    pub branch_id: String,
    pub quantity: i64,
    pub damage_type: DamageType,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DamagedItemService {
    db: Database,
}

impl DamagedItemService {
    pub fn new(db: Database) -> Self {
        DamagedItemService { db }
    }

    /// Records damaged units and moves them to the repair branch.
    pub async fn report(&self, actor: &Actor, report: DamageReport) -> OpsResult<DamagedItem> {
        validate_quantity("quantity", report.quantity)?;

        let mut uow = self.db.begin().await?;
        let origin = require_branch(&mut uow, &report.branch_id).await?;
        if !origin.kind.is_sale_ready() {
            return Err(ValidationError::InvalidFormat {
                field: "branch_id".to_string(),
                reason: format!("damage is reported from stock branches, not {:?}", origin.kind),
            }
            .into());
        }
        require_product(&mut uow, &report.product_id).await?;

        let repair = match uow.branches().first_of_kind(BranchKind::Repair).await? {
            Some(branch) => branch,
            None => {
                warn!(branch_id = %origin.id, "Damage reported with no repair branch configured");
                return Err(CoreError::MissingRepairBranch.into());
            }
        };

        let mut item = DamagedItem {
            id: generate_id(),
            product_id: report.product_id,
            variant_id: report.variant_id,
            branch_id: origin.id,
            repair_branch_id: None,
            discard_branch_id: None,
            quantity: report.quantity,
            damage_type: report.damage_type,
            description: report.description,
            status: DamageStatus::Pending,
            repair_decision: RepairDecision::Pending,
            expense_cents: None,
            reported_by: actor.id.clone(),
            decided_by: None,
            created_at: uow.now(),
            decided_at: None,
        };
        item.send_to_repair(&repair.id)?;
        uow.damaged_items().insert(&item).await?;

        let cause = MovementCause::new(
            MovementType::Damage,
            MovementReference::DamagedItem(item.id.clone()),
            &actor.id,
        );
        uow.ledger()
            .move_stock(&item.origin_key(), &repair.id, item.quantity, &cause)
            .await?;
        uow.commit().await?;

        info!(
            damaged_item_id = %item.id,
            origin = %item.branch_id,
            repair_branch = %repair.id,
            quantity = item.quantity,
            damage_type = ?item.damage_type,
            "Damaged item sent to repair"
        );
        Ok(item)
    }

    /// Applies the repair decision and moves the units out of the repair
    /// branch.
    pub async fn decide(&self, actor: &Actor, item_id: &str, decision: Decision) -> OpsResult<DamagedItem> {
        if let Decision::NotRepairable { expense } = decision {
            validate_amount_cents("expense_cents", expense.cents())?;
        }

        let mut uow = self.db.begin().await?;
        let mut item = uow
            .damaged_items()
            .get(item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("damaged item", item_id))?;
        let repair_branch = item.awaiting_decision()?.to_string();

        let discard_branch = match decision {
            Decision::Repairable => None,
            Decision::NotRepairable { .. } => {
                let branch = uow.branches().first_of_kind(BranchKind::Discard).await?;
                if branch.is_none() {
                    warn!(damaged_item_id = %item.id, "Discard decided with no discard branch configured");
                }
                branch
            }
        };

        let now = uow.now();
        item.apply_decision(decision, discard_branch.as_ref().map(|b| b.id.as_str()), &actor.id, now)?;

        let (movement_type, destination) = match decision {
            Decision::Repairable => (MovementType::Repair, item.branch_id.clone()),
            Decision::NotRepairable { .. } => (
                MovementType::Discard,
                item.discard_branch_id.clone().ok_or(CoreError::MissingDiscardBranch)?,
            ),
        };
        let cause = MovementCause::new(
            movement_type,
            MovementReference::DamagedItem(item.id.clone()),
            &actor.id,
        );
        let from = item.origin_key().at_branch(&repair_branch);
        uow.ledger()
            .move_stock(&from, &destination, item.quantity, &cause)
            .await?;
        uow.damaged_items().update(&item).await?;
        uow.commit().await?;

        info!(
            damaged_item_id = %item.id,
            status = ?item.status,
            destination = %destination,
            decided_by = %actor.id,
            "Damaged item decided"
        );
        Ok(item)
    }

    pub async fn get(&self, item_id: &str) -> OpsResult<DamagedItem> {
        let mut session = self.db.session().await?;
        Ok(session
            .damaged_items()
            .get(item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("damaged item", item_id))?)
    }

    pub async fn list(&self, filter: &DamagedItemFilter) -> OpsResult<Vec<DamagedItem>> {
        let mut session = self.db.session().await?;
        Ok(session.damaged_items().list(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{bare_fixture, fixture, manager, Fixture};
    use meridian_core::Money;
    use meridian_db::MovementFilter;

    fn report(fx: &Fixture, qty: i64) -> DamageReport {
        DamageReport {
            product_id: fx.mug.id.clone(),
            variant_id: None,
            branch_id: fx.store.id.clone(),
            quantity: qty,
            damage_type: DamageType::Physical,
            description: Some("dropped crate".into()),
        }
    }

    #[tokio::test]
    async fn test_repairable_round_trip_restores_origin() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 10).await;
        let damaged = fx.office.damaged_items();

        let item = damaged.report(&manager(), report(&fx, 4)).await.unwrap();
        assert_eq!(item.status, DamageStatus::SentToRepair);
        assert_eq!(item.repair_branch_id.as_deref(), Some(fx.repair.id.as_str()));
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 6);
        assert_eq!(fx.quantity(&fx.repair.id, &fx.mug.id).await, 4);

        let item = damaged.decide(&manager(), &item.id, Decision::Repairable).await.unwrap();
        assert_eq!(item.status, DamageStatus::Repaired);
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 10);
        assert_eq!(fx.quantity(&fx.repair.id, &fx.mug.id).await, 0);

        let movements = fx
            .office
            .inventory()
            .movements(&MovementFilter {
                reference: Some(MovementReference::DamagedItem(item.id.clone())),
                ..MovementFilter::default()
            })
            .await
            .unwrap();
        let types: Vec<MovementType> = movements.iter().map(|m| m.movement_type).collect();
        assert_eq!(types, vec![MovementType::Damage, MovementType::Repair]);
    }

    #[tokio::test]
    async fn test_not_repairable_lands_in_discard_branch() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 10).await;
        let damaged = fx.office.damaged_items();

        let item = damaged.report(&manager(), report(&fx, 4)).await.unwrap();
        let item = damaged
            .decide(
                &manager(),
                &item.id,
                Decision::NotRepairable { expense: Money::from_cents(1_250) },
            )
            .await
            .unwrap();

        assert_eq!(item.status, DamageStatus::Discarded);
        assert_eq!(item.expense_cents, Some(1_250));
        assert_eq!(item.discard_branch_id.as_deref(), Some(fx.discard.id.as_str()));
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 6);
        assert_eq!(fx.quantity(&fx.repair.id, &fx.mug.id).await, 0);
        assert_eq!(fx.quantity(&fx.discard.id, &fx.mug.id).await, 4);

        let err = damaged.decide(&manager(), &item.id, Decision::Repairable).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_report_needs_stock_at_origin() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 2).await;

        let err = fx.office.damaged_items().report(&manager(), report(&fx, 3)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert!(fx
            .office
            .damaged_items()
            .list(&DamagedItemFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_repair_branch_records_nothing() {
        let fx = bare_fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 5).await;
        let damaged = fx.office.damaged_items();

        let err = damaged.report(&manager(), report(&fx, 1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingConfiguration);
        assert!(damaged.list(&DamagedItemFilter::default()).await.unwrap().is_empty());
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 5);
    }

    #[tokio::test]
    async fn test_missing_discard_branch_rolls_back_decision() {
        let fx = bare_fixture().await;
        fx.office
            .catalog()
            .set_branch_active(&fx.repair.id, true)
            .await
            .unwrap();
        fx.stock(&fx.store.id, &fx.mug.id, 5).await;
        let damaged = fx.office.damaged_items();

        let item = damaged.report(&manager(), report(&fx, 2)).await.unwrap();
        let err = damaged
            .decide(
                &manager(),
                &item.id,
                Decision::NotRepairable { expense: Money::zero() },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingConfiguration);

        let reloaded = damaged.get(&item.id).await.unwrap();
        assert_eq!(reloaded.status, DamageStatus::SentToRepair);
        assert!(reloaded.decided_by.is_none());
    }

    #[tokio::test]
    async fn test_repair_branch_cannot_report_damage() {
        let fx = fixture().await;
        let mut bad = report(&fx, 1);
        bad.branch_id = fx.repair.id.clone();

        let err = fx.office.damaged_items().report(&manager(), bad).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
