//! # Damaged Item Disposition
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  report ──► Pending ──(repair branch exists)──► SentToRepair            │
//! │                                                    │                    │
//! │                     decide(Repairable) ────────────┼──► Repaired        │
//! │                     decide(NotRepairable, expense) ┴──► Discarded       │
//! │                                                                         │
//! │  Stock:  origin ──Damage──► repair ──Repair──► origin                   │
//! │                                    └─Discard─► discard branch           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Pending` only exists inside the reporting unit of work: an item is never
//! committed in it, because a missing repair branch aborts the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DamageStatus {
    Pending,
    SentToRepair,
    Repaired,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RepairDecision {
    Pending,
    Repairable,
    NotRepairable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Physical,
    Defective,
    Expired,
    Packaging,
    Other,
}

/// The outcome of inspecting a damaged item at the repair branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Repairable,
    /// Written off; the expense is the loss booked for the discarded units.
    NotRepairable { expense: Money },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DamagedItem {
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Sale-ready branch the units came from.
    pub branch_id: String,
    pub repair_branch_id: Option<String>,
    pub discard_branch_id: Option<String>,
    pub quantity: i64,
    pub damage_type: DamageType,
    pub description: Option<String>,
    pub status: DamageStatus,
    pub repair_decision: RepairDecision,
    /// Set only when discarded.
    pub expense_cents: Option<i64>,
    pub reported_by: String,
    pub decided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl DamagedItem {
    pub fn origin_key(&self) -> StockKey {
        StockKey::new(&self.product_id, self.variant_id.clone(), &self.branch_id)
    }

    /// Marks the item as moved to `repair_branch_id`.
    pub fn send_to_repair(&mut self, repair_branch_id: &str) -> CoreResult<()> {
        if self.status != DamageStatus::Pending {
            return Err(CoreError::transition(
                "damaged item",
                &self.id,
                self.status,
                "send to repair",
            ));
        }
        self.repair_branch_id = Some(repair_branch_id.to_string());
        self.status = DamageStatus::SentToRepair;
        Ok(())
    }

    /// The repair branch holding the units, once a decision may be made.
    pub fn awaiting_decision(&self) -> CoreResult<&str> {
        match (&self.status, &self.repair_branch_id) {
            (DamageStatus::SentToRepair, Some(branch)) => Ok(branch.as_str()),
            (DamageStatus::SentToRepair, None) => Err(CoreError::MissingRepairBranch),
            (status, _) => Err(CoreError::transition(
                "damaged item",
                &self.id,
                status,
                "decide",
            )),
        }
    }

    /// Applies a decision. `discard_branch_id` is required for NotRepairable.
    pub fn apply_decision(
        &mut self,
        decision: Decision,
        discard_branch_id: Option<&str>,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.awaiting_decision()?;
        match decision {
            Decision::Repairable => {
                self.status = DamageStatus::Repaired;
                self.repair_decision = RepairDecision::Repairable;
            }
            Decision::NotRepairable { expense } => {
                let discard = discard_branch_id.ok_or(CoreError::MissingDiscardBranch)?;
                self.status = DamageStatus::Discarded;
                self.repair_decision = RepairDecision::NotRepairable;
                self.discard_branch_id = Some(discard.to_string());
                self.expense_cents = Some(expense.cents());
            }
        }
        self.decided_by = Some(actor_id.to_string());
        self.decided_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reported() -> DamagedItem {
        DamagedItem {
            id: "d-1".into(),
            product_id: "p-1".into(),
            variant_id: None,
            branch_id: "store".into(),
            repair_branch_id: None,
            discard_branch_id: None,
            quantity: 4,
            damage_type: DamageType::Physical,
            description: None,
            status: DamageStatus::Pending,
            repair_decision: RepairDecision::Pending,
            expense_cents: None,
            reported_by: "u-1".into(),
            decided_by: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn test_decision_requires_repair_first() {
        let mut item = reported();
        let err = item
            .apply_decision(Decision::Repairable, None, "u-2", Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_repairable() {
        let mut item = reported();
        item.send_to_repair("repair").unwrap();
        item.apply_decision(Decision::Repairable, None, "u-2", Utc::now())
            .unwrap();
        assert_eq!(item.status, DamageStatus::Repaired);
        assert_eq!(item.repair_decision, RepairDecision::Repairable);
        assert_eq!(item.expense_cents, None);
        assert!(item.send_to_repair("repair").is_err());
    }

    #[test]
    fn test_not_repairable_needs_discard_branch() {
        let mut item = reported();
        item.send_to_repair("repair").unwrap();
        let decision = Decision::NotRepairable {
            expense: Money::from_major(12),
        };
        assert!(matches!(
            item.apply_decision(decision, None, "u-2", Utc::now()),
            Err(CoreError::MissingDiscardBranch)
        ));
        assert_eq!(item.status, DamageStatus::SentToRepair);

        item.apply_decision(decision, Some("bin"), "u-2", Utc::now())
            .unwrap();
        assert_eq!(item.status, DamageStatus::Discarded);
        assert_eq!(item.expense_cents, Some(1200));
        assert_eq!(item.discard_branch_id.as_deref(), Some("bin"));
    }
}
