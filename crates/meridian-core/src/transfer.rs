//! # Transfer State Machine
//!
//! Moving stock between branches.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   request ──► Pending ──approve──► Approved ──complete──► Completed    │
//! │                  │                    │                                 │
//! │                  ├──reject──► Rejected│                                 │
//! │                  │                    │                                 │
//! │                  └──cancel──► Cancelled ◄──cancel──┘                    │
//! │                                                                         │
//! │   Staged mode:    stock moves at approve; complete returns any         │
//! │                   shortfall (approved − received) to the source;       │
//! │                   cancelling an Approved transfer moves stock back.    │
//! │   Immediate mode: request moves stock and lands in Completed.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::stock::StockKey;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Rejected | TransferStatus::Cancelled
        )
    }
}

/// When stock physically moves for a transfer. Stored per transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Staged,
    Immediate,
}

impl FromStr for TransferMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staged" => Ok(TransferMode::Staged),
            "immediate" => Ok(TransferMode::Immediate),
            other => Err(ValidationError::InvalidFormat {
                field: "transfer mode".to_string(),
                reason: format!("expected 'staged' or 'immediate', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Staged => write!(f, "staged"),
            TransferMode::Immediate => write!(f, "immediate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Approve,
    Complete,
    Reject,
    Cancel,
}

impl TransferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Approve => "approve",
            TransferAction::Complete => "complete",
            TransferAction::Reject => "reject",
            TransferAction::Cancel => "cancel",
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transfer {
    pub id: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub mode: TransferMode,
    pub status: TransferStatus,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub completed_by: Option<String>,
    /// Who rejected or cancelled it.
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    /// Reason given on reject/cancel.
    pub close_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// The status this transfer moves to under `action`, or
    /// `InvalidStateTransition` when the current status does not allow it.
    pub fn next_status(&self, action: TransferAction) -> CoreResult<TransferStatus> {
        let next = match (self.status, action) {
            (TransferStatus::Pending, TransferAction::Approve) => TransferStatus::Approved,
            (TransferStatus::Approved, TransferAction::Complete) => TransferStatus::Completed,
            (TransferStatus::Pending, TransferAction::Reject) => TransferStatus::Rejected,
            (TransferStatus::Pending | TransferStatus::Approved, TransferAction::Cancel) => {
                TransferStatus::Cancelled
            }
            (current, action) => {
                return Err(CoreError::transition(
                    "transfer",
                    &self.id,
                    current,
                    action.as_str(),
                ))
            }
        };
        Ok(next)
    }

    /// The requester may always cancel; anyone else needs a superuser role.
    pub fn ensure_can_cancel(&self, actor_id: &str, is_superuser: bool) -> CoreResult<()> {
        if self.requested_by == actor_id || is_superuser {
            Ok(())
        } else {
            Err(CoreError::ActionNotPermitted {
                actor_id: actor_id.to_string(),
                action: "cancel another user's transfer",
            })
        }
    }

    /// True when stock has already left the source branch.
    pub fn has_moved_stock(&self) -> bool {
        self.mode == TransferMode::Staged && self.status == TransferStatus::Approved
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransferItem {
    pub id: String,
    pub transfer_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub requested_qty: i64,
    pub approved_qty: Option<i64>,
    pub received_qty: Option<i64>,
}

impl TransferItem {
    pub fn stock_key(&self, branch_id: &str) -> StockKey {
        StockKey::new(&self.product_id, self.variant_id.clone(), branch_id)
    }

    pub fn approved(&self) -> i64 {
        self.approved_qty.unwrap_or(0)
    }

    /// Units approved but not received.
    pub fn shortfall(&self) -> i64 {
        match self.received_qty {
            Some(received) => self.approved() - received,
            None => 0,
        }
    }
}

/// Transfer bundled with its items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferWithItems {
    pub transfer: Transfer,
    pub items: Vec<TransferItem>,
}

/// A per-item quantity override for approve/complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemQuantity {
    pub item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Quantity Resolution
// =============================================================================

/// Resolves the per-item quantity for an approve or complete step.
///
/// Items without an override take their ceiling: the requested quantity when
/// approving, the approved quantity when completing. Overrides must name items
/// of this transfer, appear once, and lie in `0..=ceiling`.
pub fn resolve_quantities(
    items: &[TransferItem],
    overrides: &[ItemQuantity],
    action: TransferAction,
) -> CoreResult<Vec<i64>> {
    let known: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    let mut seen = HashSet::new();
    for o in overrides {
        if !known.contains(o.item_id.as_str()) {
            return Err(CoreError::not_found("transfer item", &o.item_id));
        }
        if !seen.insert(o.item_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "item_id".to_string(),
                value: o.item_id.clone(),
            }
            .into());
        }
    }

    let field = match action {
        TransferAction::Approve => "approved_qty",
        TransferAction::Complete => "received_qty",
        TransferAction::Reject | TransferAction::Cancel => {
            return Ok(items.iter().map(|_| 0).collect())
        }
    };

    items
        .iter()
        .map(|item| {
            let max = match action {
                TransferAction::Approve => item.requested_qty,
                _ => item.approved(),
            };
            let qty = overrides
                .iter()
                .find(|o| o.item_id == item.id)
                .map(|o| o.quantity)
                .unwrap_or(max);
            if qty < 0 || qty > max {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    min: 0,
                    max,
                }
                .into());
            }
            Ok(qty)
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
