//! # Stock Records and Movements
//!
//! The arithmetic half of the inventory ledger. Persistence and locking live
//! in `meridian-db`; this module decides whether a change is allowed.
//!
//! ## Stock Record Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key = (product_id, variant_id?, branch_id)                            │
//! │                                                                         │
//! │  quantity            on hand, ≥ 0                                       │
//! │  reserved_quantity   earmarked, ≥ 0                                     │
//! │  available_quantity  = quantity − reserved_quantity, ≥ 0   (derived)   │
//! │                                                                         │
//! │  Fields are private: every write goes through apply_delta / reserve /  │
//! │  release, each of which recomputes available_quantity.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Movement Log
//! Every ledger mutation produces exactly one [`MovementRecord`]. A transfer
//! move is a single record with both `from_branch_id` and `to_branch_id` set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Stock Key
// =============================================================================

/// Identifies one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockKey {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub branch_id: String,
}

impl StockKey {
    pub fn new(
        product_id: impl Into<String>,
        variant_id: Option<String>,
        branch_id: impl Into<String>,
    ) -> Self {
        StockKey {
            product_id: product_id.into(),
            variant_id,
            branch_id: branch_id.into(),
        }
    }

    /// The same product/variant at another branch.
    pub fn at_branch(&self, branch_id: &str) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            branch_id: branch_id.to_string(),
        }
    }

    /// Builds the shortage error for this key.
    pub fn shortage(&self, available: i64, requested: i64) -> CoreError {
        CoreError::InsufficientStock {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            branch_id: self.branch_id.clone(),
            available,
            requested,
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}/{}@{}", self.product_id, variant, self.branch_id),
            None => write!(f, "{}@{}", self.product_id, self.branch_id),
        }
    }
}

// =============================================================================
// Stock Record
// =============================================================================

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRecord {
    id: String,
    product_id: String,
    variant_id: Option<String>,
    branch_id: String,
    quantity: i64,
    reserved_quantity: i64,
    available_quantity: i64,
    reorder_point: i64,
    #[ts(as = "String")]
    updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// The implicit zero record used when a key has no row yet.
    pub fn empty(id: impl Into<String>, key: &StockKey, at: DateTime<Utc>) -> Self {
        StockRecord {
            id: id.into(),
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            branch_id: key.branch_id.clone(),
            quantity: 0,
            reserved_quantity: 0,
            available_quantity: 0,
            reorder_point: 0,
            updated_at: at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            branch_id: self.branch_id.clone(),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn variant_id(&self) -> Option<&str> {
        self.variant_id.as_deref()
    }

    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.available_quantity
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True when a reorder point is set and availability has fallen to it.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_point > 0 && self.available_quantity <= self.reorder_point
    }

    /// True when the derived column agrees with on-hand and reserved.
    pub fn is_consistent(&self) -> bool {
        self.quantity >= 0
            && self.reserved_quantity >= 0
            && self.available_quantity == self.quantity - self.reserved_quantity
    }

    /// Changes on-hand quantity by `delta`.
    ///
    /// Outbound deltas are checked against *available* stock so that reserved
    /// units cannot be sold or shipped. Inbound deltas never fail.
    pub fn apply_delta(&mut self, delta: i64, at: DateTime<Utc>) -> CoreResult<()> {
        if delta < 0 && self.available_quantity < -delta {
            return Err(self.key().shortage(self.available_quantity, -delta));
        }
        self.quantity += delta;
        self.recompute(at);
        Ok(())
    }

    /// Earmarks `qty` units without changing on-hand.
    pub fn reserve(&mut self, qty: i64, at: DateTime<Utc>) -> CoreResult<()> {
        if self.available_quantity < qty {
            return Err(self.key().shortage(self.available_quantity, qty));
        }
        self.reserved_quantity += qty;
        self.recompute(at);
        Ok(())
    }

    /// Returns `qty` earmarked units to available.
    pub fn release(&mut self, qty: i64, at: DateTime<Utc>) -> CoreResult<()> {
        if qty > self.reserved_quantity {
            return Err(ValidationError::OutOfRange {
                field: "release quantity".to_string(),
                min: 1,
                max: self.reserved_quantity,
            }
            .into());
        }
        self.reserved_quantity -= qty;
        self.recompute(at);
        Ok(())
    }

    pub fn set_reorder_point(&mut self, point: i64, at: DateTime<Utc>) -> CoreResult<()> {
        if point < 0 {
            return Err(ValidationError::OutOfRange {
                field: "reorder_point".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        self.reorder_point = point;
        self.updated_at = at;
        Ok(())
    }

    fn recompute(&mut self, at: DateTime<Utc>) {
        self.available_quantity = self.quantity - self.reserved_quantity;
        self.updated_at = at;
    }
}

// =============================================================================
// Movement Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Transfer,
    Sale,
    Return,
    Damage,
    Repair,
    Discard,
    Adjustment,
}

/// The kind half of a movement reference, as stored in `reference_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Sale,
    Return,
    Transfer,
    DamagedItem,
    Purchase,
    Adjustment,
}

/// What caused a movement. One variant per originating record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    Sale(String),
    Return(String),
    Transfer(String),
    DamagedItem(String),
    /// Goods receipt / purchase order number.
    Purchase(String),
    /// Manual stock correction; the id is the correction batch.
    Adjustment(String),
}

impl MovementReference {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            MovementReference::Sale(_) => ReferenceKind::Sale,
            MovementReference::Return(_) => ReferenceKind::Return,
            MovementReference::Transfer(_) => ReferenceKind::Transfer,
            MovementReference::DamagedItem(_) => ReferenceKind::DamagedItem,
            MovementReference::Purchase(_) => ReferenceKind::Purchase,
            MovementReference::Adjustment(_) => ReferenceKind::Adjustment,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MovementReference::Sale(id)
            | MovementReference::Return(id)
            | MovementReference::Transfer(id)
            | MovementReference::DamagedItem(id)
            | MovementReference::Purchase(id)
            | MovementReference::Adjustment(id) => id,
        }
    }

    /// Rebuilds a reference from its stored columns.
    pub fn from_parts(kind: ReferenceKind, id: String) -> Self {
        match kind {
            ReferenceKind::Sale => MovementReference::Sale(id),
            ReferenceKind::Return => MovementReference::Return(id),
            ReferenceKind::Transfer => MovementReference::Transfer(id),
            ReferenceKind::DamagedItem => MovementReference::DamagedItem(id),
            ReferenceKind::Purchase => MovementReference::Purchase(id),
            ReferenceKind::Adjustment => MovementReference::Adjustment(id),
        }
    }
}

/// Why the ledger is being changed and by whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementCause {
    pub movement_type: MovementType,
    pub reference: MovementReference,
    pub actor_id: String,
    /// Free-text note copied onto the movement (adjustment reason).
    pub note: Option<String>,
}

impl MovementCause {
    pub fn new(
        movement_type: MovementType,
        reference: MovementReference,
        actor_id: impl Into<String>,
    ) -> Self {
        MovementCause {
            movement_type,
            reference,
            actor_id: actor_id.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// An immutable entry in the movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementRecord {
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Branch the units left (None for inbound-only movements).
    pub from_branch_id: Option<String>,
    /// Branch the units arrived at (None for outbound-only movements).
    pub to_branch_id: Option<String>,
    pub movement_type: MovementType,
    /// Always positive; direction comes from the branch columns.
    pub quantity: i64,
    pub reference: MovementReference,
    pub actor_id: String,
    /// Free-text note (adjustment reason).
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Movement for a signed adjustment of a single row.
    pub fn for_delta(
        id: impl Into<String>,
        key: &StockKey,
        delta: i64,
        cause: &MovementCause,
        at: DateTime<Utc>,
    ) -> Self {
        let (from, to) = if delta < 0 {
            (Some(key.branch_id.clone()), None)
        } else {
            (None, Some(key.branch_id.clone()))
        };
        MovementRecord {
            id: id.into(),
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            from_branch_id: from,
            to_branch_id: to,
            movement_type: cause.movement_type,
            quantity: delta.abs(),
            reference: cause.reference.clone(),
            actor_id: cause.actor_id.clone(),
            note: cause.note.clone(),
            created_at: at,
        }
    }

    /// Movement for units moving between two rows of the same product/variant.
    pub fn for_move(
        id: impl Into<String>,
        from: &StockKey,
        to_branch_id: &str,
        quantity: i64,
        cause: &MovementCause,
        at: DateTime<Utc>,
    ) -> Self {
        MovementRecord {
            id: id.into(),
            product_id: from.product_id.clone(),
            variant_id: from.variant_id.clone(),
            from_branch_id: Some(from.branch_id.clone()),
            to_branch_id: Some(to_branch_id.to_string()),
            movement_type: cause.movement_type,
            quantity,
            reference: cause.reference.clone(),
            actor_id: cause.actor_id.clone(),
            note: cause.note.clone(),
            created_at: at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
