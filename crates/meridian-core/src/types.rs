//! # Shared Domain Types
//!
//! Actors, branches and products: the reference data every workflow points at.
//!
//! ## Branch Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store / warehouse  ── sale-ready stock, source & target of transfers  │
//! │  repair             ── damaged goods waiting for a repair decision     │
//! │  discard            ── goods written off as not repairable             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Actor
// =============================================================================

/// The authenticated caller, as supplied by the request-handling layer.
///
/// `role` is looked up in the configured discount policy and superuser list;
/// it is never compared against literals inside business rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: role.into(),
        }
    }
}

// =============================================================================
// Branch
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Sale-ready retail location.
    Store,
    /// Sale-ready stock holding location without a till.
    Warehouse,
    /// Holds damaged goods until a repair decision.
    Repair,
    /// Holds goods written off as not repairable.
    Discard,
}

impl BranchKind {
    /// True for branches whose stock may be sold.
    pub fn is_sale_ready(&self) -> bool {
        matches!(self, BranchKind::Store | BranchKind::Warehouse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    /// Short code printed on receipt numbers (e.g. "DT").
    pub code: String,
    pub name: String,
    pub kind: BranchKind,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product. Variants (size, colour) are free-form ids on the ledger
/// key; they carry no catalog row of their own.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Used by coupon category filters.
    pub category_id: Option<String>,
    /// List price in cents.
    pub price_cents: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_ready_branches() {
        assert!(BranchKind::Store.is_sale_ready());
        assert!(BranchKind::Warehouse.is_sale_ready());
        assert!(!BranchKind::Repair.is_sale_ready());
        assert!(!BranchKind::Discard.is_sale_ready());
    }

    #[test]
    fn test_branch_kind_serializes_snake_case() {
        let json = serde_json::to_string(&BranchKind::Discard).unwrap();
        assert_eq!(json, "\"discard\"");
    }
}
