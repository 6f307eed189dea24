//! # Error Types
//!
//! Domain error taxonomy shared by every stock-affecting workflow.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core (this file)                                             │
//! │  ├── ValidationError  - malformed input, caught before side effects    │
//! │  └── CoreError        - business rule violations                       │
//! │                                                                         │
//! │  meridian-db                                                            │
//! │  └── DbError          - storage failures (+ CoreError from the ledger) │
//! │                                                                         │
//! │  meridian-ops                                                           │
//! │  └── OpsError         - what callers see, with a machine ErrorCode     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → OpsError                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the data a caller needs to correct and resubmit:
//! the authorized ceiling, the cash still owed, the stock shortfall.

use thiserror::Error;

use crate::money::{Money, Rate};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the ledger and the workflows.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or out-of-range input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An outbound movement or reservation would drive available stock below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line: 3 × SHIRT-M at Downtown
    ///      │
    ///      ▼
    /// Ledger row (SHIRT, M, Downtown): available = 2
    ///      │
    ///      ▼
    /// InsufficientStock { available: 2, requested: 3 } → whole sale rolled back
    /// ```
    #[error(
        "Insufficient stock for product {product_id} (variant {variant}) at branch {branch_id}: available {available}, requested {requested}",
        variant = .variant_id.as_deref().unwrap_or("-")
    )]
    InsufficientStock {
        product_id: String,
        variant_id: Option<String>,
        branch_id: String,
        available: i64,
        requested: i64,
    },

    /// Cash tendered does not cover the sale total.
    #[error("Insufficient cash received: required {required}, received {received}")]
    InsufficientCashReceived { required: Money, received: Money },

    /// A line discount exceeds the caller's role ceiling.
    #[error("Discount of {requested} on line {line} exceeds the maximum allowed {max_allowed} for role '{role}'")]
    DiscountNotAuthorized {
        line: usize,
        role: String,
        requested: Rate,
        max_allowed: Rate,
    },

    /// Unknown, inactive or not-yet-valid coupon.
    #[error("Invalid coupon '{code}': {reason}")]
    InvalidCoupon { code: String, reason: String },

    #[error("Coupon '{code}' has expired")]
    CouponExpired { code: String },

    /// Global or per-user usage limit reached.
    #[error("Coupon '{code}' has reached its usage limit")]
    CouponLimitReached { code: String },

    #[error("Coupon '{code}' requires a minimum purchase of {minimum}, sale total is {total}")]
    CouponMinimumNotMet {
        code: String,
        minimum: Money,
        total: Money,
    },

    /// Branch, product or category filters exclude this sale.
    #[error("Coupon '{code}' is not applicable to this sale")]
    CouponNotApplicable { code: String },

    /// The user already has an open register session somewhere.
    #[error("User already has an open register session: {session_id}")]
    RegisterAlreadyOpen { session_id: String },

    #[error("Register session {session_id} is already closed")]
    RegisterAlreadyClosed { session_id: String },

    /// The entity's current state does not allow the requested action.
    #[error("Cannot {action} {entity} {id} while it is {current}")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        current: String,
        action: &'static str,
    },

    /// A damaged item cannot move to repair because no repair branch exists.
    #[error("No repair branch is configured")]
    MissingRepairBranch,

    /// A discard decision cannot move stock because no discard branch exists.
    #[error("No discard branch is configured")]
    MissingDiscardBranch,

    /// The actor may not perform this action on someone else's record.
    #[error("{actor_id} is not permitted to {action}")]
    ActionNotPermitted {
        actor_id: String,
        action: &'static str,
    },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidStateTransition error.
    pub fn transition(
        entity: &'static str,
        id: impl Into<String>,
        current: impl std::fmt::Debug,
        action: &'static str,
    ) -> Self {
        CoreError::InvalidStateTransition {
            entity,
            id: id.into(),
            current: format!("{:?}", current),
            action,
        }
    }

    /// True for the two missing-branch configuration errors.
    pub fn is_missing_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::MissingRepairBranch | CoreError::MissingDiscardBranch
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any side effect.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// Two fields that must differ were equal (e.g. transfer source/destination).
    #[error("{first} and {second} must differ")]
    MustDiffer { first: String, second: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            variant_id: None,
            branch_id: "b-1".to_string(),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1 (variant -) at branch b-1: available 2, requested 3"
        );
    }

    #[test]
    fn test_discount_message_carries_ceiling() {
        let err = CoreError::DiscountNotAuthorized {
            line: 0,
            role: "cashier".to_string(),
            requested: Rate::from_percent(15),
            max_allowed: Rate::from_percent(10),
        };
        assert!(err.to_string().contains("maximum allowed 10%"));
    }

    #[test]
    fn test_transition_formats_current_state() {
        #[derive(Debug)]
        enum State {
            Completed,
        }
        let err = CoreError::transition("transfer", "t-1", State::Completed, "approve");
        assert_eq!(err.to_string(), "Cannot approve transfer t-1 while it is Completed");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::Required {
            field: "lines".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(!err.is_missing_configuration());
        assert!(CoreError::MissingDiscardBranch.is_missing_configuration());
    }
}
