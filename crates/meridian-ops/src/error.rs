//! # Operations Error Type
//!
//! What callers of the back office see when an operation fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Meridian                               │
//! │                                                                         │
//! │  Request layer                 meridian-ops                             │
//! │  ─────────────                 ────────────                             │
//! │                                                                         │
//! │  sales.sell(actor, request)                                             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  UnitOfWork                                                      │  │
//! │  │         │                                                        │  │
//! │  │  Ledger shortage? ── DbError::Core(InsufficientStock) ──┐       │  │
//! │  │         │                                                │       │  │
//! │  │  Discount too high? ── CoreError::DiscountNotAuthorized ─┤       │  │
//! │  │         │                                                ▼       │  │
//! │  │  SQLite failure? ── DbError::QueryFailed ──────────► OpsError    │  │
//! │  │         │                                                │       │  │
//! │  │  (uow dropped: every write rolled back)                  │       │  │
//! │  └──────────────────────────────────────────────────────────┼───────┘  │
//! │                                                             ▼          │
//! │  { "code": "DISCOUNT_NOT_AUTHORIZED",                                   │
//! │    "message": "Discount of 15% on line 0 exceeds the maximum ..." }    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Domain failures raised inside the database layer (a ledger shortage, a
//! missing row) are lifted back into [`OpsError::Domain`], so callers match
//! on one taxonomy no matter which layer noticed the problem.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use meridian_core::{CoreError, ValidationError};
use meridian_db::DbError;

// =============================================================================
// Error Code
// =============================================================================

/// Machine-readable failure category for the request layer.
///
/// ## Usage in the Request Layer
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK':
///     showShortage(e.message);
///     break;
///   case 'DISCOUNT_NOT_AUTHORIZED':
///     askForManager();
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or out-of-range input (400)
    ValidationError,
    InsufficientStock,
    InsufficientCashReceived,
    DiscountNotAuthorized,
    InvalidCoupon,
    CouponExpired,
    CouponLimitReached,
    CouponMinimumNotMet,
    CouponNotApplicable,
    RegisterAlreadyOpen,
    RegisterAlreadyClosed,
    InvalidStateTransition,
    /// Repair or discard branch absent
    MissingConfiguration,
    /// Actor may not touch someone else's record (403)
    NotPermitted,
    /// Referenced entity does not exist (404)
    NotFound,
    /// Unique key already taken (409)
    Conflict,
    /// Storage failure (500)
    DatabaseError,
    /// Unreadable or invalid backoffice.toml
    ConfigError,
    Internal,
}

// =============================================================================
// Ops Error
// =============================================================================

#[derive(Debug, Error)]
pub enum OpsError {
    /// A business rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The store failed underneath an otherwise valid operation.
    #[error(transparent)]
    Database(DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        OpsError::Config(message.into())
    }

    /// The code the request layer switches on.
    pub fn code(&self) -> ErrorCode {
        match self {
            OpsError::Domain(core) => match core {
                CoreError::Validation(_) => ErrorCode::ValidationError,
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::InsufficientCashReceived { .. } => ErrorCode::InsufficientCashReceived,
                CoreError::DiscountNotAuthorized { .. } => ErrorCode::DiscountNotAuthorized,
                CoreError::InvalidCoupon { .. } => ErrorCode::InvalidCoupon,
                CoreError::CouponExpired { .. } => ErrorCode::CouponExpired,
                CoreError::CouponLimitReached { .. } => ErrorCode::CouponLimitReached,
                CoreError::CouponMinimumNotMet { .. } => ErrorCode::CouponMinimumNotMet,
                CoreError::CouponNotApplicable { .. } => ErrorCode::CouponNotApplicable,
                CoreError::RegisterAlreadyOpen { .. } => ErrorCode::RegisterAlreadyOpen,
                CoreError::RegisterAlreadyClosed { .. } => ErrorCode::RegisterAlreadyClosed,
                CoreError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
                CoreError::MissingRepairBranch | CoreError::MissingDiscardBranch => {
                    ErrorCode::MissingConfiguration
                }
                CoreError::ActionNotPermitted { .. } => ErrorCode::NotPermitted,
                CoreError::NotFound { .. } => ErrorCode::NotFound,
            },
            OpsError::Database(db) => match db {
                DbError::UniqueViolation { .. } => ErrorCode::Conflict,
                DbError::ForeignKeyViolation { .. } => ErrorCode::ValidationError,
                _ => ErrorCode::DatabaseError,
            },
            OpsError::Config(_) => ErrorCode::ConfigError,
            OpsError::Io(_) => ErrorCode::Internal,
        }
    }

    /// Serializable form for the request layer.
    ///
    /// Storage failures are logged in full and reported with a generic
    /// message; everything else carries its own explanation.
    pub fn payload(&self) -> ErrorPayload {
        let code = self.code();
        let message = match (self, code) {
            (OpsError::Database(db), ErrorCode::DatabaseError) => {
                error!(error = %db, "Database operation failed");
                "Database operation failed".to_string()
            }
            (OpsError::Database(DbError::ForeignKeyViolation { message }), _) => {
                error!(%message, "Foreign key violation");
                "Invalid reference".to_string()
            }
            (OpsError::Io(e), _) => {
                error!(error = %e, "I/O failure");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };
        ErrorPayload { code, message }
    }
}

/// What the request layer receives when an operation fails.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for product ..." }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// Lifts domain failures out of the database layer.
impl From<DbError> for OpsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(core) => OpsError::Domain(core),
            DbError::NotFound { entity, id } => OpsError::Domain(CoreError::NotFound { entity, id }),
            other => OpsError::Database(other),
        }
    }
}

impl From<ValidationError> for OpsError {
    fn from(err: ValidationError) -> Self {
        OpsError::Domain(CoreError::Validation(err))
    }
}

impl From<toml::de::Error> for OpsError {
    fn from(err: toml::de::Error) -> Self {
        OpsError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for OpsError {
    fn from(err: toml::ser::Error) -> Self {
        OpsError::Config(err.to_string())
    }
}

/// Result type for back-office operations.
pub type OpsResult<T> = Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::Rate;

    #[test]
    fn test_ledger_shortage_surfaces_as_domain_error() {
        let db_err = DbError::Core(CoreError::InsufficientStock {
            product_id: "p-1".into(),
            variant_id: None,
            branch_id: "b-1".into(),
            available: 2,
            requested: 3,
        });
        let err = OpsError::from(db_err);
        assert!(matches!(err, OpsError::Domain(CoreError::InsufficientStock { .. })));
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let err = OpsError::from(DbError::not_found("sale", "s-9"));
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.to_string(), "sale not found: s-9");
    }

    #[test]
    fn test_missing_branches_share_one_code() {
        assert_eq!(
            OpsError::from(CoreError::MissingRepairBranch).code(),
            ErrorCode::MissingConfiguration
        );
        assert_eq!(
            OpsError::from(CoreError::MissingDiscardBranch).code(),
            ErrorCode::MissingConfiguration
        );
    }

    #[test]
    fn test_payload_serializes_screaming_snake_case() {
        let err = OpsError::from(CoreError::DiscountNotAuthorized {
            line: 0,
            role: "cashier".into(),
            requested: Rate::from_percent(15),
            max_allowed: Rate::from_percent(10),
        });
        let json = serde_json::to_value(err.payload()).unwrap();
        assert_eq!(json["code"], "DISCOUNT_NOT_AUTHORIZED");
        assert!(json["message"].as_str().unwrap().contains("maximum allowed 10%"));
    }

    #[test]
    fn test_storage_failures_hide_details() {
        let err = OpsError::from(DbError::QueryFailed("near \"SELEC\": syntax error".into()));
        let payload = err.payload();
        assert_eq!(payload.code, ErrorCode::DatabaseError);
        assert_eq!(payload.message, "Database operation failed");

        let dup = OpsError::from(DbError::duplicate("branches.code", "DT"));
        assert_eq!(dup.code(), ErrorCode::Conflict);
    }
}
