//! # meridian-core: Pure Domain Logic for the Meridian Back Office
//!
//! Everything the inventory ledger and the stock-affecting workflows decide,
//! expressed as plain data and pure functions. No I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian Back Office                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Request layer (external: HTTP, auth, roles)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Actor + validated input                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   meridian-ops: sales, returns, transfers, damage, registers    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ meridian-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  money  │ │  stock  │ │ pricing  │ │ transfer │ │register│ │   │
//! │  │   │  Money  │ │ Record  │ │ discount │ │  damage  │ │ report │ │   │
//! │  │   │  Rate   │ │Movement │ │  coupon  │ │ returns  │ │        │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS IN BUSINESS RULES       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   meridian-db: SQLite, UnitOfWork, StockLedger, repositories    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money and basis-point rates
//! - [`stock`] - Stock records, movement types and references
//! - [`pricing`] - Line and header totals, cash settlement
//! - [`discount`] - Role → discount ceiling policy
//! - [`coupon`] - Coupon definitions and redemption rules
//! - [`sale`], [`returns`] - Sale and return records, refund planning
//! - [`transfer`], [`damage`] - Workflow state machines
//! - [`register`], [`report`] - Register reconciliation and shift reports
//! - [`validation`], [`error`] - Input checks and the error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use meridian_core::money::{Money, Rate};
//! use meridian_core::pricing::{price_line, SaleTotals};
//!
//! let line = price_line(1, Money::from_major(20), Rate::zero(), Rate::zero());
//! let mut totals = SaleTotals::from_lines(&[line], None);
//!
//! // 50% coupon capped at 5.00
//! let coupon = totals.total.percent(Rate::from_percent(50)).min(Money::from_major(5));
//! totals.apply_coupon(coupon);
//! assert_eq!(totals.total, Money::from_major(15));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coupon;
pub mod damage;
pub mod discount;
pub mod error;
pub mod money;
pub mod pricing;
pub mod register;
pub mod report;
pub mod returns;
pub mod sale;
pub mod stock;
pub mod transfer;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use coupon::{Coupon, CouponType, CouponUsage};
pub use damage::{DamageStatus, DamageType, DamagedItem, Decision, RepairDecision};
pub use discount::{DiscountCeiling, DiscountPolicy};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use register::{
    CashMovement, CashMovementKind, Reconciliation, RegisterSession, RegisterStatus, RegisterTally,
};
pub use report::ShiftReport;
pub use returns::{RefundMethod, ReturnItem, ReturnLine, ReturnStatus, ReturnWithItems, SaleReturn};
pub use sale::{DiscountAuthorizationLog, PaymentMethod, Sale, SaleItem, SaleReceipt, SaleStatus};
pub use stock::{
    MovementCause, MovementRecord, MovementReference, MovementType, ReferenceKind, StockKey,
    StockRecord,
};
pub use transfer::{
    ItemQuantity, Transfer, TransferItem, TransferMode, TransferStatus, TransferWithItems,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single sale, transfer or return.
pub const MAX_SALE_LINES: usize = 200;

/// Maximum quantity on a single line or movement.
///
/// ## Business Reason
/// Warehouse transfers move pallets, so this is far above a till's needs, but
/// it still catches a mistyped extra digit or two.
pub const MAX_LINE_QUANTITY: i64 = 100_000;

/// Maximum single amount in cents (prices, balances, cash tendered).
///
/// At this ceiling a full sale (`MAX_SALE_LINES` lines of `MAX_LINE_QUANTITY`
/// units) still totals well inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000;
