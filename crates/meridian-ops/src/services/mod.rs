//! # Workflow Services
//!
//! One service per workflow. Each write operation opens exactly one
//! [`UnitOfWork`](meridian_db::UnitOfWork), performs every read it depends on
//! inside it, and commits once at the end.
//!
//! ## Operation Shape
//! ```text
//! validate input (no I/O)
//!      │
//!      ▼
//! db.begin() ──► load rows ──► core decides ──► repos + ledger write
//!      │                                              │
//!      │ any `?` drops the uow: ROLLBACK              ▼
//!      └──────────────────────────────────────── uow.commit()
//! ```
//!
//! Read operations borrow a [`ReadSession`](meridian_db::ReadSession) and
//! release it before returning.

use serde::{Deserialize, Serialize};

use meridian_core::validation::{validate_line_count, validate_quantity};
use meridian_core::{Branch, CoreError, Product, StockKey, ValidationError};
use meridian_db::Repositories;

use crate::error::OpsResult;

pub mod catalog;
pub mod damaged;
pub mod inventory;
pub mod register;
pub mod report;
pub mod returns;
pub mod sales;
pub mod transfers;

pub use catalog::{CatalogService, NewBranch, NewCoupon, NewProduct};
pub use damaged::{DamageReport, DamagedItemService};
pub use inventory::{InventoryService, PurchaseReceipt, StockAdjustment};
pub use register::{CashEntry, CashFlow, CloseRegister, OpenRegister, RegisterService};
pub use report::ReportService;
pub use returns::{ReturnRequest, ReturnService};
pub use sales::{SaleLine, SaleRequest, SalesService};
pub use transfers::{TransferRequest, TransferService};

/// A product/variant quantity without a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

impl StockLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        StockLine {
            product_id: product_id.into(),
            variant_id: None,
            quantity,
        }
    }

    pub fn key(&self, branch_id: &str) -> StockKey {
        StockKey::new(&self.product_id, self.variant_id.clone(), branch_id)
    }
}

/// Checks count, quantities, and that no product/variant appears twice.
pub(crate) fn validate_stock_lines(field: &str, lines: &[StockLine]) -> OpsResult<()> {
    validate_line_count(field, lines.len())?;
    for (i, line) in lines.iter().enumerate() {
        validate_quantity("quantity", line.quantity)?;
        let repeated = lines[..i]
            .iter()
            .any(|l| l.product_id == line.product_id && l.variant_id == line.variant_id);
        if repeated {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: line.product_id.clone(),
            }
            .into());
        }
    }
    Ok(())
}

pub(crate) async fn require_branch<R: Repositories>(repos: &mut R, id: &str) -> OpsResult<Branch> {
    Ok(repos
        .branches()
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("branch", id))?)
}

pub(crate) async fn require_product<R: Repositories>(repos: &mut R, id: &str) -> OpsResult<Product> {
    Ok(repos
        .products()
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("product", id))?)
}
