//! # meridian-ops: Back Office Workflows
//!
//! Runs the inventory-affecting workflows of a multi-branch retailer against
//! the stock ledger in `meridian-db`, deciding with the pure rules in
//! `meridian-core`.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          BackOffice (facade)                            │
//! │                                                                         │
//! │  catalog()   inventory()   transfers()   damaged_items()                │
//! │  sales()     returns()     registers()   reports()                      │
//! │       │            │             │              │                       │
//! │       └────────────┴──────┬──────┴──────────────┘                       │
//! │                           ▼                                             │
//! │                 meridian_db::Database                                   │
//! │          begin() ──► UnitOfWork (write gate + transaction)              │
//! │                          │                                              │
//! │                          ▼                                              │
//! │     StockLedger ── every quantity change + one MovementRecord           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - `backoffice.toml` plus `MERIDIAN_*` overrides
//! - [`error`] - [`OpsError`] and the machine-readable [`ErrorCode`]
//! - [`services`] - one service per workflow
//! - [`telemetry`] - tracing subscriber setup for binaries
//!
//! ## Usage
//! ```rust,ignore
//! let office = BackOffice::open(BackOfficeConfig::load(None)?).await?;
//! let receipt = office.sales().sell(&actor, request).await?;
//! ```

use std::sync::Arc;

use tracing::info;

use meridian_core::DiscountPolicy;
use meridian_db::{Database, DbConfig};

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod services;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::BackOfficeConfig;
pub use error::{ErrorCode, ErrorPayload, OpsError, OpsResult};
pub use services::{
    CatalogService, DamagedItemService, InventoryService, RegisterService, ReportService,
    ReturnService, SalesService, TransferService,
};

// =============================================================================
// Facade
// =============================================================================

/// Entry point: one database handle plus the settings every service needs.
///
/// Cheap to clone. Services are constructed on demand and hold clones of the
/// same [`Database`], so they share its write gate.
#[derive(Debug, Clone)]
pub struct BackOffice {
    db: Database,
    config: BackOfficeConfig,
    policy: Arc<DiscountPolicy>,
}

impl BackOffice {
    /// Opens (and migrates) the database named by `config`.
    pub async fn open(config: BackOfficeConfig) -> OpsResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database.path.display(), "Back office opened");
        Ok(Self::with_database(db, config))
    }

    /// A private in-memory office, mainly for tests and demos.
    pub async fn in_memory(config: BackOfficeConfig) -> OpsResult<Self> {
        config.validate()?;
        let db = Database::new(DbConfig::in_memory()).await?;
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: BackOfficeConfig) -> Self {
        let policy = Arc::new(config.discounts.policy());
        BackOffice { db, config, policy }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &BackOfficeConfig {
        &self.config
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone())
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.db.clone())
    }

    pub fn transfers(&self) -> TransferService {
        TransferService::new(self.db.clone(), self.config.transfers.clone())
    }

    pub fn damaged_items(&self) -> DamagedItemService {
        DamagedItemService::new(self.db.clone())
    }

    pub fn sales(&self) -> SalesService {
        SalesService::new(
            self.db.clone(),
            Arc::clone(&self.policy),
            self.config.sales.employee_rate(),
        )
    }

    pub fn returns(&self) -> ReturnService {
        ReturnService::new(self.db.clone(), self.config.returns.require_approval)
    }

    pub fn registers(&self) -> RegisterService {
        RegisterService::new(self.db.clone())
    }

    pub fn reports(&self) -> ReportService {
        ReportService::new(self.db.clone())
    }

    /// Closes the pool. Outstanding services keep a handle but will fail.
    pub async fn close(&self) {
        self.db.close().await;
    }
}
