//! # meridian-db: Database Layer for the Meridian Back Office
//!
//! SQLite storage for the inventory ledger and the workflows that move stock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Meridian Back Office Data Flow                      │
//! │                                                                         │
//! │  meridian-ops service (sell, approve_transfer, decide_damaged, ...)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   meridian-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌──────────────┐     │   │
//! │  │   │   Database    │   │  UnitOfWork   │   │  Migrations  │     │   │
//! │  │   │   (pool.rs)   │──►│  write gate   │   │  (embedded)  │     │   │
//! │  │   │               │   │  transaction  │   │              │     │   │
//! │  │   │ SqlitePool    │   │  StockLedger  │   │ 001_initial  │     │   │
//! │  │   │ ReadSession   │   │  repositories │   │              │     │   │
//! │  │   └───────────────┘   └───────────────┘   └──────────────┘     │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL, foreign keys, CHECK constraints, append-only triggers)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, [`UnitOfWork`], [`ReadSession`]
//! - [`ledger`] - [`StockLedger`], the only writer of stock rows and movements
//! - [`repository`] - Per-aggregate repositories behind [`Repositories`]
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig, Repositories};
//!
//! let db = Database::new(DbConfig::new("backoffice.db")).await?;
//!
//! let mut uow = db.begin().await?;
//! uow.ledger().adjust(&key, 12, &cause).await?;
//! uow.commit().await?;
//!
//! let mut session = db.session().await?;
//! let rows = session.stock().list_for_branch("b-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::StockLedger;
pub use pool::{Database, DbConfig, ReadSession, UnitOfWork};
pub use repository::{generate_id, DamagedItemFilter, MovementFilter, Repositories};
