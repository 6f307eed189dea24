//! # Repository Module
//!
//! One repository per aggregate, all borrowing the same connection.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   UnitOfWork ─┐                                                         │
//! │               ├─ impl Repositories ──► uow.sales().get(id)              │
//! │   ReadSession ┘        │                uow.transfers().items(id)       │
//! │                        │                uow.registers().open_for_user() │
//! │                        ▼                                                │
//! │               &mut SqliteConnection  (the transaction, or a pooled     │
//! │                                       connection for read sessions)    │
//! │                                                                         │
//! │   Stock rows and movements are written only by StockLedger, which is  │
//! │   reachable only from UnitOfWork::ledger(). Their repositories expose  │
//! │   reads publicly and keep writes crate-private.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BranchRepository`], [`ProductRepository`] - reference data
//! - [`StockRepository`], [`MovementRepository`] - ledger reads
//! - [`TransferRepository`], [`DamagedItemRepository`] - stock workflows
//! - [`SaleRepository`], [`CouponRepository`], [`ReturnRepository`] - sales
//! - [`RegisterRepository`] - register sessions and cash movements

use sqlx::SqliteConnection;
use uuid::Uuid;

pub mod branch;
pub mod coupon;
pub mod damaged;
pub mod movement;
pub mod product;
pub mod register;
pub mod returns;
pub mod sale;
pub mod stock;
pub mod transfer;

pub use branch::BranchRepository;
pub use coupon::CouponRepository;
pub use damaged::{DamagedItemFilter, DamagedItemRepository};
pub use movement::{MovementFilter, MovementRepository};
pub use product::ProductRepository;
pub use register::RegisterRepository;
pub use returns::ReturnRepository;
pub use sale::SaleRepository;
pub use stock::StockRepository;
pub use transfer::TransferRepository;

/// Access to every repository over one connection.
///
/// Implemented by [`crate::UnitOfWork`] and [`crate::ReadSession`].
pub trait Repositories {
    /// The connection every repository borrows.
    fn connection(&mut self) -> &mut SqliteConnection;

    fn branches(&mut self) -> BranchRepository<'_> {
        BranchRepository::new(self.connection())
    }

    fn products(&mut self) -> ProductRepository<'_> {
        ProductRepository::new(self.connection())
    }

    fn stock(&mut self) -> StockRepository<'_> {
        StockRepository::new(self.connection())
    }

    fn movements(&mut self) -> MovementRepository<'_> {
        MovementRepository::new(self.connection())
    }

    fn transfers(&mut self) -> TransferRepository<'_> {
        TransferRepository::new(self.connection())
    }

    fn damaged_items(&mut self) -> DamagedItemRepository<'_> {
        DamagedItemRepository::new(self.connection())
    }

    fn sales(&mut self) -> SaleRepository<'_> {
        SaleRepository::new(self.connection())
    }

    fn coupons(&mut self) -> CouponRepository<'_> {
        CouponRepository::new(self.connection())
    }

    fn returns(&mut self) -> ReturnRepository<'_> {
        ReturnRepository::new(self.connection())
    }

    fn registers(&mut self) -> RegisterRepository<'_> {
        RegisterRepository::new(self.connection())
    }
}

/// Generates a new row ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
