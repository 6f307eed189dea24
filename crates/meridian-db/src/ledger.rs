//! # Stock Ledger
//!
//! The single write path for stock quantities.
//!
//! ## Mutation Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  uow.ledger().adjust(key, −3, cause)                                    │
//! │       │                                                                 │
//! │       ├─ 1. load row (or implicit zero)                                 │
//! │       ├─ 2. StockRecord::apply_delta ── fails? nothing written          │
//! │       ├─ 3. upsert row                                                  │
//! │       └─ 4. append exactly one MovementRecord                           │
//! │                                                                         │
//! │  uow.ledger().move_stock(from, to_branch, 5, cause)                     │
//! │       │                                                                 │
//! │       ├─ 1. load both rows, lower branch id first                       │
//! │       ├─ 2. check/apply both in memory ── fails? nothing written        │
//! │       ├─ 3. upsert both rows                                            │
//! │       └─ 4. append ONE movement with from_branch_id and to_branch_id    │
//! │                                                                         │
//! │  reserve / release / set_reorder_point change the row only.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All of it runs inside the caller's [`crate::UnitOfWork`]: if any later
//! step of the workflow fails, the rows and movements vanish with the
//! rollback.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{generate_id, MovementRepository, StockRepository};
use meridian_core::validation::{validate_distinct, validate_quantity};
use meridian_core::{MovementCause, MovementRecord, StockKey, StockRecord};

/// Ledger operations bound to one unit of work.
#[derive(Debug)]
pub struct StockLedger<'c> {
    conn: &'c mut SqliteConnection,
    now: DateTime<Utc>,
}

impl<'c> StockLedger<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection, now: DateTime<Utc>) -> Self {
        StockLedger { conn, now }
    }

    /// The row for `key`, or an unsaved zero row when none exists.
    pub async fn record(&mut self, key: &StockKey) -> DbResult<StockRecord> {
        let existing = StockRepository::new(&mut *self.conn).find(key).await?;
        Ok(existing.unwrap_or_else(|| StockRecord::empty(generate_id(), key, self.now)))
    }

    /// Changes on-hand quantity at one row by a signed `delta`.
    ///
    /// Negative deltas fail with `InsufficientStock` when they exceed the
    /// available (not on-hand) quantity.
    pub async fn adjust(
        &mut self,
        key: &StockKey,
        delta: i64,
        cause: &MovementCause,
    ) -> DbResult<StockRecord> {
        validate_quantity("quantity", delta.saturating_abs())?;

        let mut record = self.record(key).await?;
        record.apply_delta(delta, self.now)?;

        StockRepository::new(&mut *self.conn).upsert(&record).await?;
        let movement = MovementRecord::for_delta(generate_id(), key, delta, cause, self.now);
        MovementRepository::new(&mut *self.conn)
            .insert(&movement)
            .await?;

        debug!(
            key = %key,
            delta,
            movement_type = ?cause.movement_type,
            quantity = record.quantity(),
            available = record.available_quantity(),
            "Stock adjusted"
        );
        Ok(record)
    }

    /// Moves `quantity` units of the same product/variant from `from` to
    /// `to_branch_id`, writing one two-branch movement.
    ///
    /// Returns `(source, destination)` after the move.
    pub async fn move_stock(
        &mut self,
        from: &StockKey,
        to_branch_id: &str,
        quantity: i64,
        cause: &MovementCause,
    ) -> DbResult<(StockRecord, StockRecord)> {
        validate_distinct("from_branch_id", &from.branch_id, "to_branch_id", to_branch_id)?;
        validate_quantity("quantity", quantity)?;

        let to = from.at_branch(to_branch_id);
        let (mut source, mut destination) = if from.branch_id < to.branch_id {
            let source = self.record(from).await?;
            (source, self.record(&to).await?)
        } else {
            let destination = self.record(&to).await?;
            (self.record(from).await?, destination)
        };

        source.apply_delta(-quantity, self.now)?;
        destination.apply_delta(quantity, self.now)?;

        let mut stock = StockRepository::new(&mut *self.conn);
        stock.upsert(&source).await?;
        stock.upsert(&destination).await?;

        let movement =
            MovementRecord::for_move(generate_id(), from, to_branch_id, quantity, cause, self.now);
        MovementRepository::new(&mut *self.conn)
            .insert(&movement)
            .await?;

        debug!(
            from = %from,
            to = %to,
            quantity,
            movement_type = ?cause.movement_type,
            "Stock moved"
        );
        Ok((source, destination))
    }

    /// Earmarks `quantity` available units. Writes no movement.
    pub async fn reserve(&mut self, key: &StockKey, quantity: i64) -> DbResult<StockRecord> {
        validate_quantity("quantity", quantity)?;

        let mut record = self.record(key).await?;
        record.reserve(quantity, self.now)?;
        StockRepository::new(&mut *self.conn).upsert(&record).await?;

        debug!(key = %key, quantity, reserved = record.reserved_quantity(), "Stock reserved");
        Ok(record)
    }

    /// Returns `quantity` reserved units to available. Writes no movement.
    pub async fn release(&mut self, key: &StockKey, quantity: i64) -> DbResult<StockRecord> {
        validate_quantity("quantity", quantity)?;

        let mut record = self.record(key).await?;
        record.release(quantity, self.now)?;
        StockRepository::new(&mut *self.conn).upsert(&record).await?;

        debug!(key = %key, quantity, reserved = record.reserved_quantity(), "Reservation released");
        Ok(record)
    }

    pub async fn set_reorder_point(&mut self, key: &StockKey, point: i64) -> DbResult<StockRecord> {
        let mut record = self.record(key).await?;
        record.set_reorder_point(point, self.now)?;
        StockRepository::new(&mut *self.conn).upsert(&record).await?;
        Ok(record)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
