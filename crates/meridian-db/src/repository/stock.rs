//! # Stock Repository
//!
//! Rows of the ledger. Reads are public; the upsert is crate-private so the
//! only writer is [`crate::StockLedger`].

use sqlx::SqliteConnection;

use crate::error::DbResult;
use meridian_core::{StockKey, StockRecord};

const STOCK_COLUMNS: &str = "id, product_id, variant_id, branch_id, quantity, \
     reserved_quantity, available_quantity, reorder_point, updated_at";

/// Repository for stock record reads (and ledger-internal writes).
#[derive(Debug)]
pub struct StockRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> StockRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        StockRepository { conn }
    }

    /// The row for `key`, if one has ever been written.
    pub async fn find(&mut self, key: &StockKey) -> DbResult<Option<StockRecord>> {
        // `IS` matches NULL variant ids as well as values.
        let sql = format!(
            r#"
            SELECT {} FROM stock_records
            WHERE product_id = ?1 AND variant_id IS ?2 AND branch_id = ?3
            "#,
            STOCK_COLUMNS
        );
        let record = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(&key.product_id)
            .bind(&key.variant_id)
            .bind(&key.branch_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(record)
    }

    /// Every row at a branch, ordered by product then variant.
    pub async fn list_for_branch(&mut self, branch_id: &str) -> DbResult<Vec<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records WHERE branch_id = ?1 ORDER BY product_id, variant_id",
            STOCK_COLUMNS
        );
        let records = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(branch_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(records)
    }

    /// Every row for a product across branches.
    pub async fn list_for_product(&mut self, product_id: &str) -> DbResult<Vec<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records WHERE product_id = ?1 ORDER BY branch_id, variant_id",
            STOCK_COLUMNS
        );
        let records = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(product_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(records)
    }

    /// Rows at or below their (non-zero) reorder point.
    pub async fn below_reorder_point(
        &mut self,
        branch_id: Option<&str>,
    ) -> DbResult<Vec<StockRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM stock_records
            WHERE reorder_point > 0
              AND available_quantity <= reorder_point
              AND (?1 IS NULL OR branch_id = ?1)
            ORDER BY branch_id, product_id
            "#,
            STOCK_COLUMNS
        );
        let records = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(branch_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(records)
    }

    /// Inserts or replaces the row with `record.id()`.
    pub(crate) async fn upsert(&mut self, record: &StockRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_records (
                id, product_id, variant_id, branch_id,
                quantity, reserved_quantity, available_quantity, reorder_point, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                quantity = excluded.quantity,
                reserved_quantity = excluded.reserved_quantity,
                available_quantity = excluded.available_quantity,
                reorder_point = excluded.reorder_point,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id())
        .bind(record.product_id())
        .bind(record.variant_id())
        .bind(record.branch_id())
        .bind(record.quantity())
        .bind(record.reserved_quantity())
        .bind(record.available_quantity())
        .bind(record.reorder_point())
        .bind(record.updated_at())
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}
