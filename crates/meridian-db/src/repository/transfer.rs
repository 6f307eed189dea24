//! # Transfer Repository
//!
//! Transfer headers and their lines. Status changes are written as whole-row
//! updates after the state machine in `meridian_core::transfer` has decided
//! them.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{Transfer, TransferItem, TransferStatus, TransferWithItems};

const TRANSFER_COLUMNS: &str = "id, from_branch_id, to_branch_id, mode, status, requested_by, \
     approved_by, completed_by, closed_by, notes, close_reason, \
     created_at, approved_at, completed_at, closed_at";

const ITEM_COLUMNS: &str =
    "id, transfer_id, product_id, variant_id, requested_qty, approved_qty, received_qty";

#[derive(Debug)]
pub struct TransferRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TransferRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        TransferRepository { conn }
    }

    /// Inserts a transfer and all of its lines.
    pub async fn insert(&mut self, transfer: &Transfer, items: &[TransferItem]) -> DbResult<()> {
        debug!(
            id = %transfer.id,
            from = %transfer.from_branch_id,
            to = %transfer.to_branch_id,
            lines = items.len(),
            "Inserting transfer"
        );

        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, from_branch_id, to_branch_id, mode, status, requested_by,
                approved_by, completed_by, closed_by, notes, close_reason,
                created_at, approved_at, completed_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&transfer.id)
        .bind(&transfer.from_branch_id)
        .bind(&transfer.to_branch_id)
        .bind(transfer.mode)
        .bind(transfer.status)
        .bind(&transfer.requested_by)
        .bind(&transfer.approved_by)
        .bind(&transfer.completed_by)
        .bind(&transfer.closed_by)
        .bind(&transfer.notes)
        .bind(&transfer.close_reason)
        .bind(transfer.created_at)
        .bind(transfer.approved_at)
        .bind(transfer.completed_at)
        .bind(transfer.closed_at)
        .execute(&mut *self.conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO transfer_items (
                    id, transfer_id, product_id, variant_id,
                    requested_qty, approved_qty, received_qty
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.transfer_id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.requested_qty)
            .bind(item.approved_qty)
            .bind(item.received_qty)
            .execute(&mut *self.conn)
            .await?;
        }

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<Transfer>> {
        let sql = format!("SELECT {} FROM transfers WHERE id = ?1", TRANSFER_COLUMNS);
        let transfer = sqlx::query_as::<_, Transfer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(transfer)
    }

    pub async fn items(&mut self, transfer_id: &str) -> DbResult<Vec<TransferItem>> {
        let sql = format!(
            "SELECT {} FROM transfer_items WHERE transfer_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, TransferItem>(&sql)
            .bind(transfer_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// The transfer with its lines, or `NotFound`.
    pub async fn get_with_items(&mut self, id: &str) -> DbResult<TransferWithItems> {
        let transfer = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("transfer", id))?;
        let items = self.items(id).await?;
        Ok(TransferWithItems { transfer, items })
    }

    /// Transfers touching `branch_id` (either side), newest first.
    pub async fn list(
        &mut self,
        branch_id: Option<&str>,
        status: Option<TransferStatus>,
        limit: u32,
    ) -> DbResult<Vec<Transfer>> {
        let sql = format!(
            r#"
            SELECT {} FROM transfers
            WHERE (?1 IS NULL OR from_branch_id = ?1 OR to_branch_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
            TRANSFER_COLUMNS
        );
        let transfers = sqlx::query_as::<_, Transfer>(&sql)
            .bind(branch_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(transfers)
    }

    /// Writes status and audit columns.
    pub async fn update(&mut self, transfer: &Transfer) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET
                status = ?2,
                approved_by = ?3,
                completed_by = ?4,
                closed_by = ?5,
                close_reason = ?6,
                approved_at = ?7,
                completed_at = ?8,
                closed_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&transfer.id)
        .bind(transfer.status)
        .bind(&transfer.approved_by)
        .bind(&transfer.completed_by)
        .bind(&transfer.closed_by)
        .bind(&transfer.close_reason)
        .bind(transfer.approved_at)
        .bind(transfer.completed_at)
        .bind(transfer.closed_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("transfer", &transfer.id));
        }
        Ok(())
    }

    /// Writes the approved and received quantities of one line.
    pub async fn update_item(&mut self, item: &TransferItem) -> DbResult<()> {
        sqlx::query("UPDATE transfer_items SET approved_qty = ?2, received_qty = ?3 WHERE id = ?1")
            .bind(&item.id)
            .bind(item.approved_qty)
            .bind(item.received_qty)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
