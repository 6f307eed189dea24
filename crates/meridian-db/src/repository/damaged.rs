//! # Damaged Item Repository

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{DamageStatus, DamagedItem};

const DAMAGED_COLUMNS: &str = "id, product_id, variant_id, branch_id, repair_branch_id, \
     discard_branch_id, quantity, damage_type, description, status, repair_decision, \
     expense_cents, reported_by, decided_by, created_at, decided_at";

/// Listing filter for damaged items.
#[derive(Debug, Clone, Default)]
pub struct DamagedItemFilter {
    /// Origin branch.
    pub branch_id: Option<String>,
    pub status: Option<DamageStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug)]
pub struct DamagedItemRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> DamagedItemRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        DamagedItemRepository { conn }
    }

    pub async fn insert(&mut self, item: &DamagedItem) -> DbResult<()> {
        debug!(id = %item.id, branch = %item.branch_id, quantity = item.quantity, "Inserting damaged item");

        sqlx::query(
            r#"
            INSERT INTO damaged_items (
                id, product_id, variant_id, branch_id, repair_branch_id, discard_branch_id,
                quantity, damage_type, description, status, repair_decision,
                expense_cents, reported_by, decided_by, created_at, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&item.id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.branch_id)
        .bind(&item.repair_branch_id)
        .bind(&item.discard_branch_id)
        .bind(item.quantity)
        .bind(item.damage_type)
        .bind(&item.description)
        .bind(item.status)
        .bind(item.repair_decision)
        .bind(item.expense_cents)
        .bind(&item.reported_by)
        .bind(&item.decided_by)
        .bind(item.created_at)
        .bind(item.decided_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<DamagedItem>> {
        let sql = format!("SELECT {} FROM damaged_items WHERE id = ?1", DAMAGED_COLUMNS);
        let item = sqlx::query_as::<_, DamagedItem>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(item)
    }

    pub async fn list(&mut self, filter: &DamagedItemFilter) -> DbResult<Vec<DamagedItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM damaged_items
            WHERE (?1 IS NULL OR branch_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
            DAMAGED_COLUMNS
        );
        let items = sqlx::query_as::<_, DamagedItem>(&sql)
            .bind(&filter.branch_id)
            .bind(filter.status)
            .bind(filter.limit.unwrap_or(100))
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// Writes disposition columns after a state change.
    pub async fn update(&mut self, item: &DamagedItem) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE damaged_items SET
                repair_branch_id = ?2,
                discard_branch_id = ?3,
                status = ?4,
                repair_decision = ?5,
                expense_cents = ?6,
                decided_by = ?7,
                decided_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&item.id)
        .bind(&item.repair_branch_id)
        .bind(&item.discard_branch_id)
        .bind(item.status)
        .bind(item.repair_decision)
        .bind(item.expense_cents)
        .bind(&item.decided_by)
        .bind(item.decided_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("damaged item", &item.id));
        }
        Ok(())
    }
}
