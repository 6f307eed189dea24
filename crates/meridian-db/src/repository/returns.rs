//! # Return Repository
//!
//! Sale returns and their lines.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{ReturnItem, ReturnWithItems, SaleReturn};

const RETURN_COLUMNS: &str = "id, sale_id, branch_id, register_session_id, refund_method, \
     return_amount_cents, cash_refund, status, reason, requested_by, decided_by, \
     created_at, decided_at";

const ITEM_COLUMNS: &str =
    "id, return_id, sale_item_id, product_id, variant_id, quantity, refund_cents";

#[derive(Debug)]
pub struct ReturnRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ReturnRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        ReturnRepository { conn }
    }

    /// Inserts a return and all of its lines.
    pub async fn insert(&mut self, sale_return: &SaleReturn, items: &[ReturnItem]) -> DbResult<()> {
        debug!(
            id = %sale_return.id,
            sale_id = %sale_return.sale_id,
            amount_cents = sale_return.return_amount_cents,
            "Inserting return"
        );

        sqlx::query(
            r#"
            INSERT INTO sale_returns (
                id, sale_id, branch_id, register_session_id, refund_method,
                return_amount_cents, cash_refund, status, reason,
                requested_by, decided_by, created_at, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&sale_return.id)
        .bind(&sale_return.sale_id)
        .bind(&sale_return.branch_id)
        .bind(&sale_return.register_session_id)
        .bind(sale_return.refund_method)
        .bind(sale_return.return_amount_cents)
        .bind(sale_return.cash_refund)
        .bind(sale_return.status)
        .bind(&sale_return.reason)
        .bind(&sale_return.requested_by)
        .bind(&sale_return.decided_by)
        .bind(sale_return.created_at)
        .bind(sale_return.decided_at)
        .execute(&mut *self.conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO return_items (
                    id, return_id, sale_item_id, product_id, variant_id, quantity, refund_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.return_id)
            .bind(&item.sale_item_id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .bind(item.refund_cents)
            .execute(&mut *self.conn)
            .await?;
        }

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<SaleReturn>> {
        let sql = format!("SELECT {} FROM sale_returns WHERE id = ?1", RETURN_COLUMNS);
        let sale_return = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(sale_return)
    }

    pub async fn items(&mut self, return_id: &str) -> DbResult<Vec<ReturnItem>> {
        let sql = format!(
            "SELECT {} FROM return_items WHERE return_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, ReturnItem>(&sql)
            .bind(return_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// The return with its lines, or `NotFound`.
    pub async fn get_with_items(&mut self, id: &str) -> DbResult<ReturnWithItems> {
        let sale_return = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("return", id))?;
        let items = self.items(id).await?;
        Ok(ReturnWithItems { sale_return, items })
    }

    pub async fn list_for_sale(&mut self, sale_id: &str) -> DbResult<Vec<SaleReturn>> {
        let sql = format!(
            "SELECT {} FROM sale_returns WHERE sale_id = ?1 ORDER BY created_at, rowid",
            RETURN_COLUMNS
        );
        let returns = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(returns)
    }

    /// Returns whose refund is booked on `session_id`. With the open-session
    /// fallback this can differ from the sale's own session.
    pub async fn list_for_session(&mut self, session_id: &str) -> DbResult<Vec<SaleReturn>> {
        let sql = format!(
            "SELECT {} FROM sale_returns WHERE register_session_id = ?1 ORDER BY created_at, rowid",
            RETURN_COLUMNS
        );
        let returns = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(returns)
    }

    /// Sum of a sale's returns still awaiting a decision.
    pub async fn pending_amount_for_sale(&mut self, sale_id: &str) -> DbResult<i64> {
        let pending: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(return_amount_cents), 0) FROM sale_returns
            WHERE sale_id = ?1 AND status = 'pending'
            "#,
        )
        .bind(sale_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(pending)
    }

    /// Writes the decision columns.
    pub async fn update_decision(&mut self, sale_return: &SaleReturn) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sale_returns SET
                status = ?2,
                register_session_id = ?3,
                decided_by = ?4,
                decided_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&sale_return.id)
        .bind(sale_return.status)
        .bind(&sale_return.register_session_id)
        .bind(&sale_return.decided_by)
        .bind(sale_return.decided_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("return", &sale_return.id));
        }
        Ok(())
    }
}
