//! # Sale Repository
//!
//! Sales, their lines, and the discount authorization log.
//!
//! ## Receipt Numbers
//! ```text
//! YYYYMMDD-<branch code>-NNNN      e.g. 20261019-DT-0007
//!
//! NNNN counts the branch's sales for that UTC day, starting at 0001. It is
//! read inside the sale's unit of work, so the write gate makes it gapless
//! and unique; the UNIQUE index on receipt_number backs that up.
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{DiscountAuthorizationLog, Sale, SaleItem};

const SALE_COLUMNS: &str = "id, receipt_number, branch_id, register_session_id, cashier_id, \
     staff_id, customer_id, payment_method, status, subtotal_cents, discount_cents, tax_cents, \
     employee_discount_cents, coupon_id, coupon_discount_cents, total_cents, \
     cash_received_cents, change_cents, returned_cents, is_gift, is_employee_purchase, notes, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, sale_id, line_no, product_id, variant_id, quantity, \
     unit_price_cents, discount_bps, tax_bps, discount_cents, tax_cents, line_total_cents, \
     returned_quantity, refunded_cents";

/// Repository for sale database operations.
#[derive(Debug)]
pub struct SaleRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SaleRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        SaleRepository { conn }
    }

    /// Builds the next receipt number for `branch_code` on the day of `at`.
    pub async fn next_receipt_number(
        &mut self,
        branch_code: &str,
        at: DateTime<Utc>,
    ) -> DbResult<String> {
        let prefix = format!("{}-{}-", at.format("%Y%m%d"), branch_code);
        let issued: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE substr(receipt_number, 1, length(?1)) = ?1")
                .bind(&prefix)
                .fetch_one(&mut *self.conn)
                .await?;

        Ok(format!("{}{:04}", prefix, issued + 1))
    }

    /// Inserts a sale and all of its lines.
    pub async fn insert(&mut self, sale: &Sale, items: &[SaleItem]) -> DbResult<()> {
        debug!(
            id = %sale.id,
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_cents,
            lines = items.len(),
            "Inserting sale"
        );

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, branch_id, register_session_id, cashier_id,
                staff_id, customer_id, payment_method, status,
                subtotal_cents, discount_cents, tax_cents, employee_discount_cents,
                coupon_id, coupon_discount_cents, total_cents,
                cash_received_cents, change_cents, returned_cents,
                is_gift, is_employee_purchase, notes, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(&sale.branch_id)
        .bind(&sale.register_session_id)
        .bind(&sale.cashier_id)
        .bind(&sale.staff_id)
        .bind(&sale.customer_id)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.employee_discount_cents)
        .bind(&sale.coupon_id)
        .bind(sale.coupon_discount_cents)
        .bind(sale.total_cents)
        .bind(sale.cash_received_cents)
        .bind(sale.change_cents)
        .bind(sale.returned_cents)
        .bind(sale.is_gift)
        .bind(sale.is_employee_purchase)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *self.conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, line_no, product_id, variant_id, quantity,
                    unit_price_cents, discount_bps, tax_bps, discount_cents, tax_cents,
                    line_total_cents, returned_quantity, refunded_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(item.line_no)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.discount_bps)
            .bind(item.tax_bps)
            .bind(item.discount_cents)
            .bind(item.tax_cents)
            .bind(item.line_total_cents)
            .bind(item.returned_quantity)
            .bind(item.refunded_cents)
            .execute(&mut *self.conn)
            .await?;
        }

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(sale)
    }

    pub async fn get_by_receipt(&mut self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE receipt_number = ?1", SALE_COLUMNS);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(receipt_number)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(sale)
    }

    /// Lines of a sale in receipt order.
    pub async fn items(&mut self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!(
            "SELECT {} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// Sales rung up in a register session, oldest first.
    pub async fn list_for_session(&mut self, session_id: &str) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE register_session_id = ?1 ORDER BY created_at, rowid",
            SALE_COLUMNS
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(sales)
    }

    /// Lines of every sale rung up in a register session.
    pub async fn items_for_session(&mut self, session_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM sale_items
            WHERE sale_id IN (SELECT id FROM sales WHERE register_session_id = ?1)
            ORDER BY sale_id, line_no
            "#,
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// Writes the refunded amount and the status it implies.
    pub async fn update_refund_state(&mut self, sale: &Sale) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET returned_cents = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(&sale.id)
        .bind(sale.returned_cents)
        .bind(sale.status)
        .bind(sale.updated_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("sale", &sale.id));
        }
        Ok(())
    }

    /// Shifts a line's returned quantity and attributed refund.
    ///
    /// Positive when a return is requested, negative when it is rejected.
    pub async fn adjust_item_returns(
        &mut self,
        item_id: &str,
        quantity_delta: i64,
        refund_delta_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sale_items SET
                returned_quantity = returned_quantity + ?2,
                refunded_cents = refunded_cents + ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(quantity_delta)
        .bind(refund_delta_cents)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("sale item", item_id));
        }
        Ok(())
    }

    pub async fn insert_discount_log(&mut self, log: &DiscountAuthorizationLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discount_authorization_logs (
                id, sale_id, sale_item_id, actor_id, role,
                requested_bps, max_allowed_bps, discount_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&log.id)
        .bind(&log.sale_id)
        .bind(&log.sale_item_id)
        .bind(&log.actor_id)
        .bind(&log.role)
        .bind(log.requested_bps)
        .bind(log.max_allowed_bps)
        .bind(log.discount_cents)
        .bind(log.created_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn discount_logs(&mut self, sale_id: &str) -> DbResult<Vec<DiscountAuthorizationLog>> {
        let logs = sqlx::query_as::<_, DiscountAuthorizationLog>(
            r#"
            SELECT id, sale_id, sale_item_id, actor_id, role,
                   requested_bps, max_allowed_bps, discount_cents, created_at
            FROM discount_authorization_logs
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(logs)
    }
}
