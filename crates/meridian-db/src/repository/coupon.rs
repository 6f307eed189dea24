//! # Coupon Repository
//!
//! Coupon definitions and redemptions. Branch, product and category filter
//! lists are stored as JSON arrays in TEXT columns.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{Coupon, CouponUsage};

const COUPON_COLUMNS: &str = "id, code, coupon_type, value, max_discount_cents, \
     min_purchase_cents, usage_limit, per_user_limit, usage_count, valid_from, valid_until, \
     branch_ids, product_ids, category_ids, is_active, created_at";

#[derive(Debug)]
pub struct CouponRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CouponRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        CouponRepository { conn }
    }

    pub async fn insert(&mut self, coupon: &Coupon) -> DbResult<()> {
        debug!(id = %coupon.id, code = %coupon.code, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, coupon_type, value, max_discount_cents, min_purchase_cents,
                usage_limit, per_user_limit, usage_count, valid_from, valid_until,
                branch_ids, product_ids, category_ids, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(coupon.coupon_type)
        .bind(coupon.value)
        .bind(coupon.max_discount_cents)
        .bind(coupon.min_purchase_cents)
        .bind(coupon.usage_limit)
        .bind(coupon.per_user_limit)
        .bind(coupon.usage_count)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(serde_json::to_string(&coupon.branch_ids)?)
        .bind(serde_json::to_string(&coupon.product_ids)?)
        .bind(serde_json::to_string(&coupon.category_ids)?)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE id = ?1", COUPON_COLUMNS);
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(coupon)
    }

    /// Looks up by code; callers pass the normalized (upper-case) form.
    pub async fn get_by_code(&mut self, code: &str) -> DbResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLUMNS);
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(code)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(coupon)
    }

    pub async fn set_active(&mut self, id: &str, active: bool) -> DbResult<bool> {
        let result = sqlx::query("UPDATE coupons SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records a redemption and bumps the coupon's usage counter.
    pub async fn record_usage(&mut self, usage: &CouponUsage) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_usages (id, coupon_id, sale_id, user_id, discount_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.coupon_id)
        .bind(&usage.sale_id)
        .bind(&usage.user_id)
        .bind(usage.discount_cents)
        .bind(usage.created_at)
        .execute(&mut *self.conn)
        .await?;

        let result = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE id = ?1")
            .bind(&usage.coupon_id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("coupon", &usage.coupon_id));
        }

        debug!(coupon_id = %usage.coupon_id, sale_id = %usage.sale_id, "Coupon redeemed");
        Ok(())
    }

    /// Prior redemptions of a coupon by one user.
    pub async fn usage_count_for_user(&mut self, coupon_id: &str, user_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = ?1 AND user_id = ?2",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }

    pub async fn usages(&mut self, coupon_id: &str) -> DbResult<Vec<CouponUsage>> {
        let usages = sqlx::query_as::<_, CouponUsage>(
            r#"
            SELECT id, coupon_id, sale_id, user_id, discount_cents, created_at
            FROM coupon_usages WHERE coupon_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(coupon_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(usages)
    }
}
