//! # Coupons
//!
//! Coupon definitions and the redemption rules checked at checkout.
//!
//! ## Evaluation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. inactive                       → InvalidCoupon                      │
//! │  2. now < valid_from               → InvalidCoupon                      │
//! │  3. now > valid_until              → CouponExpired                      │
//! │  4. usage_count >= usage_limit     → CouponLimitReached                 │
//! │     user's uses >= per_user_limit  → CouponLimitReached                 │
//! │  5. branch / product / category    → CouponNotApplicable                │
//! │  6. pre-coupon total < minimum     → CouponMinimumNotMet                │
//! │  7. amount: percentage (capped by max_discount) or fixed               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The amount returned here is further capped at the sale total by
//! [`SaleTotals::apply_coupon`](crate::pricing::SaleTotals::apply_coupon).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// `value` is in basis points.
    Percentage,
    /// `value` is in cents.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    /// Stored upper-cased.
    pub code: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub max_discount_cents: Option<i64>,
    pub min_purchase_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    pub usage_count: i64,
    #[ts(as = "Option<String>")]
    pub valid_from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Empty means every branch.
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub branch_ids: Vec<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub product_ids: Vec<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub category_ids: Vec<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one redemption.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CouponUsage {
    pub id: String,
    pub coupon_id: String,
    pub sale_id: String,
    /// Customer when known, otherwise the cashier.
    pub user_id: String,
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A sale line as seen by coupon filters.
#[derive(Debug, Clone)]
pub struct CouponLine {
    pub product_id: String,
    pub category_id: Option<String>,
    pub total: Money,
}

/// Everything a coupon needs to know about the sale being rung.
#[derive(Debug, Clone)]
pub struct CouponContext<'a> {
    pub branch_id: &'a str,
    pub lines: &'a [CouponLine],
    /// Sale total after line and employee discounts.
    pub pre_coupon_total: Money,
    /// Prior redemptions by the same customer (or cashier).
    pub user_usage_count: i64,
    pub now: DateTime<Utc>,
}

/// Canonical form of a coupon code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl Coupon {
    fn has_product_filters(&self) -> bool {
        !self.product_ids.is_empty() || !self.category_ids.is_empty()
    }

    fn line_matches(&self, line: &CouponLine) -> bool {
        self.product_ids.iter().any(|p| *p == line.product_id)
            || line
                .category_id
                .as_ref()
                .map(|c| self.category_ids.contains(c))
                .unwrap_or(false)
    }

    /// Validates the coupon against a sale and returns its discount amount
    /// (before capping at the sale total).
    pub fn evaluate(&self, ctx: &CouponContext<'_>) -> CoreResult<Money> {
        if !self.is_active {
            return Err(CoreError::InvalidCoupon {
                code: self.code.clone(),
                reason: "coupon is inactive".to_string(),
            });
        }
        if self.valid_from.map(|from| ctx.now < from).unwrap_or(false) {
            return Err(CoreError::InvalidCoupon {
                code: self.code.clone(),
                reason: "coupon is not yet valid".to_string(),
            });
        }
        if self.valid_until.map(|until| ctx.now > until).unwrap_or(false) {
            return Err(CoreError::CouponExpired {
                code: self.code.clone(),
            });
        }

        let global_exhausted = self
            .usage_limit
            .map(|limit| self.usage_count >= limit)
            .unwrap_or(false);
        let user_exhausted = self
            .per_user_limit
            .map(|limit| ctx.user_usage_count >= limit)
            .unwrap_or(false);
        if global_exhausted || user_exhausted {
            return Err(CoreError::CouponLimitReached {
                code: self.code.clone(),
            });
        }

        if !self.branch_ids.is_empty() && !self.branch_ids.iter().any(|b| b == ctx.branch_id) {
            return Err(CoreError::CouponNotApplicable {
                code: self.code.clone(),
            });
        }

        // Product/category filters narrow the base to the matching lines.
        let base = if self.has_product_filters() {
            let matching: Money = ctx
                .lines
                .iter()
                .filter(|l| self.line_matches(l))
                .map(|l| l.total)
                .sum();
            if !ctx.lines.iter().any(|l| self.line_matches(l)) {
                return Err(CoreError::CouponNotApplicable {
                    code: self.code.clone(),
                });
            }
            matching.min(ctx.pre_coupon_total)
        } else {
            ctx.pre_coupon_total
        };

        if let Some(minimum) = self.min_purchase_cents.map(Money::from_cents) {
            if ctx.pre_coupon_total < minimum {
                return Err(CoreError::CouponMinimumNotMet {
                    code: self.code.clone(),
                    minimum,
                    total: ctx.pre_coupon_total,
                });
            }
        }

        let amount = match self.coupon_type {
            CouponType::Percentage => {
                let rate = Rate::from_bps(self.value.clamp(0, u32::MAX as i64) as u32);
                let raw = base.percent(rate);
                match self.max_discount_cents {
                    Some(cap) => raw.min(Money::from_cents(cap)),
                    None => raw,
                }
            }
            CouponType::Fixed => Money::from_cents(self.value).min(base),
        };
        Ok(amount)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(coupon_type: CouponType, value: i64) -> Coupon {
        Coupon {
            id: "c-1".into(),
            code: "HALF".into(),
            coupon_type,
            value,
            max_discount_cents: None,
            min_purchase_cents: None,
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            valid_from: None,
            valid_until: None,
            branch_ids: vec![],
            product_ids: vec![],
            category_ids: vec![],
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn lines() -> Vec<CouponLine> {
        vec![CouponLine {
            product_id: "p-1".into(),
            category_id: Some("shirts".into()),
            total: Money::from_major(20),
        }]
    }

    fn ctx(lines: &[CouponLine]) -> CouponContext<'_> {
        CouponContext {
            branch_id: "b-1",
            lines,
            pre_coupon_total: Money::from_major(20),
            user_usage_count: 0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_capped_by_max_discount() {
        let mut c = coupon(CouponType::Percentage, 5_000);
        c.max_discount_cents = Some(500);
        let lines = lines();
        assert_eq!(c.evaluate(&ctx(&lines)).unwrap(), Money::from_major(5));

        c.max_discount_cents = None;
        assert_eq!(c.evaluate(&ctx(&lines)).unwrap(), Money::from_major(10));
    }

    #[test]
    fn test_fixed_capped_at_base() {
        let c = coupon(CouponType::Fixed, 3_000);
        let lines = lines();
        assert_eq!(c.evaluate(&ctx(&lines)).unwrap(), Money::from_major(20));
    }

    #[test]
    fn test_validity_window() {
        let lines = lines();
        let mut c = coupon(CouponType::Fixed, 100);
        c.valid_until = Some(Utc::now() - Duration::days(1));
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::CouponExpired { .. })
        ));

        c.valid_until = None;
        c.valid_from = Some(Utc::now() + Duration::days(1));
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::InvalidCoupon { .. })
        ));

        c.valid_from = None;
        c.is_active = false;
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::InvalidCoupon { .. })
        ));
    }

    #[test]
    fn test_limits() {
        let lines = lines();
        let mut c = coupon(CouponType::Fixed, 100);
        c.usage_limit = Some(3);
        c.usage_count = 3;
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::CouponLimitReached { .. })
        ));

        c.usage_count = 0;
        c.per_user_limit = Some(1);
        let mut context = ctx(&lines);
        context.user_usage_count = 1;
        assert!(matches!(
            c.evaluate(&context),
            Err(CoreError::CouponLimitReached { .. })
        ));
    }

    #[test]
    fn test_filters_and_minimum() {
        let lines = lines();
        let mut c = coupon(CouponType::Fixed, 100);
        c.branch_ids = vec!["b-2".into()];
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::CouponNotApplicable { .. })
        ));

        c.branch_ids = vec![];
        c.category_ids = vec!["shoes".into()];
        assert!(matches!(
            c.evaluate(&ctx(&lines)),
            Err(CoreError::CouponNotApplicable { .. })
        ));

        c.category_ids = vec!["shirts".into()];
        assert!(c.evaluate(&ctx(&lines)).is_ok());

        c.min_purchase_cents = Some(5_000);
        match c.evaluate(&ctx(&lines)) {
            Err(CoreError::CouponMinimumNotMet { minimum, total, .. }) => {
                assert_eq!(minimum, Money::from_major(50));
                assert_eq!(total, Money::from_major(20));
            }
            other => panic!("expected CouponMinimumNotMet, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  spring50 "), "SPRING50");
    }
}
