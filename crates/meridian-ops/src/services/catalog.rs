//! # Catalog Service
//!
//! Branches, products and coupons: the reference data the workflows read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use meridian_core::coupon::normalize_code;
use meridian_core::validation::{
    validate_amount_cents, validate_branch_code, validate_coupon_code, validate_name,
    validate_positive_amount, validate_rate, validate_sku,
};
use meridian_core::{
    Branch, BranchKind, CoreError, Coupon, CouponType, Product, Rate, ValidationError,
};
use meridian_db::{generate_id, Database, Repositories};

use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBranch {
    pub code: String,
    pub name: String,
    pub kind: BranchKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category_id: Option<String>,
    pub price_cents: i64,
}

/// Coupon definition. `value` is basis points for percentage coupons and
/// cents for fixed ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub coupon_type: Option<CouponType>,
    pub value: i64,
    pub max_discount_cents: Option<i64>,
    pub min_purchase_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub branch_ids: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        CatalogService { db }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Creates a branch. Codes are stored upper-case and appear in receipt
    /// numbers.
    pub async fn create_branch(&self, new: NewBranch) -> OpsResult<Branch> {
        validate_branch_code(&new.code)?;
        validate_name("branch name", &new.name)?;

        let mut uow = self.db.begin().await?;
        let branch = Branch {
            id: generate_id(),
            code: new.code.trim().to_ascii_uppercase(),
            name: new.name.trim().to_string(),
            kind: new.kind,
            is_active: true,
            created_at: uow.now(),
        };
        uow.branches().insert(&branch).await?;
        uow.commit().await?;

        info!(branch_id = %branch.id, code = %branch.code, kind = ?branch.kind, "Branch created");
        Ok(branch)
    }

    pub async fn branch(&self, id: &str) -> OpsResult<Branch> {
        let mut session = self.db.session().await?;
        Ok(session
            .branches()
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("branch", id))?)
    }

    pub async fn list_branches(&self, active_only: bool) -> OpsResult<Vec<Branch>> {
        let mut session = self.db.session().await?;
        Ok(session.branches().list(active_only).await?)
    }

    pub async fn set_branch_active(&self, id: &str, active: bool) -> OpsResult<()> {
        let mut uow = self.db.begin().await?;
        if !uow.branches().set_active(id, active).await? {
            return Err(CoreError::not_found("branch", id).into());
        }
        uow.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn create_product(&self, new: NewProduct) -> OpsResult<Product> {
        validate_sku(&new.sku)?;
        validate_name("product name", &new.name)?;
        validate_amount_cents("price_cents", new.price_cents)?;

        let mut uow = self.db.begin().await?;
        let now = uow.now();
        let product = Product {
            id: generate_id(),
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            category_id: new.category_id,
            price_cents: new.price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        uow.products().insert(&product).await?;
        uow.commit().await?;

        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    pub async fn product(&self, id: &str) -> OpsResult<Product> {
        let mut session = self.db.session().await?;
        Ok(session
            .products()
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("product", id))?)
    }

    pub async fn product_by_sku(&self, sku: &str) -> OpsResult<Option<Product>> {
        let mut session = self.db.session().await?;
        Ok(session.products().get_by_sku(sku).await?)
    }

    /// Products whose name or SKU contains `search`.
    pub async fn search_products(&self, search: Option<&str>, limit: u32) -> OpsResult<Vec<Product>> {
        let mut session = self.db.session().await?;
        Ok(session.products().list(search, limit).await?)
    }

    pub async fn update_price(&self, product_id: &str, price_cents: i64) -> OpsResult<()> {
        validate_amount_cents("price_cents", price_cents)?;

        let mut uow = self.db.begin().await?;
        let now = uow.now();
        if !uow.products().update_price(product_id, price_cents, now).await? {
            return Err(CoreError::not_found("product", product_id).into());
        }
        uow.commit().await?;
        Ok(())
    }

    pub async fn set_product_active(&self, product_id: &str, active: bool) -> OpsResult<()> {
        let mut uow = self.db.begin().await?;
        let now = uow.now();
        if !uow.products().set_active(product_id, active, now).await? {
            return Err(CoreError::not_found("product", product_id).into());
        }
        uow.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    pub async fn create_coupon(&self, new: NewCoupon) -> OpsResult<Coupon> {
        validate_coupon_code(&new.code)?;
        let coupon_type = new.coupon_type.unwrap_or(CouponType::Percentage);
        match coupon_type {
            CouponType::Percentage => {
                validate_positive_amount("value", new.value)?;
                let bps = u32::try_from(new.value).unwrap_or(u32::MAX);
                validate_rate("value", Rate::from_bps(bps))?;
            }
            CouponType::Fixed => validate_positive_amount("value", new.value)?,
        }
        if let Some(cap) = new.max_discount_cents {
            validate_positive_amount("max_discount_cents", cap)?;
        }
        if let Some(min) = new.min_purchase_cents {
            validate_amount_cents("min_purchase_cents", min)?;
        }
        for (field, limit) in [
            ("usage_limit", new.usage_limit),
            ("per_user_limit", new.per_user_limit),
        ] {
            if let Some(limit) = limit {
                validate_positive_amount(field, limit)?;
            }
        }
        if let (Some(from), Some(until)) = (new.valid_from, new.valid_until) {
            if until <= from {
                return Err(ValidationError::InvalidFormat {
                    field: "valid_until".to_string(),
                    reason: "must be after valid_from".to_string(),
                }
                .into());
            }
        }

        let mut uow = self.db.begin().await?;
        let coupon = Coupon {
            id: generate_id(),
            code: normalize_code(&new.code),
            coupon_type,
            value: new.value,
            max_discount_cents: new.max_discount_cents,
            min_purchase_cents: new.min_purchase_cents,
            usage_limit: new.usage_limit,
            per_user_limit: new.per_user_limit,
            usage_count: 0,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            branch_ids: new.branch_ids,
            product_ids: new.product_ids,
            category_ids: new.category_ids,
            is_active: true,
            created_at: uow.now(),
        };
        uow.coupons().insert(&coupon).await?;
        uow.commit().await?;

        info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    /// Looks up a coupon by code, case-insensitively.
    pub async fn coupon_by_code(&self, code: &str) -> OpsResult<Option<Coupon>> {
        let mut session = self.db.session().await?;
        Ok(session.coupons().get_by_code(&normalize_code(code)).await?)
    }

    pub async fn set_coupon_active(&self, coupon_id: &str, active: bool) -> OpsResult<()> {
        let mut uow = self.db.begin().await?;
        if !uow.coupons().set_active(coupon_id, active).await? {
            return Err(CoreError::not_found("coupon", coupon_id).into());
        }
        uow.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, OpsError};
    use crate::testing::office;

    #[tokio::test]
    async fn test_branch_code_is_normalized_and_unique() {
        let office = office().await;
        let catalog = office.catalog();

        let branch = catalog
            .create_branch(NewBranch {
                code: " dt ".into(),
                name: "Downtown".into(),
                kind: BranchKind::Store,
            })
            .await
            .unwrap();
        assert_eq!(branch.code, "DT");

        let err = catalog
            .create_branch(NewBranch {
                code: "DT".into(),
                name: "Downtown again".into(),
                kind: BranchKind::Store,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_product_validation_runs_before_writes() {
        let office = office().await;
        let err = office
            .catalog()
            .create_product(NewProduct {
                sku: "BAD SKU".into(),
                name: "Shirt".into(),
                category_id: None,
                price_cents: 1_000,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Domain(CoreError::Validation(_))));
        assert!(office.catalog().search_products(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_update_and_lookup() {
        let office = office().await;
        let catalog = office.catalog();
        let product = catalog
            .create_product(NewProduct {
                sku: "MUG-1".into(),
                name: "Mug".into(),
                category_id: Some("kitchen".into()),
                price_cents: 800,
            })
            .await
            .unwrap();

        catalog.update_price(&product.id, 950).await.unwrap();
        let loaded = catalog.product_by_sku("MUG-1").await.unwrap().unwrap();
        assert_eq!(loaded.price_cents, 950);

        let err = catalog.update_price("missing", 100).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_coupon_code_stored_upper_case() {
        let office = office().await;
        let catalog = office.catalog();
        catalog
            .create_coupon(NewCoupon {
                code: "spring-sale".into(),
                value: 1_500,
                ..NewCoupon::default()
            })
            .await
            .unwrap();

        let coupon = catalog.coupon_by_code("Spring-Sale").await.unwrap().unwrap();
        assert_eq!(coupon.code, "SPRING-SALE");
        assert_eq!(coupon.coupon_type, CouponType::Percentage);
    }

    #[tokio::test]
    async fn test_percentage_coupon_over_full_rate_rejected() {
        let office = office().await;
        let err = office
            .catalog()
            .create_coupon(NewCoupon {
                code: "TOOMUCH".into(),
                value: 12_000,
                ..NewCoupon::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
