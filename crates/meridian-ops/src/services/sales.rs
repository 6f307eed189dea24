//! # Sales Service
//!
//! Checkout: prices the lines, applies discounts and a coupon, settles cash
//! and decrements the ledger, all in one unit of work.
//!
//! ## Checkout Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleRequest                                                            │
//! │     │                                                                   │
//! │     ├─ 1. validate lines, authorize each line discount   (no I/O)      │
//! │     │                                                                   │
//! │     ▼  db.begin()                                                       │
//! │     ├─ 2. branch, register session, products                            │
//! │     ├─ 3. price lines, employee discount, coupon                        │
//! │     ├─ 4. settle cash                                                   │
//! │     ├─ 5. receipt number, sale + items                                  │
//! │     ├─ 6. ledger: one Sale movement per line                           │
//! │     ├─ 7. discount logs, coupon usage, register cash movement          │
//! │     ▼                                                                   │
//! │  uow.commit() ──► SaleReceipt { sale, items, change }                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure after step 1 drops the unit of work, so a rejected sale leaves
//! no header, no stock change and no consumed receipt number behind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meridian_core::coupon::{normalize_code, CouponContext, CouponLine};
use meridian_core::pricing::{price_line, settle_cash, LinePrice, SaleTotals};
use meridian_core::validation::{
    validate_amount_cents, validate_line_count, validate_quantity, validate_rate,
};
use meridian_core::{
    Actor, CashMovement, CashMovementKind, CoreError, CouponUsage, DiscountAuthorizationLog,
    DiscountCeiling, DiscountPolicy, Money, MovementCause, MovementReference, MovementType,
    PaymentMethod, Product, Rate, Sale, SaleItem, SaleReceipt, SaleStatus, ValidationError,
};
use meridian_db::{generate_id, Database, Repositories};

use super::require_branch;
use crate::error::OpsResult;

/// One line at the till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    /// Defaults to the catalogue price.
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount_bps: u32,
    #[serde(default)]
    pub tax_bps: u32,
}

impl SaleLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            variant_id: None,
            quantity,
            unit_price_cents: None,
            discount_bps: 0,
            tax_bps: 0,
        }
    }

    pub fn with_discount(mut self, rate: Rate) -> Self {
        self.discount_bps = rate.bps();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRequest {
    pub branch_id: String,
    pub register_session_id: Option<String>,
    pub staff_id: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub lines: Vec<SaleLine>,
    pub coupon_code: Option<String>,
    pub cash_received_cents: Option<i64>,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub is_employee_purchase: bool,
    pub notes: Option<String>,
}

impl SaleRequest {
    /// A request with every optional field unset.
    pub fn new(branch_id: impl Into<String>, payment_method: PaymentMethod, lines: Vec<SaleLine>) -> Self {
        SaleRequest {
            branch_id: branch_id.into(),
            register_session_id: None,
            staff_id: None,
            customer_id: None,
            payment_method,
            lines,
            coupon_code: None,
            cash_received_cents: None,
            is_gift: false,
            is_employee_purchase: false,
            notes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SalesService {
    db: Database,
    policy: Arc<DiscountPolicy>,
    employee_rate: Rate,
}

impl SalesService {
    pub fn new(db: Database, policy: Arc<DiscountPolicy>, employee_rate: Rate) -> Self {
        SalesService {
            db,
            policy,
            employee_rate,
        }
    }

    /// Rings up a sale.
    pub async fn sell(&self, actor: &Actor, request: SaleRequest) -> OpsResult<SaleReceipt> {
        // =====================================================================
        // Validation and discount authorization (no I/O)
        // =====================================================================
        validate_line_count("lines", request.lines.len())?;
        let mut ceilings = Vec::with_capacity(request.lines.len());
        for (index, line) in request.lines.iter().enumerate() {
            validate_quantity("quantity", line.quantity)?;
            if let Some(price) = line.unit_price_cents {
                validate_amount_cents("unit_price_cents", price)?;
            }
            let rate = Rate::from_bps(line.discount_bps);
            validate_rate("discount", rate)?;
            validate_rate("tax", Rate::from_bps(line.tax_bps))?;
            ceilings.push(self.policy.authorize(index, &actor.role, rate)?);
        }
        if let Some(cash) = request.cash_received_cents {
            validate_amount_cents("cash_received_cents", cash)?;
        }

        let mut uow = self.db.begin().await?;
        let now = uow.now();

        // =====================================================================
        // Branch, register and catalogue
        // =====================================================================
        let branch = require_branch(&mut uow, &request.branch_id).await?;
        if !branch.kind.is_sale_ready() || !branch.is_active {
            return Err(ValidationError::InvalidFormat {
                field: "branch_id".to_string(),
                reason: format!("branch {} does not sell stock", branch.code),
            }
            .into());
        }

        if let Some(session_id) = request.register_session_id.as_deref() {
            let session = uow
                .registers()
                .get(session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("register session", session_id))?;
            session.ensure_open("ring a sale")?;
            if session.branch_id != branch.id {
                return Err(ValidationError::InvalidFormat {
                    field: "register_session_id".to_string(),
                    reason: "register belongs to another branch".to_string(),
                }
                .into());
            }
        }

        let mut products = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            products.push(sellable_product(&mut uow, &line.product_id).await?);
        }

        // =====================================================================
        // Pricing
        // =====================================================================
        let unit_prices: Vec<Money> = request
            .lines
            .iter()
            .zip(&products)
            .map(|(line, product)| {
                line.unit_price_cents
                    .map(Money::from_cents)
                    .unwrap_or_else(|| product.price())
            })
            .collect();
        let prices: Vec<LinePrice> = request
            .lines
            .iter()
            .zip(&unit_prices)
            .map(|(line, unit)| {
                price_line(
                    line.quantity,
                    *unit,
                    Rate::from_bps(line.discount_bps),
                    Rate::from_bps(line.tax_bps),
                )
            })
            .collect();
        let employee_rate = request.is_employee_purchase.then_some(self.employee_rate);
        let mut totals = SaleTotals::from_lines(&prices, employee_rate);

        let coupon = match request.coupon_code.as_deref() {
            Some(code) => {
                let code = normalize_code(code);
                let coupon = uow
                    .coupons()
                    .get_by_code(&code)
                    .await?
                    .ok_or_else(|| CoreError::InvalidCoupon {
                        code: code.clone(),
                        reason: "unknown coupon code".to_string(),
                    })?;
                let user_id = request.customer_id.as_deref().unwrap_or(&actor.id);
                let user_usage_count = uow.coupons().usage_count_for_user(&coupon.id, user_id).await?;

                let coupon_lines: Vec<CouponLine> = prices
                    .iter()
                    .zip(&products)
                    .map(|(price, product)| CouponLine {
                        product_id: product.id.clone(),
                        category_id: product.category_id.clone(),
                        total: price.total,
                    })
                    .collect();
                let amount = coupon.evaluate(&CouponContext {
                    branch_id: &branch.id,
                    lines: &coupon_lines,
                    pre_coupon_total: totals.total,
                    user_usage_count,
                    now,
                })?;
                let applied = totals.apply_coupon(amount);
                debug!(code = %coupon.code, applied = %applied, "Coupon applied");
                Some(coupon)
            }
            None => None,
        };

        // =====================================================================
        // Settlement
        // =====================================================================
        let (cash_received, change) = if request.payment_method.involves_cash() {
            let received = request.cash_received_cents.map(Money::from_cents);
            let change = settle_cash(totals.total, received)?;
            (received, Some(change))
        } else {
            (None, None)
        };

        // =====================================================================
        // Persist
        // =====================================================================
        let receipt_number = uow.sales().next_receipt_number(&branch.code, now).await?;
        let sale = Sale {
            id: generate_id(),
            receipt_number,
            branch_id: branch.id.clone(),
            register_session_id: request.register_session_id.clone(),
            cashier_id: actor.id.clone(),
            staff_id: request.staff_id,
            customer_id: request.customer_id.clone(),
            payment_method: request.payment_method,
            status: SaleStatus::Completed,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tax_cents: totals.tax.cents(),
            employee_discount_cents: totals.employee_discount.cents(),
            coupon_id: coupon.as_ref().map(|c| c.id.clone()),
            coupon_discount_cents: totals.coupon_discount.cents(),
            total_cents: totals.total.cents(),
            cash_received_cents: cash_received.map(|m| m.cents()),
            change_cents: change.map(|m| m.cents()),
            returned_cents: 0,
            is_gift: request.is_gift,
            is_employee_purchase: request.is_employee_purchase,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<SaleItem> = request
            .lines
            .iter()
            .zip(prices.iter().zip(&unit_prices))
            .enumerate()
            .map(|(index, (line, (price, unit)))| SaleItem {
                id: generate_id(),
                sale_id: sale.id.clone(),
                line_no: index as i64,
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                quantity: line.quantity,
                unit_price_cents: unit.cents(),
                discount_bps: line.discount_bps,
                tax_bps: line.tax_bps,
                discount_cents: price.discount.cents(),
                tax_cents: price.tax.cents(),
                line_total_cents: price.total.cents(),
                returned_quantity: 0,
                refunded_cents: 0,
            })
            .collect();
        uow.sales().insert(&sale, &items).await?;

        let cause = MovementCause::new(
            MovementType::Sale,
            MovementReference::Sale(sale.id.clone()),
            &actor.id,
        );
        for item in &items {
            uow.ledger()
                .adjust(&item.stock_key(&sale.branch_id), -item.quantity, &cause)
                .await?;
        }

        for (item, ceiling) in items.iter().zip(&ceilings) {
            if item.discount_bps == 0 {
                continue;
            }
            let log = discount_log(&sale, item, actor, *ceiling);
            uow.sales().insert_discount_log(&log).await?;
        }

        if let Some(coupon) = &coupon {
            let usage = CouponUsage {
                id: generate_id(),
                coupon_id: coupon.id.clone(),
                sale_id: sale.id.clone(),
                user_id: request.customer_id.unwrap_or_else(|| actor.id.clone()),
                discount_cents: sale.coupon_discount_cents,
                created_at: now,
            };
            uow.coupons().record_usage(&usage).await?;
        }

        if let (true, Some(session_id)) = (
            sale.payment_method.involves_cash(),
            sale.register_session_id.as_ref(),
        ) {
            let movement = CashMovement {
                id: generate_id(),
                session_id: session_id.clone(),
                kind: CashMovementKind::Sale,
                amount_cents: sale.total_cents,
                reference_id: Some(sale.id.clone()),
                note: None,
                actor_id: actor.id.clone(),
                created_at: now,
            };
            uow.registers().insert_movement(&movement).await?;
        }
        uow.commit().await?;

        info!(
            sale_id = %sale.id,
            receipt = %sale.receipt_number,
            branch_id = %sale.branch_id,
            lines = items.len(),
            total = %sale.total(),
            payment = ?sale.payment_method,
            "Sale completed"
        );
        Ok(SaleReceipt { sale, items, change })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_sale(&self, sale_id: &str) -> OpsResult<SaleReceipt> {
        let mut session = self.db.session().await?;
        let sale = session
            .sales()
            .get(sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sale", sale_id))?;
        let items = session.sales().items(&sale.id).await?;
        let change = sale.change_cents.map(Money::from_cents);
        Ok(SaleReceipt { sale, items, change })
    }

    pub async fn get_by_receipt(&self, receipt_number: &str) -> OpsResult<SaleReceipt> {
        let mut session = self.db.session().await?;
        let sale = session
            .sales()
            .get_by_receipt(receipt_number)
            .await?
            .ok_or_else(|| CoreError::not_found("sale", receipt_number))?;
        let items = session.sales().items(&sale.id).await?;
        let change = sale.change_cents.map(Money::from_cents);
        Ok(SaleReceipt { sale, items, change })
    }

    pub async fn discount_logs(&self, sale_id: &str) -> OpsResult<Vec<DiscountAuthorizationLog>> {
        let mut session = self.db.session().await?;
        Ok(session.sales().discount_logs(sale_id).await?)
    }
}

async fn sellable_product<R: Repositories>(repos: &mut R, product_id: &str) -> OpsResult<Product> {
    let product = repos
        .products()
        .get(product_id)
        .await?
        .ok_or_else(|| CoreError::not_found("product", product_id))?;
    if !product.is_active {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: format!("product {} is not for sale", product.sku),
        }
        .into());
    }
    Ok(product)
}

fn discount_log(sale: &Sale, item: &SaleItem, actor: &Actor, ceiling: DiscountCeiling) -> DiscountAuthorizationLog {
    DiscountAuthorizationLog {
        id: generate_id(),
        sale_id: sale.id.clone(),
        sale_item_id: item.id.clone(),
        actor_id: actor.id.clone(),
        role: actor.role.clone(),
        requested_bps: item.discount_bps,
        max_allowed_bps: ceiling.max_allowed().bps(),
        discount_cents: item.discount_cents,
        created_at: sale.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, OpsError};
    use crate::services::NewCoupon;
    use crate::testing::{cashier, fixture, manager, owner};
    use meridian_core::CouponType;
    use meridian_db::MovementFilter;

    #[tokio::test]
    async fn test_card_sale_decrements_stock_and_numbers_receipts() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let sales = fx.office.sales();

        let receipt = sales
            .sell(
                &cashier(),
                SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.shirt.id, 2)]),
            )
            .await
            .unwrap();

        assert_eq!(receipt.sale.subtotal_cents, 4_000);
        assert_eq!(receipt.sale.total_cents, 4_000);
        assert_eq!(receipt.sale.status, SaleStatus::Completed);
        assert!(receipt.change.is_none());
        assert!(receipt.sale.receipt_number.ends_with("-DT-0001"));
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 3);

        let second = sales
            .sell(
                &cashier(),
                SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.shirt.id, 1)]),
            )
            .await
            .unwrap();
        assert!(second.sale.receipt_number.ends_with("-DT-0002"));

        let movements = fx
            .office
            .inventory()
            .movements(&MovementFilter {
                reference: Some(MovementReference::Sale(receipt.sale.id.clone())),
                ..MovementFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Sale);
        assert_eq!(movements[0].quantity, 2);

        let loaded = sales.get_by_receipt(&receipt.sale.receipt_number).await.unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].unit_price_cents, 2_000);
    }

    #[tokio::test]
    async fn test_cashier_discount_ceiling() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let sales = fx.office.sales();

        let err = sales
            .sell(
                &cashier(),
                SaleRequest::new(
                    &fx.store.id,
                    PaymentMethod::Card,
                    vec![SaleLine::new(&fx.shirt.id, 1).with_discount(Rate::from_percent(15))],
                ),
            )
            .await
            .unwrap_err();
        match err {
            OpsError::Domain(CoreError::DiscountNotAuthorized { max_allowed, line, .. }) => {
                assert_eq!(max_allowed, Rate::from_percent(10));
                assert_eq!(line, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 5);

        let receipt = sales
            .sell(
                &cashier(),
                SaleRequest::new(
                    &fx.store.id,
                    PaymentMethod::Card,
                    vec![SaleLine::new(&fx.shirt.id, 1).with_discount(Rate::from_percent(8))],
                ),
            )
            .await
            .unwrap();
        assert_eq!(receipt.sale.discount_cents, 160);
        assert_eq!(receipt.sale.total_cents, 1_840);

        let logs = sales.discount_logs(&receipt.sale.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].role, "cashier");
        assert_eq!(logs[0].requested_bps, 800);
        assert_eq!(logs[0].max_allowed_bps, 1_000);
        assert_eq!(logs[0].discount_cents, 160);
    }

    #[tokio::test]
    async fn test_owner_discount_is_unrestricted() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 1).await;

        let receipt = fx
            .office
            .sales()
            .sell(
                &owner(),
                SaleRequest::new(
                    &fx.store.id,
                    PaymentMethod::Card,
                    vec![SaleLine::new(&fx.mug.id, 1).with_discount(Rate::from_percent(100))],
                ),
            )
            .await
            .unwrap();
        assert_eq!(receipt.sale.total_cents, 0);
    }

    #[tokio::test]
    async fn test_percentage_coupon_is_capped() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        fx.office
            .catalog()
            .create_coupon(NewCoupon {
                code: "HALF".into(),
                coupon_type: Some(CouponType::Percentage),
                value: 5_000,
                max_discount_cents: Some(500),
                ..NewCoupon::default()
            })
            .await
            .unwrap();

        let mut request =
            SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.shirt.id, 1)]);
        request.coupon_code = Some("half".into());
        let receipt = fx.office.sales().sell(&cashier(), request).await.unwrap();

        assert_eq!(receipt.sale.subtotal_cents, 2_000);
        assert_eq!(receipt.sale.coupon_discount_cents, 500);
        assert_eq!(receipt.sale.total_cents, 1_500);

        let coupon = fx.office.catalog().coupon_by_code("HALF").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 1);
        assert_eq!(receipt.sale.coupon_id.as_deref(), Some(coupon.id.as_str()));
    }

    #[tokio::test]
    async fn test_per_user_coupon_limit_counts_customer() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 5).await;
        fx.office
            .catalog()
            .create_coupon(NewCoupon {
                code: "ONCE".into(),
                coupon_type: Some(CouponType::Fixed),
                value: 100,
                per_user_limit: Some(1),
                ..NewCoupon::default()
            })
            .await
            .unwrap();
        let sales = fx.office.sales();

        let request = |customer: &str| {
            let mut r = SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.mug.id, 1)]);
            r.coupon_code = Some("ONCE".into());
            r.customer_id = Some(customer.to_string());
            r
        };

        sales.sell(&cashier(), request("cust-1")).await.unwrap();
        let err = sales.sell(&cashier(), request("cust-1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CouponLimitReached);
        sales.sell(&cashier(), request("cust-2")).await.unwrap();

        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 3);
    }

    #[tokio::test]
    async fn test_unknown_coupon_rejects_sale() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.mug.id, 5).await;

        let mut request = SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.mug.id, 1)]);
        request.coupon_code = Some("NOPE".into());
        let err = fx.office.sales().sell(&cashier(), request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCoupon);
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 5);
    }

    #[tokio::test]
    async fn test_employee_purchase_discount() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;

        let mut request = SaleRequest::new(
            &fx.store.id,
            PaymentMethod::Card,
            vec![SaleLine::new(&fx.shirt.id, 2).with_discount(Rate::from_percent(10))],
        );
        request.is_employee_purchase = true;
        let receipt = fx.office.sales().sell(&manager(), request).await.unwrap();

        // 4000 - 400 line discount, then 20% of 3600
        assert_eq!(receipt.sale.discount_cents, 400);
        assert_eq!(receipt.sale.employee_discount_cents, 720);
        assert_eq!(receipt.sale.total_cents, 2_880);
    }

    #[tokio::test]
    async fn test_short_cash_rolls_back_everything() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let sales = fx.office.sales();

        let mut request =
            SaleRequest::new(&fx.store.id, PaymentMethod::Cash, vec![SaleLine::new(&fx.shirt.id, 1)]);
        request.cash_received_cents = Some(1_500);
        let err = sales.sell(&cashier(), request.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            OpsError::Domain(CoreError::InsufficientCashReceived { .. })
        ));
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 5);

        request.cash_received_cents = Some(5_000);
        let receipt = sales.sell(&cashier(), request).await.unwrap();
        assert_eq!(receipt.change, Some(Money::from_cents(3_000)));
        assert!(receipt.sale.receipt_number.ends_with("-0001"));
    }

    #[tokio::test]
    async fn test_oversized_unit_price_rejected_before_any_write() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;

        let mut line = SaleLine::new(&fx.shirt.id, 3);
        line.unit_price_cents = Some(i64::MAX / 2);
        let request = SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![line]);

        let err = fx.office.sales().sell(&owner(), request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 5);
    }

    #[tokio::test]
    async fn test_shortage_on_any_line_aborts_sale() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        fx.stock(&fx.store.id, &fx.mug.id, 1).await;

        let err = fx
            .office
            .sales()
            .sell(
                &cashier(),
                SaleRequest::new(
                    &fx.store.id,
                    PaymentMethod::Card,
                    vec![SaleLine::new(&fx.shirt.id, 2), SaleLine::new(&fx.mug.id, 2)],
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 5);
        assert_eq!(fx.quantity(&fx.store.id, &fx.mug.id).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sales_cannot_oversell() {
        let fx = fixture().await;
        fx.stock(&fx.store.id, &fx.shirt.id, 5).await;
        let first = fx.office.sales();
        let second = fx.office.sales();
        let line = || SaleRequest::new(&fx.store.id, PaymentMethod::Card, vec![SaleLine::new(&fx.shirt.id, 3)]);

        let (till_a, till_b) = (cashier(), cashier());

        let (a, b) = tokio::join!(first.sell(&till_a, line()), second.sell(&till_b, line()));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.code(), ErrorCode::InsufficientStock);
        assert_eq!(fx.quantity(&fx.store.id, &fx.shirt.id).await, 2);
    }

    #[tokio::test]
    async fn test_repair_branch_cannot_sell() {
        let fx = fixture().await;
        let err = fx
            .office
            .sales()
            .sell(
                &cashier(),
                SaleRequest::new(&fx.repair.id, PaymentMethod::Card, vec![SaleLine::new(&fx.mug.id, 1)]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
