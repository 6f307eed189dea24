//! Shared fixtures for the service tests.
//!
//! Every fixture is a fresh in-memory office with default settings.

use meridian_core::{Actor, Branch, BranchKind, Product, StockKey};

use crate::config::BackOfficeConfig;
use crate::services::{NewBranch, NewProduct, PurchaseReceipt, StockLine};
use crate::BackOffice;

pub fn owner() -> Actor {
    Actor::new("user-owner", "owner")
}

pub fn manager() -> Actor {
    Actor::new("user-manager", "manager")
}

pub fn cashier() -> Actor {
    Actor::new("user-cashier", "cashier")
}

pub async fn office() -> BackOffice {
    BackOffice::in_memory(BackOfficeConfig::default())
        .await
        .expect("in-memory office")
}

/// Four branches (one per kind) and two products, no stock.
pub struct Fixture {
    pub office: BackOffice,
    pub store: Branch,
    pub warehouse: Branch,
    pub repair: Branch,
    pub discard: Branch,
    /// 20.00, category `apparel`.
    pub shirt: Product,
    /// 8.00, category `kitchen`.
    pub mug: Product,
}

pub async fn fixture() -> Fixture {
    let office = office().await;
    let catalog = office.catalog();

    let branch = |code: &str, name: &str, kind: BranchKind| NewBranch {
        code: code.into(),
        name: name.into(),
        kind,
    };
    let store = catalog
        .create_branch(branch("DT", "Downtown", BranchKind::Store))
        .await
        .expect("store");
    let warehouse = catalog
        .create_branch(branch("WH", "Central Warehouse", BranchKind::Warehouse))
        .await
        .expect("warehouse");
    let repair = catalog
        .create_branch(branch("RP", "Repair Bench", BranchKind::Repair))
        .await
        .expect("repair");
    let discard = catalog
        .create_branch(branch("DS", "Write-offs", BranchKind::Discard))
        .await
        .expect("discard");

    let shirt = catalog
        .create_product(NewProduct {
            sku: "SHIRT-001".into(),
            name: "Oxford Shirt".into(),
            category_id: Some("apparel".into()),
            price_cents: 2_000,
        })
        .await
        .expect("shirt");
    let mug = catalog
        .create_product(NewProduct {
            sku: "MUG-001".into(),
            name: "Stoneware Mug".into(),
            category_id: Some("kitchen".into()),
            price_cents: 800,
        })
        .await
        .expect("mug");

    Fixture {
        office,
        store,
        warehouse,
        repair,
        discard,
        shirt,
        mug,
    }
}

/// [`fixture`] with the repair and discard branches deactivated.
pub async fn bare_fixture() -> Fixture {
    let fx = fixture().await;
    let catalog = fx.office.catalog();
    for id in [&fx.repair.id, &fx.discard.id] {
        catalog.set_branch_active(id, false).await.expect("deactivate");
    }
    fx
}

impl Fixture {
    /// Receives `quantity` units as a purchase.
    pub async fn stock(&self, branch_id: &str, product_id: &str, quantity: i64) {
        self.office
            .inventory()
            .receive_purchase(
                &manager(),
                PurchaseReceipt {
                    branch_id: branch_id.to_string(),
                    reference: "PO-FIXTURE".into(),
                    lines: vec![StockLine::new(product_id, quantity)],
                    note: None,
                },
            )
            .await
            .expect("stock");
    }

    /// On-hand quantity, zero when the row does not exist.
    pub async fn quantity(&self, branch_id: &str, product_id: &str) -> i64 {
        self.office
            .inventory()
            .stock_level(&StockKey::new(product_id, None, branch_id))
            .await
            .expect("stock level")
            .quantity()
    }
}
