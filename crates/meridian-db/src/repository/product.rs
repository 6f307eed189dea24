//! # Product Repository
//!
//! The catalog the ledger counts. Pricing reads `price_cents` from here at
//! sale time; the sale line then keeps its own copy.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::Product;

const PRODUCT_COLUMNS: &str =
    "id, sku, name, category_id, price_cents, is_active, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug)]
pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    pub async fn insert(&mut self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, category_id, price_cents, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category_id)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(product)
    }

    pub async fn get_by_sku(&mut self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE sku = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(product)
    }

    /// Lists products, optionally filtered by a case-insensitive name/SKU fragment.
    pub async fn list(&mut self, search: Option<&str>, limit: u32) -> DbResult<Vec<Product>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE ?1 IS NULL OR lower(name) LIKE ?1 OR lower(sku) LIKE ?1
            ORDER BY name
            LIMIT ?2
            "#,
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await?;

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    pub async fn update_price(
        &mut self,
        id: &str,
        price_cents: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price_cents)
            .bind(at)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active(&mut self, id: &str, active: bool, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(at)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, Repositories};
    use chrono::Utc;
    use meridian_core::Product;

    fn product(id: &str, sku: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            category_id: Some("cat-shoes".to_string()),
            price_cents: 4_999,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();

        uow.products()
            .insert(&product("p-1", "RUN-42", "Trail Runner"))
            .await
            .unwrap();
        uow.products()
            .insert(&product("p-2", "SND-40", "Beach Sandal"))
            .await
            .unwrap();

        let found = uow.products().list(Some("trail"), 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sku, "RUN-42");

        let all = uow.products().list(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_sku = uow.products().get_by_sku("SND-40").await.unwrap().unwrap();
        assert_eq!(by_sku.id, "p-2");
        assert_eq!(by_sku.category_id.as_deref(), Some("cat-shoes"));
    }

    #[tokio::test]
    async fn test_update_price() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();

        uow.products()
            .insert(&product("p-1", "RUN-42", "Trail Runner"))
            .await
            .unwrap();
        assert!(uow
            .products()
            .update_price("p-1", 3_500, Utc::now())
            .await
            .unwrap());
        let p = uow.products().get("p-1").await.unwrap().unwrap();
        assert_eq!(p.price_cents, 3_500);

        assert!(!uow
            .products()
            .update_price("missing", 1, Utc::now())
            .await
            .unwrap());
    }
}
