//! # Product Repository
//!
//! Database operations for the product directory.
//!
//! ## Stock Is Not Edited Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Who Writes products.stock?                          │
//! │                                                                         │
//! │  ProductRepository::update_details ──► name, prices, min_stock, ...    │
//! │                                        (stock and version untouched)   │
//! │                                                                         │
//! │  StockRepository::apply_movement  ─┐                                   │
//! │  SaleRepository::checkout          ├─► stock::apply_plan ──► stock,    │
//! │  PurchaseRepository::create        │                        version+1, │
//! │  Adjustment / Return approvals    ─┘                        ledger row │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A product is inserted with zero stock; opening stock enters through a
//! purchase or an adjustment so the ledger always explains the number.

use chrono::Utc;
use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::validation::{validate_name, validate_price, validate_sku};
use koperasi_core::{CoreError, Money, Product, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::unique_as;

const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, category_id, unit, \
     purchase_price, selling_price, stock, min_stock, is_active, version, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.search("beras", 20).await?;
/// let product = repo.get_by_sku("BRS-5KG").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    ///
    /// ## Errors
    /// - `Validation` for a bad SKU, name or price, or non-zero stock
    /// - `UniqueViolation` when the SKU or barcode is taken
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_sku(&product.sku)?;
        validate_name("name", &product.name)?;
        validate_price("purchase_price", product.purchase_price)?;
        validate_price("selling_price", product.selling_price)?;

        if product.stock != 0 {
            return Err(ValidationError::InvalidFormat {
                field: "stock".to_string(),
                reason: "opening stock enters through a stock movement".to_string(),
            }
            .into());
        }

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, category_id, unit,
                purchase_price, selling_price, stock, min_stock,
                is_active, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, 0, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.category_id)
        .bind(&product.unit)
        .bind(product.purchase_price)
        .bind(product.selling_price)
        .bind(product.min_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as(e, "sku", &product.sku))?;

        info!(id = %product.id, sku = %product.sku, "Product created");
        self.get_by_id(&product.id).await
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id).await
    }

    /// Gets a product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", sku))
    }

    /// Searches active products by SKU, barcode or name.
    ///
    /// An empty query lists active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = format!("%{}%", query);
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND (sku LIKE ?1 OR name LIKE ?1 OR barcode = ?2) \
             ORDER BY name LIMIT ?3"
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(&pattern)
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Lists all products, one page at a time.
    pub async fn list(&self, page: PageRequest) -> DbResult<ApiResponse<Vec<Product>>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku LIMIT ?1 OFFSET ?2");
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(ApiResponse::page(products, page, total))
    }

    /// Active products at or below their minimum stock.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND stock <= min_stock ORDER BY stock, sku"
        );
        Ok(sqlx::query_as::<_, Product>(&sql).fetch_all(&self.pool).await?)
    }

    /// Updates descriptive fields and prices.
    ///
    /// `stock` and `version` on the passed product are ignored.
    pub async fn update_details(&self, product: &Product) -> DbResult<Product> {
        validate_name("name", &product.name)?;
        validate_price("purchase_price", product.purchase_price)?;
        validate_price("selling_price", product.selling_price)?;
        if product.min_stock < 0 {
            return Err(ValidationError::non_negative("min_stock").into());
        }

        let result = sqlx::query(
            r#"
            UPDATE products SET
                barcode = ?1, name = ?2, category_id = ?3, unit = ?4,
                purchase_price = ?5, selling_price = ?6, min_stock = ?7,
                is_active = ?8, updated_at = ?9
            WHERE id = ?10
            "#,
        )
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.category_id)
        .bind(&product.unit)
        .bind(product.purchase_price)
        .bind(product.selling_price)
        .bind(product.min_stock)
        .bind(product.is_active)
        .bind(Utc::now())
        .bind(&product.id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as(e, "barcode", product.barcode.as_deref().unwrap_or_default()))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        debug!(id = %product.id, "Product details updated");
        self.get_by_id(&product.id).await
    }
}

/// Reads a product on the caller's connection (usually an open transaction).
pub(crate) async fn load_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

/// Loads a product a commit is about to move. Missing and inactive
/// products are both `ProductNotFound`.
pub(crate) async fn load_active_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    match load_product(conn, id).await {
        Ok(product) if product.is_active => Ok(product),
        Ok(_) | Err(DbError::NotFound { .. }) => Err(CoreError::ProductNotFound(id.to_string()).into()),
        Err(err) => Err(err),
    }
}

/// Records the prices of a received purchase line. Not a stock write.
pub(crate) async fn update_prices(
    conn: &mut SqliteConnection,
    id: &str,
    purchase_price: Money,
    selling_price: Option<Money>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE products SET purchase_price = ?1, selling_price = COALESCE(?2, selling_price), \
         updated_at = ?3 WHERE id = ?4",
    )
    .bind(purchase_price)
    .bind(selling_price)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{database, rp, stocked_product};

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = database().await;
        let product = db
            .products()
            .insert(&Product::new("GUL-1KG", "Gula Pasir 1kg", rp(14_000), rp(16_000)))
            .await
            .unwrap();

        assert_eq!(product.stock, 0);
        assert_eq!(product.version, 0);
        assert_eq!(db.products().get_by_sku("GUL-1KG").await.unwrap().id, product.id);
        assert!(matches!(
            db.products().get_by_id("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = database().await;
        let product = Product::new("GUL-1KG", "Gula Pasir 1kg", rp(14_000), rp(16_000));
        db.products().insert(&product).await.unwrap();

        let again = Product::new("GUL-1KG", "Gula Lain", rp(1), rp(2));
        let err = db.products().insert(&again).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "sku"));
    }

    #[tokio::test]
    async fn test_insert_rejects_opening_stock() {
        let db = database().await;
        let mut product = Product::new("GUL-1KG", "Gula Pasir 1kg", rp(14_000), rp(16_000));
        product.stock = 10;

        let err = db.products().insert(&product).await.unwrap_err();
        assert_eq!(err.kind(), koperasi_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_details_never_writes_stock() {
        let db = database().await;
        let mut product = stocked_product(&db, "TLR-10", 25_000, 12).await;
        let version = product.version;

        product.name = "Telur Ayam 10 butir".to_string();
        product.selling_price = rp(26_000);
        product.stock = 999;
        product.min_stock = 5;

        let updated = db.products().update_details(&product).await.unwrap();
        assert_eq!(updated.name, "Telur Ayam 10 butir");
        assert_eq!(updated.selling_price, rp(26_000));
        assert_eq!(updated.stock, 12);
        assert_eq!(updated.version, version);
    }

    #[tokio::test]
    async fn test_search_list_and_low_stock() {
        let db = database().await;
        stocked_product(&db, "BRS-5KG", 65_000, 20).await;
        let minyak = stocked_product(&db, "MYK-2L", 34_000, 2).await;

        let mut with_min = minyak.clone();
        with_min.min_stock = 5;
        db.products().update_details(&with_min).await.unwrap();

        let found = db.products().search("myk", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sku, "MYK-2L");

        let page = db.products().list(PageRequest::new(1, 1)).await.unwrap();
        assert_eq!(page.data.len(), 1);
        let pagination = page.pagination.unwrap();
        assert_eq!(pagination.total, 2);
        assert_eq!(pagination.total_pages, 2);

        let low = db.products().low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, minyak.id);
    }
}
