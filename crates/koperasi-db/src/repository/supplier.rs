//! # Supplier Repository

use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::validation::{validate_name, validate_sku};
use koperasi_core::Supplier;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::unique_as;

const SUPPLIER_COLUMNS: &str = "id, code, name, phone, created_at";

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn insert(&self, supplier: &Supplier) -> DbResult<Supplier> {
        validate_sku(&supplier.code)?;
        validate_name("name", &supplier.name)?;

        sqlx::query(
            "INSERT INTO suppliers (id, code, name, phone, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&supplier.id)
        .bind(&supplier.code)
        .bind(&supplier.name)
        .bind(&supplier.phone)
        .bind(supplier.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as(e, "code", &supplier.code))?;

        info!(id = %supplier.id, code = %supplier.code, "Supplier created");
        self.get_by_id(&supplier.id).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Supplier> {
        let mut conn = self.pool.acquire().await?;
        load_supplier(&mut conn, id).await
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Supplier> {
        let sql = format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE code = ?1");
        sqlx::query_as::<_, Supplier>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", code))
    }

    pub async fn list(&self, page: PageRequest) -> DbResult<ApiResponse<Vec<Supplier>>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM suppliers")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers ORDER BY code LIMIT ?1 OFFSET ?2");
        let suppliers = sqlx::query_as::<_, Supplier>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(ApiResponse::page(suppliers, page, total))
    }
}

pub(crate) async fn load_supplier(conn: &mut SqliteConnection, id: &str) -> DbResult<Supplier> {
    let sql = format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = ?1");
    sqlx::query_as::<_, Supplier>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Supplier", id))
}
