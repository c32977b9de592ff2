//! # Member Repository
//!
//! The cooperative's member directory. A member's `points_balance` is owned
//! by the point ledger and is never edited here.

use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::validation::{validate_name, validate_sku};
use koperasi_core::{CoreError, Member, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::unique_as;

const MEMBER_COLUMNS: &str =
    "id, member_number, name, phone, points_balance, is_active, created_at";

#[derive(Debug, Clone)]
pub struct MemberRepository {
    pool: SqlitePool,
}

impl MemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MemberRepository { pool }
    }

    /// Registers a member. Point balances start through the ledger.
    pub async fn insert(&self, member: &Member) -> DbResult<Member> {
        validate_sku(&member.member_number).map_err(|_| ValidationError::InvalidFormat {
            field: "member_number".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        })?;
        validate_name("name", &member.name)?;

        if member.points_balance != 0 {
            return Err(ValidationError::InvalidFormat {
                field: "points_balance".to_string(),
                reason: "points enter through the point ledger".to_string(),
            }
            .into());
        }

        sqlx::query(
            "INSERT INTO members (id, member_number, name, phone, points_balance, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        )
        .bind(&member.id)
        .bind(&member.member_number)
        .bind(&member.name)
        .bind(&member.phone)
        .bind(member.is_active)
        .bind(member.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_as(e, "member_number", &member.member_number))?;

        info!(id = %member.id, number = %member.member_number, "Member registered");
        self.get_by_id(&member.id).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Member> {
        let mut conn = self.pool.acquire().await?;
        load_member(&mut conn, id).await
    }

    pub async fn get_by_number(&self, member_number: &str) -> DbResult<Member> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_number = ?1");
        sqlx::query_as::<_, Member>(&sql)
            .bind(member_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Member", member_number))
    }

    pub async fn list(&self, page: PageRequest) -> DbResult<ApiResponse<Vec<Member>>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY member_number LIMIT ?1 OFFSET ?2"
        );
        let members = sqlx::query_as::<_, Member>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(ApiResponse::page(members, page, total))
    }

    /// Updates name, phone and active flag.
    pub async fn update_details(&self, member: &Member) -> DbResult<Member> {
        validate_name("name", &member.name)?;

        let result = sqlx::query("UPDATE members SET name = ?1, phone = ?2, is_active = ?3 WHERE id = ?4")
            .bind(&member.name)
            .bind(&member.phone)
            .bind(member.is_active)
            .bind(&member.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Member", &member.id));
        }

        debug!(id = %member.id, "Member details updated");
        self.get_by_id(&member.id).await
    }
}

pub(crate) async fn load_member(conn: &mut SqliteConnection, id: &str) -> DbResult<Member> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1");
    sqlx::query_as::<_, Member>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Member", id))
}

/// Loads a member a transaction is about to reference. Missing and inactive
/// members are both `MemberNotFound`.
pub(crate) async fn load_active_member(conn: &mut SqliteConnection, id: &str) -> DbResult<Member> {
    match load_member(conn, id).await {
        Ok(member) if member.is_active => Ok(member),
        Ok(_) | Err(DbError::NotFound { .. }) => Err(CoreError::MemberNotFound(id.to_string()).into()),
        Err(err) => Err(err),
    }
}
