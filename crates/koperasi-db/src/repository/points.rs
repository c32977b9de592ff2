//! # Point Repository
//!
//! Persists the member point ledger computed by `koperasi_core::points`.
//!
//! ## Ledger Chaining
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  point_transactions (append-only)              members.points_balance  │
//! │                                                                         │
//! │  EARN     +12   before 50  after 62   ─────────►  62                   │
//! │  REDEEM   -20   before 62  after 42   ─────────►  42                   │
//! │  EXPIRED  -12   before 42  after 30   ─────────►  30                   │
//! │                                                                         │
//! │  UPDATE members SET points_balance = after                             │
//! │   WHERE id = ? AND points_balance = before   ── 0 rows ──► Conflict    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use koperasi_core::points::{adjust_points, expire_points, redeem_points};
use koperasi_core::{PointTransaction, Session};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::member::{load_active_member, load_member};
use crate::repository::{begin, commit};

const POINT_COLUMNS: &str = "id, member_id, tx_type, points, points_before, points_after, \
     expires_at, sale_id, lot_id, notes, created_at";

#[derive(Debug, Clone)]
pub struct PointRepository {
    pool: SqlitePool,
}

impl PointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PointRepository { pool }
    }

    /// Spends points from an active member's balance.
    pub async fn redeem(
        &self,
        session: &Session,
        member_id: &str,
        points: i64,
    ) -> DbResult<PointTransaction> {
        let mut tx = begin(&self.pool).await?;

        let member = load_active_member(&mut tx, member_id).await?;
        let entry = redeem_points(&member, points, Utc::now())?;
        append(&mut tx, &entry).await?;

        commit(tx).await?;

        info!(member = %member_id, points, user = %session.user_id, "Points redeemed");
        Ok(entry)
    }

    /// Manual correction by staff.
    pub async fn adjust(
        &self,
        session: &Session,
        member_id: &str,
        delta: i64,
        notes: Option<String>,
    ) -> DbResult<PointTransaction> {
        let mut tx = begin(&self.pool).await?;

        let member = load_member(&mut tx, member_id).await?;
        let entry = adjust_points(&member, delta, notes, Utc::now())?;
        append(&mut tx, &entry).await?;

        commit(tx).await?;

        info!(member = %member_id, delta, user = %session.user_id, "Points adjusted");
        Ok(entry)
    }

    /// Retires every lot of one member that lapsed before `as_of`.
    ///
    /// Running it again for the same `as_of` writes nothing.
    pub async fn expire(&self, member_id: &str, as_of: DateTime<Utc>) -> DbResult<Vec<PointTransaction>> {
        let mut tx = begin(&self.pool).await?;

        let member = load_member(&mut tx, member_id).await?;
        let history = history(&mut tx, member_id).await?;
        let expired = expire_points(&member, &history, as_of);

        for entry in &expired {
            append(&mut tx, entry).await?;
        }

        commit(tx).await?;

        if !expired.is_empty() {
            let points: i64 = expired.iter().map(|e| -e.points).sum();
            info!(member = %member_id, lots = expired.len(), points, "Points expired");
        }
        Ok(expired)
    }

    /// Runs [`expire`](Self::expire) for every member holding points.
    ///
    /// Each member is its own transaction; a member that fails is logged and
    /// skipped so one bad ledger does not block the rest.
    pub async fn sweep_expired(&self, as_of: DateTime<Utc>) -> DbResult<usize> {
        let members: Vec<String> =
            sqlx::query_scalar("SELECT id FROM members WHERE points_balance > 0 ORDER BY member_number")
                .fetch_all(&self.pool)
                .await?;

        debug!(count = members.len(), "Sweeping point expiry");

        let mut written = 0;
        for member_id in members {
            match self.expire(&member_id, as_of).await {
                Ok(entries) => written += entries.len(),
                Err(err) => warn!(member = %member_id, error = %err, "Point expiry failed"),
            }
        }

        Ok(written)
    }

    /// A member's ledger in the order it was written.
    pub async fn history(&self, member_id: &str) -> DbResult<Vec<PointTransaction>> {
        let mut conn = self.pool.acquire().await?;
        history(&mut conn, member_id).await
    }
}

pub(crate) async fn history(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> DbResult<Vec<PointTransaction>> {
    let sql = format!(
        "SELECT {POINT_COLUMNS} FROM point_transactions WHERE member_id = ?1 ORDER BY rowid"
    );
    Ok(sqlx::query_as::<_, PointTransaction>(&sql)
        .bind(member_id)
        .fetch_all(&mut *conn)
        .await?)
}

/// The EARN entry written by a sale, if any.
pub(crate) async fn earned_by_sale(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> DbResult<Option<PointTransaction>> {
    let sql = format!(
        "SELECT {POINT_COLUMNS} FROM point_transactions WHERE sale_id = ?1 AND tx_type = 'EARN'"
    );
    Ok(sqlx::query_as::<_, PointTransaction>(&sql)
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Appends an entry and moves the member's balance from `points_before` to
/// `points_after`.
pub(crate) async fn append(conn: &mut SqliteConnection, entry: &PointTransaction) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE members SET points_balance = ?1 WHERE id = ?2 AND points_balance = ?3",
    )
    .bind(entry.points_after)
    .bind(&entry.member_id)
    .bind(entry.points_before)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Member", &entry.member_id));
    }

    sqlx::query(
        r#"
        INSERT INTO point_transactions (
            id, member_id, tx_type, points, points_before, points_after,
            expires_at, sale_id, lot_id, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.member_id)
    .bind(entry.tx_type)
    .bind(entry.points)
    .bind(entry.points_before)
    .bind(entry.points_after)
    .bind(entry.expires_at)
    .bind(&entry.sale_id)
    .bind(&entry.lot_id)
    .bind(&entry.notes)
    .bind(entry.created_at)
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
    use crate::repository::fixtures::{database, kasir, member};
    use chrono::Duration;
    use koperasi_core::{CoreError, PointTxType};

    #[tokio::test]
    async fn test_redeem_and_history_chain() {
        let db = database().await;
        let siti = member(&db, "KOP-0001", 50).await;

        let entry = db.points().redeem(&kasir(), &siti.id, 20).await.unwrap();
        assert_eq!(entry.points_before, 50);
        assert_eq!(entry.points_after, 30);

        let err = db.points().redeem(&kasir(), &siti.id, 31).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientPoints { available: 30, requested: 31 })));

        let history = db.points().history(&siti.id).await.unwrap();
        assert_eq!(history.len(), 2);
        for pair in history.windows(2) {
            assert_eq!(pair[0].points_after, pair[1].points_before);
        }
        assert_eq!(db.members().get_by_id(&siti.id).await.unwrap().points_balance, 30);
    }

    #[tokio::test]
    async fn test_adjust_never_below_zero() {
        let db = database().await;
        let budi = member(&db, "KOP-0002", 5).await;

        assert!(db.points().adjust(&kasir(), &budi.id, -6, None).await.is_err());
        assert!(db.points().adjust(&kasir(), &budi.id, 0, None).await.is_err());

        let entry = db.points().adjust(&kasir(), &budi.id, -5, Some("Koreksi".into())).await.unwrap();
        assert_eq!(entry.points_after, 0);
        assert_eq!(entry.tx_type, PointTxType::Adjustment);
    }

    #[tokio::test]
    async fn test_expiry_is_idempotent() {
        let db = database().await;
        let siti = member(&db, "KOP-0003", 0).await;

        // an EARN lot that lapsed yesterday
        let now = Utc::now();
        let mut lot = koperasi_core::points::adjust_points(&siti, 40, None, now - Duration::days(400)).unwrap();
        lot.tx_type = PointTxType::Earn;
        lot.expires_at = Some(now - Duration::days(1));
        let mut conn = db.pool().acquire().await.unwrap();
        append(&mut conn, &lot).await.unwrap();
        drop(conn);

        let expired = db.points().expire(&siti.id, now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].points, -40);
        assert_eq!(expired[0].lot_id.as_deref(), Some(lot.id.as_str()));

        assert!(db.points().expire(&siti.id, now).await.unwrap().is_empty());
        assert_eq!(db.points().sweep_expired(now).await.unwrap(), 0);
        assert_eq!(db.members().get_by_id(&siti.id).await.unwrap().points_balance, 0);
    }

    #[tokio::test]
    async fn test_point_ledger_is_append_only() {
        let db = database().await;
        let siti = member(&db, "KOP-0004", 10).await;

        let result = sqlx::query("DELETE FROM point_transactions WHERE member_id = ?1")
            .bind(&siti.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
