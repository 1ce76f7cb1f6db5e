use chrono::Utc;
use fsp_common::Cents;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Investment, NewInvestment},
    traits::SettlementError,
};

pub async fn insert_investment(
    pledge: NewInvestment,
    external_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Investment, SettlementError> {
    let now = Utc::now();
    let result = sqlx::query_as::<_, Investment>(
        r#"
            INSERT INTO investments (user_id, project_id, amount, payment_method, status, external_ref, metadata,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'Pending', $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(pledge.user_id)
    .bind(pledge.project_id)
    .bind(pledge.amount.value())
    .bind(pledge.payment_method.to_string())
    .bind(external_ref)
    .bind(pledge.metadata)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(investment) => {
            debug!("🗃️ Investment #{} inserted for project #{}", investment.id, investment.project_id);
            Ok(investment)
        },
        Err(e) => Err(map_unique_violation(e, external_ref)),
    }
}

pub async fn fetch_investment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Investment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM investments WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_investment_by_external_ref(
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Investment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM investments WHERE external_ref = $1")
        .bind(external_ref)
        .fetch_optional(conn)
        .await
}

/// Records the gateway session reference on the investment.
pub async fn attach_external_ref(
    id: i64,
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Investment>, SettlementError> {
    let result = sqlx::query_as::<_, Investment>(
        "UPDATE investments SET external_ref = $2, updated_at = $3 WHERE id = $1 RETURNING *;",
    )
    .bind(id)
    .bind(external_ref)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await;
    result.map_err(|e| map_unique_violation(e, Some(external_ref)))
}

/// Confirms a pending investment. The status guard lives in the WHERE clause; `None` means the
/// row was not `Pending` at write time.
pub async fn confirm(
    id: i64,
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Investment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE investments SET status = 'Confirmed', confirmed_at = $3, external_ref = $2, updated_at = $3
            WHERE id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(external_ref)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

pub async fn cancel(id: i64, reason: &str, conn: &mut SqliteConnection) -> Result<Option<Investment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE investments SET status = 'Cancelled', failure_reason = $2, updated_at = $3
            WHERE id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(reason)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

pub async fn refund(id: i64, conn: &mut SqliteConnection) -> Result<Option<Investment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE investments SET status = 'Refunded', refunded_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'Confirmed'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

pub async fn confirmed_for_project(
    project_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Investment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM investments WHERE project_id = $1 AND status = 'Confirmed' ORDER BY created_at, id")
        .bind(project_id)
        .fetch_all(conn)
        .await
}

/// Confirmed investments whose escrow has not been released yet, in creation order.
pub async fn confirmed_unreleased(
    project_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Investment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM investments
            WHERE project_id = $1 AND status = 'Confirmed' AND escrow_released = 0
            ORDER BY created_at, id
        "#,
    )
    .bind(project_id)
    .fetch_all(conn)
    .await
}

/// The recomputed funding total: the sum over confirmed investments, at call time.
pub async fn confirmed_total(project_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM investments WHERE project_id = $1 AND status = 'Confirmed'",
    )
    .bind(project_id)
    .fetch_one(conn)
    .await?;
    Ok(Cents::from(total))
}

/// Flags every confirmed, unreleased investment of the project as released and returns their ids.
pub async fn release_escrow(project_id: i64, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids: Vec<(i64,)> = sqlx::query_as(
        r#"
            UPDATE investments SET escrow_released = 1, escrow_released_at = $2, updated_at = $2
            WHERE project_id = $1 AND status = 'Confirmed' AND escrow_released = 0
            RETURNING id;
        "#,
    )
    .bind(project_id)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}

fn map_unique_violation(e: sqlx::Error, external_ref: Option<&str>) -> SettlementError {
    match &e {
        sqlx::Error::Database(de) if de.is_unique_violation() => {
            SettlementError::DuplicatePledge(external_ref.unwrap_or("<unset>").to_string())
        },
        _ => e.into(),
    }
}
