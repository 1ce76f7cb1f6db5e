use chrono::Utc;
use fsp_common::Cents;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewProject, Project},
    traits::SettlementError,
};

pub async fn insert_project(project: NewProject, conn: &mut SqliteConnection) -> Result<Project, SettlementError> {
    let now = Utc::now();
    let project = sqlx::query_as(
        r#"
            INSERT INTO projects (title, funding_goal, funding_deadline, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'Draft', $4, $4)
            RETURNING *;
        "#,
    )
    .bind(project.title)
    .bind(project.funding_goal.value())
    .bind(project.funding_deadline)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(project)
}

pub async fn fetch_project(id: i64, conn: &mut SqliteConnection) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM projects WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Moves a `Draft` project to `Published`. The status guard is in the WHERE clause so a concurrent
/// write cannot sneak a second transition in.
pub async fn publish_project(id: i64, conn: &mut SqliteConnection) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE projects SET status = 'Published', updated_at = $2
            WHERE id = $1 AND status = 'Draft'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

/// Marks a fundable project as `Funded`. Returns `None` if the project is not in a fundable
/// status anymore (including: it was already marked `Funded` by a concurrent confirmation).
pub async fn mark_funded(id: i64, conn: &mut SqliteConnection) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE projects SET status = 'Funded', updated_at = $2
            WHERE id = $1 AND status IN ('Published', 'Approved')
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

/// Reverts a `Funded` project to `Published`. Only possible while escrow has not been released.
pub async fn revert_funded(id: i64, conn: &mut SqliteConnection) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE projects SET status = 'Published', updated_at = $2
            WHERE id = $1 AND status = 'Funded' AND escrow_released_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}

/// Completes a `Funded` project, recording the net escrow amount and the release timestamp in the
/// same write that flips the status.
pub async fn complete_with_escrow(
    id: i64,
    escrow_amount: Cents,
    conn: &mut SqliteConnection,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE projects SET status = 'Completed', escrow_amount = $2, escrow_released_at = $3, updated_at = $3
            WHERE id = $1 AND status = 'Funded' AND escrow_released_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(escrow_amount.value())
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
}
