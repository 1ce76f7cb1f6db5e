use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

/// Whether the event id has already been claimed.
pub async fn event_seen(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

/// Claims a webhook event id. Returns `true` on first claim, `false` on replay. The UNIQUE
/// constraint on `event_id` makes this an at-most-once gate across concurrent deliveries.
pub async fn record_event(event_id: &str, event_type: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO webhook_events (event_id, event_type, received_at) VALUES ($1, $2, $3)",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    let first_delivery = result.rows_affected() == 1;
    trace!("🗃️🪝️ Webhook event {event_id} recorded (first delivery: {first_delivery})");
    Ok(first_delivery)
}
