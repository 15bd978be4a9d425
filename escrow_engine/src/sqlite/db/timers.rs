use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use super::{first_row, only_row};
use crate::db_types::{AuctionTimer, ListingId, TimerId, TimerStatus};

pub async fn insert_timer(
    id: TimerId,
    listing_id: &ListingId,
    started_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<AuctionTimer, sqlx::Error> {
    let timer: AuctionTimer = sqlx::query_as(
        r#"
            INSERT INTO auction_timers (id, listing_id, started_at, ends_at, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(listing_id.as_str())
    .bind(started_at)
    .bind(ends_at)
    .bind(TimerStatus::Active)
    .fetch_all(conn)
    .await
    .and_then(only_row)?;
    trace!("🗃️ Timer {} inserted for listing {listing_id}, ending at {}", timer.id, timer.ends_at);
    Ok(timer)
}

/// Deactivates the active timer for the listing, if there is one.
pub async fn close_active_timer(
    listing_id: &ListingId,
    status: TimerStatus,
    closed_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<AuctionTimer>, sqlx::Error> {
    let timer = sqlx::query_as(
        "UPDATE auction_timers SET status = $1, closed_at = $2 WHERE listing_id = $3 AND status = $4 RETURNING *",
    )
    .bind(status)
    .bind(closed_at)
    .bind(listing_id.as_str())
    .bind(TimerStatus::Active)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(timer)
}

/// `active → expired` for a single timer. Returns `None` if the timer was not active.
pub async fn expire_timer(
    id: &TimerId,
    expired_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<AuctionTimer>, sqlx::Error> {
    let timer = sqlx::query_as(
        "UPDATE auction_timers SET status = $1, closed_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(TimerStatus::Expired)
    .bind(expired_at)
    .bind(id.as_str())
    .bind(TimerStatus::Active)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(timer)
}

pub async fn fetch_active_timer(
    listing_id: &ListingId,
    conn: &mut SqliteConnection,
) -> Result<Option<AuctionTimer>, sqlx::Error> {
    let timer = sqlx::query_as("SELECT * FROM auction_timers WHERE listing_id = $1 AND status = $2")
        .bind(listing_id.as_str())
        .bind(TimerStatus::Active)
        .fetch_optional(conn)
        .await?;
    Ok(timer)
}

pub async fn fetch_latest_timer(
    listing_id: &ListingId,
    conn: &mut SqliteConnection,
) -> Result<Option<AuctionTimer>, sqlx::Error> {
    let timer = sqlx::query_as(
        "SELECT * FROM auction_timers WHERE listing_id = $1 ORDER BY started_at DESC, rowid DESC LIMIT 1",
    )
    .bind(listing_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(timer)
}

pub async fn fetch_active_timers(conn: &mut SqliteConnection) -> Result<Vec<AuctionTimer>, sqlx::Error> {
    let timers = sqlx::query_as("SELECT * FROM auction_timers WHERE status = $1 ORDER BY ends_at ASC")
        .bind(TimerStatus::Active)
        .fetch_all(conn)
        .await?;
    Ok(timers)
}
