use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use super::{first_row, only_row};
use crate::db_types::{Listing, ListingId, ListingStatus, NewListing, TimerStatus};

pub async fn insert_listing(
    id: ListingId,
    listing: NewListing,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Listing, sqlx::Error> {
    let listing: Listing = sqlx::query_as(
        r#"
            INSERT INTO listings
                (id, seller_id, title, description, price, category, location_label, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(listing.seller_id)
    .bind(listing.title)
    .bind(listing.description)
    .bind(listing.price)
    .bind(listing.category)
    .bind(listing.location_label)
    .bind(ListingStatus::Active)
    .bind(created_at)
    .fetch_all(conn)
    .await
    .and_then(only_row)?;
    debug!("🗃️ Listing {} created for {} by {}", listing.id, listing.price, listing.seller_id);
    Ok(listing)
}

pub async fn fetch_listing(id: &ListingId, conn: &mut SqliteConnection) -> Result<Option<Listing>, sqlx::Error> {
    let listing = sqlx::query_as("SELECT * FROM listings WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(listing)
}

/// Moves the listing from `from` to `to`. Returns `None` if the listing was not in `from` (or does not exist).
pub async fn update_status(
    id: &ListingId,
    from: ListingStatus,
    to: ListingStatus,
    updated_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Listing>, sqlx::Error> {
    let listing = sqlx::query_as(
        "UPDATE listings SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(to)
    .bind(updated_at)
    .bind(id.as_str())
    .bind(from)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(listing)
}

/// Active listings with bids whose most recent auction timer has expired. These are auctions that ended but were never
/// turned into a sale.
pub async fn fetch_unsettled_auctions(conn: &mut SqliteConnection) -> Result<Vec<ListingId>, sqlx::Error> {
    let ids = sqlx::query_scalar(
        r#"
            SELECT l.id FROM listings l
            WHERE l.status = $1
              AND EXISTS (SELECT 1 FROM bids b WHERE b.listing_id = l.id)
              AND (
                SELECT t.status FROM auction_timers t
                WHERE t.listing_id = l.id
                ORDER BY t.started_at DESC, t.rowid DESC
                LIMIT 1
              ) = $2
            ORDER BY l.created_at ASC;
        "#,
    )
    .bind(ListingStatus::Active)
    .bind(TimerStatus::Expired)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}
