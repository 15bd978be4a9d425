use log::debug;
use sqlx::SqliteConnection;

use super::first_row;
use crate::{
    db_types::{Bid, ListingId},
    traits::NewBid,
};

/// Inserts the bid only if it is at least the listing price and strictly above every existing bid for the listing.
/// Both conditions are evaluated by the insert statement itself, so two racing bidders cannot both succeed with the
/// same amount. Returns `None` if the bid was refused.
pub async fn insert_bid(bid: NewBid, conn: &mut SqliteConnection) -> Result<Option<Bid>, sqlx::Error> {
    let result: Option<Bid> = sqlx::query_as(
        r#"
            INSERT INTO bids (id, listing_id, bidder_id, amount, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE $4 >= (SELECT price FROM listings WHERE id = $2)
              AND $4 > COALESCE((SELECT MAX(amount) FROM bids WHERE listing_id = $2), 0)
            RETURNING *;
        "#,
    )
    .bind(bid.id)
    .bind(bid.listing_id)
    .bind(bid.bidder_id)
    .bind(bid.amount)
    .bind(bid.created_at)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    if let Some(b) = &result {
        debug!("🗃️ Bid {} of {} recorded on listing {}", b.id, b.amount, b.listing_id);
    }
    Ok(result)
}

pub async fn fetch_bids(listing_id: &ListingId, conn: &mut SqliteConnection) -> Result<Vec<Bid>, sqlx::Error> {
    let bids = sqlx::query_as("SELECT * FROM bids WHERE listing_id = $1 ORDER BY created_at ASC, amount ASC")
        .bind(listing_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(bids)
}

/// The highest bid. Ties cannot occur for accepted bids, but the earliest wins if they ever do.
pub async fn fetch_highest_bid(
    listing_id: &ListingId,
    conn: &mut SqliteConnection,
) -> Result<Option<Bid>, sqlx::Error> {
    let bid = sqlx::query_as("SELECT * FROM bids WHERE listing_id = $1 ORDER BY amount DESC, created_at ASC LIMIT 1")
        .bind(listing_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(bid)
}
