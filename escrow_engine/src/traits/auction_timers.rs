use chrono::{DateTime, Utc};

use crate::{
    db_types::{AuctionTimer, ListingId, TimerId},
    traits::SettlementError,
};

/// Durable storage for auction timers. Timers persist absolute end times so that they survive restarts.
#[allow(async_fn_in_trait)]
pub trait AuctionTimerStore: Clone {
    /// In one database transaction, cancels any active timer for the listing and inserts a new active one. Returns the
    /// new timer and the one it replaced, if any.
    async fn start_timer(
        &self,
        id: TimerId,
        listing_id: &ListingId,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<(AuctionTimer, Option<AuctionTimer>), SettlementError>;

    async fn fetch_active_timer(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError>;

    /// The most recently started timer for the listing, whatever its status.
    async fn fetch_latest_timer(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError>;

    async fn fetch_active_timers(&self) -> Result<Vec<AuctionTimer>, SettlementError>;

    /// `active → expired`. Returns `None` if the timer was no longer active, i.e. someone else got there first.
    async fn expire_timer(
        &self,
        id: &TimerId,
        expired_at: DateTime<Utc>,
    ) -> Result<Option<AuctionTimer>, SettlementError>;

    /// `active → cancelled` for the listing's active timer. Returns `None` if there was nothing to cancel.
    async fn cancel_active_timer(
        &self,
        listing_id: &ListingId,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<AuctionTimer>, SettlementError>;
}
