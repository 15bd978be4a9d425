use chrono::{DateTime, Utc};

use crate::{
    db_types::{Bid, Listing, ListingId, ListingStatus, NewListing},
    traits::{NewBid, SettlementError},
};

/// Storage for listings and the append-only bid log.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone {
    async fn insert_listing(
        &self,
        id: ListingId,
        listing: NewListing,
        created_at: DateTime<Utc>,
    ) -> Result<Listing, SettlementError>;

    async fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, SettlementError>;

    /// Conditional status change. Fails with [`SettlementError::ListingNotActive`] if the listing is not in `from`.
    async fn update_listing_status(
        &self,
        id: &ListingId,
        from: ListingStatus,
        to: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Listing, SettlementError>;

    /// Appends a bid if, at the moment of insertion, it is at least the listing price and strictly above the current
    /// highest bid. Otherwise fails with [`SettlementError::BidTooLow`].
    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, SettlementError>;

    /// All bids for the listing, oldest first.
    async fn fetch_bids(&self, listing_id: &ListingId) -> Result<Vec<Bid>, SettlementError>;

    async fn fetch_highest_bid(&self, listing_id: &ListingId) -> Result<Option<Bid>, SettlementError>;

    /// Active listings whose latest auction timer expired with bids on the table, oldest listing first.
    async fn fetch_unsettled_auctions(&self) -> Result<Vec<ListingId>, SettlementError>;
}
