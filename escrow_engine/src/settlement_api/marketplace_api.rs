use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Bid, BidId, Cents, Listing, ListingId, ListingStatus, NewListing, NewTransaction},
    settlement_api::{AuctionTimerApi, CreatedTransaction, TransactionFlowApi},
    traits::{
        AuctionTimerStore,
        MarketplaceDatabase,
        NewBid,
        PaymentProcessor,
        SettlementDatabase,
        SettlementError,
    },
};

/// `MarketplaceApi` covers the part of the marketplace that feeds the settlement core: listings, bidding, buy-now and
/// settling ended auctions. Both buy-now and auction settlement end in
/// [`TransactionFlowApi::create_transaction`].
pub struct MarketplaceApi<B, P> {
    db: B,
    flow: TransactionFlowApi<B, P>,
    timers: AuctionTimerApi<B>,
}

impl<B, P> Debug for MarketplaceApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MarketplaceApi")
    }
}

impl<B: Clone, P> Clone for MarketplaceApi<B, P> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), flow: self.flow.clone(), timers: self.timers.clone() }
    }
}

impl<B: Clone, P> MarketplaceApi<B, P> {
    /// The marketplace shares its storage and clock with `flow`.
    pub fn new(flow: TransactionFlowApi<B, P>, timers: AuctionTimerApi<B>) -> Self {
        Self { db: flow.db().clone(), flow, timers }
    }

    pub fn timers(&self) -> &AuctionTimerApi<B> {
        &self.timers
    }
}

impl<B, P> MarketplaceApi<B, P>
where
    B: MarketplaceDatabase + AuctionTimerStore + SettlementDatabase,
    P: PaymentProcessor,
{
    pub async fn create_listing(&self, listing: NewListing) -> Result<Listing, SettlementError> {
        if listing.seller_id.trim().is_empty() {
            return Err(SettlementError::validation("seller_id", "must not be empty"));
        }
        if listing.title.trim().is_empty() {
            return Err(SettlementError::validation("title", "must not be empty"));
        }
        if !listing.price.is_positive() {
            return Err(SettlementError::validation("price", "must be more than zero"));
        }
        let listing = self.db.insert_listing(ListingId::generate(), listing, self.flow.clock().now()).await?;
        info!("🏷️ Listing {} ({}) created at {}", listing.id, listing.title, listing.price);
        Ok(listing)
    }

    pub async fn listing(&self, id: &ListingId) -> Result<Listing, SettlementError> {
        self.db.fetch_listing(id).await?.ok_or_else(|| SettlementError::ListingNotFound(id.clone()))
    }

    /// Withdraws an active listing and stops its auction, if one is running.
    pub async fn remove_listing(&self, id: &ListingId) -> Result<Listing, SettlementError> {
        let now = self.flow.clock().now();
        let listing = self.db.update_listing_status(id, ListingStatus::Active, ListingStatus::Removed, now).await?;
        self.timers.cancel_timer(id).await?;
        info!("🏷️ Listing {id} removed");
        Ok(listing)
    }

    /// Places a bid on a listing with a running auction. The bid must be at least the list price and beat the current
    /// highest bid. Amounts the fee schedule cannot price are refused.
    pub async fn place_bid(
        &self,
        listing_id: &ListingId,
        bidder_id: &str,
        amount: Cents,
    ) -> Result<Bid, SettlementError> {
        if bidder_id.trim().is_empty() {
            return Err(SettlementError::validation("bidder_id", "must not be empty"));
        }
        if !amount.is_positive() {
            return Err(SettlementError::validation("amount", "must be more than zero"));
        }
        // the winning bid becomes the sale price, so it has to be chargeable
        self.flow.config().fees.calculate(amount)?;
        let listing = self.listing(listing_id).await?;
        if listing.status != ListingStatus::Active {
            return Err(SettlementError::ListingNotActive(listing_id.clone(), listing.status));
        }
        if listing.seller_id == bidder_id {
            return Err(SettlementError::validation("bidder_id", "sellers cannot bid on their own listings"));
        }
        if !self.timers.is_active(listing_id).await {
            return Err(SettlementError::AuctionNotRunning(listing_id.clone()));
        }
        let bid = NewBid {
            id: BidId::generate(),
            listing_id: listing_id.clone(),
            bidder_id: bidder_id.to_string(),
            amount,
            created_at: self.flow.clock().now(),
        };
        let bid = self.db.insert_bid(bid).await?;
        debug!("🏷️ {bidder_id} bid {amount} on {listing_id}");
        Ok(bid)
    }

    pub async fn bids(&self, listing_id: &ListingId) -> Result<Vec<Bid>, SettlementError> {
        let _ = self.listing(listing_id).await?;
        self.db.fetch_bids(listing_id).await
    }

    pub async fn highest_bid(&self, listing_id: &ListingId) -> Result<Option<Bid>, SettlementError> {
        self.db.fetch_highest_bid(listing_id).await
    }

    /// Buy-now at the list price. The listing is marked sold, any auction is stopped and a transaction is created for
    /// the buyer.
    pub async fn purchase(
        &self,
        listing_id: &ListingId,
        buyer_id: &str,
    ) -> Result<CreatedTransaction, SettlementError> {
        let listing = self.listing(listing_id).await?;
        if listing.seller_id == buyer_id {
            return Err(SettlementError::validation("buyer_id", "a seller cannot buy their own item"));
        }
        let new_tx = NewTransaction::new(listing_id.clone(), buyer_id, listing.seller_id.as_str(), listing.price);
        let created = self.sell(&listing, new_tx).await?;
        self.timers.cancel_timer(listing_id).await?;
        Ok(created)
    }

    /// Ended auctions that have bids but no sale yet, including those whose earlier settlement attempt failed.
    pub async fn unsettled_auctions(&self) -> Result<Vec<ListingId>, SettlementError> {
        self.db.fetch_unsettled_auctions().await
    }

    /// Settles an auction that has ended. The highest bidder buys the item at their bid. If nobody bid, the listing
    /// stays active and `None` is returned.
    ///
    /// Safe to call repeatedly: a listing that is already sold (or whose auction is still running) gives `None`.
    pub async fn settle_auction(
        &self,
        listing_id: &ListingId,
    ) -> Result<Option<CreatedTransaction>, SettlementError> {
        let listing = self.listing(listing_id).await?;
        if listing.status != ListingStatus::Active {
            trace!("🏷️ Listing {listing_id} is {}. Nothing to settle.", listing.status);
            return Ok(None);
        }
        if self.timers.is_active(listing_id).await {
            trace!("🏷️ The auction for {listing_id} is still running");
            return Ok(None);
        }
        let Some(winner) = self.db.fetch_highest_bid(listing_id).await? else {
            info!("🏷️ The auction for {listing_id} ended without bids. The listing stays open.");
            return Ok(None);
        };
        let bidder = winner.bidder_id.as_str();
        let new_tx = NewTransaction::new(listing_id.clone(), bidder, listing.seller_id.as_str(), winner.amount);
        match self.sell(&listing, new_tx).await {
            Ok(created) => {
                info!("🏷️ Auction for {listing_id} won by {} at {}", winner.bidder_id, winner.amount);
                Ok(Some(created))
            },
            Err(SettlementError::ListingNotActive(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Marks the listing sold and creates the transaction. If the transaction cannot be created, the listing is put
    /// back on sale.
    async fn sell(&self, listing: &Listing, new_tx: NewTransaction) -> Result<CreatedTransaction, SettlementError> {
        let clock = self.flow.clock();
        self.db.update_listing_status(&listing.id, ListingStatus::Active, ListingStatus::Sold, clock.now()).await?;
        match self.flow.create_transaction(new_tx).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!("🏷️ Could not create a transaction for listing {}. Putting it back on sale. {e}", listing.id);
                if let Err(revert) = self
                    .db
                    .update_listing_status(&listing.id, ListingStatus::Sold, ListingStatus::Active, clock.now())
                    .await
                {
                    error!("🏷️ Listing {} could not be put back on sale. {revert}", listing.id);
                }
                Err(e)
            },
        }
    }
}
