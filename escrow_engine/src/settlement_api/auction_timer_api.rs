use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{AuctionTimer, ListingId, ListingStatus, TimerId},
    events::{AuctionEndedEvent, EventProducers},
    helpers::{Clock, SystemClock},
    traits::{AuctionTimerStore, MarketplaceDatabase, SettlementError},
};

/// `AuctionTimerApi` runs bidding countdowns.
///
/// Nothing is held in memory. Each timer persists its absolute end time, and every question ("how long is left?", "is
/// it over?") is answered by comparing that end time with the clock. Restarting the process therefore loses nothing:
/// a timer that ended while the process was down is simply due the next time anyone looks.
///
/// Expiry is a compare-and-swap on the timer's status, so however many pollers race on the same timer, exactly one of
/// them wins and publishes [`AuctionEndedEvent`].
pub struct AuctionTimerApi<B> {
    db: B,
    clock: Arc<dyn Clock>,
    producers: EventProducers,
}

impl<B> Debug for AuctionTimerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuctionTimerApi")
    }
}

impl<B: Clone> Clone for AuctionTimerApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), clock: Arc::clone(&self.clock), producers: self.producers.clone() }
    }
}

impl<B> AuctionTimerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, clock: Arc::new(SystemClock), producers }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl<B> AuctionTimerApi<B>
where B: AuctionTimerStore + MarketplaceDatabase
{
    /// Starts a countdown of `duration` for an active listing. Any countdown already running for the listing is
    /// cancelled in the same database transaction.
    pub async fn start_timer(
        &self,
        listing_id: &ListingId,
        duration: Duration,
    ) -> Result<AuctionTimer, SettlementError> {
        if duration <= Duration::zero() {
            return Err(SettlementError::validation("duration", "must be positive"));
        }
        let listing = self
            .db
            .fetch_listing(listing_id)
            .await?
            .ok_or_else(|| SettlementError::ListingNotFound(listing_id.clone()))?;
        if listing.status != ListingStatus::Active {
            return Err(SettlementError::ListingNotActive(listing_id.clone(), listing.status));
        }
        let started_at = self.now();
        let ends_at = started_at
            .checked_add_signed(duration)
            .ok_or_else(|| SettlementError::validation("duration", "ends beyond the supported date range"))?;
        let (timer, replaced) = self.db.start_timer(TimerId::generate(), listing_id, started_at, ends_at).await?;
        if let Some(old) = replaced {
            info!("⏱️ Auction for {listing_id} restarted. Timer {} was cancelled.", old.id);
        }
        info!("⏱️ Auction for {listing_id} runs until {ends_at}");
        Ok(timer)
    }

    /// Time remaining on the listing's countdown. Zero if there is no running countdown. Never fails: storage errors
    /// are logged and reported as zero.
    pub async fn time_left(&self, listing_id: &ListingId) -> Duration {
        match self.db.fetch_active_timer(listing_id).await {
            Ok(Some(timer)) => timer.time_left(self.now()),
            Ok(None) => Duration::zero(),
            Err(e) => {
                error!("⏱️ Could not read the timer for {listing_id}. {e}");
                Duration::zero()
            },
        }
    }

    /// Whether the listing has a countdown that has not reached its end time. Never fails.
    pub async fn is_active(&self, listing_id: &ListingId) -> bool {
        match self.db.fetch_active_timer(listing_id).await {
            Ok(Some(timer)) => timer.is_running(self.now()),
            Ok(None) => false,
            Err(e) => {
                error!("⏱️ Could not read the timer for {listing_id}. {e}");
                false
            },
        }
    }

    /// Cancels the listing's countdown. Returns `false` if there was nothing to cancel.
    pub async fn cancel_timer(&self, listing_id: &ListingId) -> Result<bool, SettlementError> {
        let cancelled = self.db.cancel_active_timer(listing_id, self.now()).await?;
        match cancelled {
            Some(timer) => {
                info!("⏱️ Timer {} for {listing_id} cancelled", timer.id);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Expires every countdown whose end time has passed. Only the timers this call actually expired are returned, and
    /// an [`AuctionEndedEvent`] is published for each of them.
    pub async fn expire_due(&self) -> Result<Vec<AuctionTimer>, SettlementError> {
        let now = self.now();
        let due = self.db.fetch_active_timers().await?.into_iter().filter(|t| t.is_due(now));
        let mut expired = Vec::new();
        for timer in due {
            if let Some(timer) = self.expire(&timer.id, now).await? {
                expired.push(timer);
            }
        }
        if !expired.is_empty() {
            debug!("⏱️ {} auction(s) ended", expired.len());
        }
        Ok(expired)
    }

    /// The single-listing version of [`Self::expire_due`]. This is the entry point for an external scheduler that
    /// wakes up for one specific timer; the built-in auction worker polls with [`Self::expire_due`] instead. Both paths
    /// agree for the same instant, and whichever runs first publishes the [`AuctionEndedEvent`].
    pub async fn expire_if_due(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError> {
        let now = self.now();
        match self.db.fetch_active_timer(listing_id).await? {
            Some(timer) if timer.is_due(now) => self.expire(&timer.id, now).await,
            _ => Ok(None),
        }
    }

    async fn expire(&self, id: &TimerId, now: DateTime<Utc>) -> Result<Option<AuctionTimer>, SettlementError> {
        let expired = self.db.expire_timer(id, now).await?;
        match &expired {
            Some(timer) => {
                info!("⏱️ Auction for {} has ended", timer.listing_id);
                self.producers.publish_auction_ended(AuctionEndedEvent::new(timer.clone())).await;
            },
            None => trace!("⏱️ Timer {id} was already closed by someone else"),
        }
        Ok(expired)
    }

    /// The earliest end time among running countdowns.
    pub async fn next_wake(&self) -> Result<Option<DateTime<Utc>>, SettlementError> {
        let timers = self.db.fetch_active_timers().await?;
        Ok(timers.iter().map(|t| t.ends_at).min())
    }

    /// The listing's most recent countdown, whatever its status.
    pub async fn timer(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError> {
        self.db.fetch_latest_timer(listing_id).await
    }
}
