//! `SqliteDatabase` is the SQLite backend of the settlement core.
//!
//! It implements every storage trait in [`crate::traits`] by composing the low-level functions in [`super::db`],
//! wrapping them in a database transaction whenever more than one row has to change together.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{bids, db_url, disputes, listings, new_pool, timers, transactions};
use crate::{
    db_types::{
        AuctionTimer,
        Bid,
        Cents,
        Dispute,
        DisputeId,
        DisputeMessage,
        DisputeStatus,
        Listing,
        ListingId,
        ListingStatus,
        LocationSample,
        NewDispute,
        NewListing,
        Party,
        Resolution,
        TimerId,
        TimerStatus,
        Transaction,
        TransactionHistoryEntry,
        TransactionId,
        TransactionRecord,
        TransactionStatus,
    },
    helpers::ProximityResult,
    traits::{
        AuctionTimerStore,
        DisputeManagement,
        DisputeUpdate,
        MarketplaceDatabase,
        NewBid,
        NewDisputeMessage,
        SettlementDatabase,
        SettlementError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `ESCROW_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Opens (creating the file if necessary) the database at `url` and brings its schema up to date.
    pub async fn create_and_migrate(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let db = Self::new_with_url(url, max_connections).await?;
        migrate!("./src/sqlite/migrations").run(db.pool()).await?;
        info!("🗃️ Migrations complete for {url}");
        Ok(db)
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn dispute_transition_error(&self, id: &DisputeId, to: DisputeStatus) -> SettlementError {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return e.into(),
        };
        match disputes::fetch_dispute(id, &mut conn).await {
            Ok(Some(d)) => SettlementError::InvalidDisputeTransition { from: d.status, to },
            Ok(None) => SettlementError::DisputeNotFound(id.clone()),
            Err(e) => e.into(),
        }
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<Transaction, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let transaction = transactions::insert_transaction(record, &mut tx).await?;
        let note = format!("created with payment intent {}", transaction.payment_intent_id);
        transactions::insert_history(
            &transaction.id,
            None,
            TransactionStatus::Pending,
            &note,
            transaction.created_at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(transaction)
    }

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(transaction)
    }

    async fn fetch_transaction_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionHistoryEntry>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let history = transactions::fetch_history(id, &mut conn).await?;
        Ok(history)
    }

    async fn count_paid_transactions_for_seller(&self, seller_id: &str) -> Result<i64, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let count = transactions::count_paid_for_seller(seller_id, &mut conn).await?;
        Ok(count)
    }

    async fn mark_transaction_paid(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
        funds_release_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::mark_paid(id, paid_at, funds_release_at, &mut tx).await? else {
            return Err(transactions::transition_error(id, TransactionStatus::Paid, &mut tx).await);
        };
        let note = format!("payment confirmed. Funds held until {funds_release_at}");
        transactions::insert_history(
            id,
            Some(TransactionStatus::Pending),
            TransactionStatus::Paid,
            &note,
            paid_at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(transaction)
    }

    async fn save_location(
        &self,
        id: &TransactionId,
        party: Party,
        sample: &LocationSample,
        updated_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let updated =
            transactions::save_location(id, party, sample, TransactionStatus::Paid, updated_at, &mut conn).await?;
        match updated {
            Some(transaction) => Ok(transaction),
            None => match transactions::fetch_transaction(id, &mut conn).await? {
                Some(t) => {
                    Err(SettlementError::OperationNotAllowed { status: t.status, operation: "record a location" })
                },
                None => Err(SettlementError::TransactionNotFound(id.clone())),
            },
        }
    }

    async fn record_proximity_check(
        &self,
        id: &TransactionId,
        requested_by: Party,
        result: &ProximityResult,
        checked_at: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::fetch_transaction(id, &mut conn)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(id.clone()))?;
        let note = format!(
            "proximity check by {requested_by}: {:.1} m apart, out of range",
            result.distance_meters
        );
        let status = transaction.status;
        transactions::insert_history(id, Some(status), status, &note, checked_at, &mut conn).await?;
        Ok(())
    }

    async fn mark_transaction_delivered(
        &self,
        id: &TransactionId,
        requested_by: Party,
        result: &ProximityResult,
        verified_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let to = TransactionStatus::DeliveredPendingConfirmation;
        let Some(transaction) = transactions::mark_delivered(id, result, verified_at, &mut tx).await? else {
            return Err(transactions::transition_error(id, to, &mut tx).await);
        };
        let note = format!("proximity verified by {requested_by}: {:.1} m apart", result.distance_meters);
        transactions::insert_history(id, Some(TransactionStatus::Paid), to, &note, verified_at, &mut tx).await?;
        tx.commit().await?;
        Ok(transaction)
    }

    async fn confirm_completion(
        &self,
        id: &TransactionId,
        party: Party,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::set_confirmation(id, party, confirmed_at, &mut tx).await? else {
            return Err(transactions::transition_error(id, TransactionStatus::Completed, &mut tx).await);
        };
        if !transaction.both_confirmed() {
            tx.commit().await?;
            debug!("🗃️ {party} confirmed completion of {id}. Waiting on the other party.");
            return Ok(transaction);
        }
        let completed = transactions::complete_if_confirmed(id, confirmed_at, &mut tx).await?;
        let Some(completed) = completed else {
            return Err(transactions::transition_error(id, TransactionStatus::Completed, &mut tx).await);
        };
        transactions::insert_history(
            id,
            Some(TransactionStatus::DeliveredPendingConfirmation),
            TransactionStatus::Completed,
            "completion confirmed by both parties",
            confirmed_at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(completed)
    }

    async fn complete_transaction(
        &self,
        id: &TransactionId,
        completed_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::complete_if_confirmed(id, completed_at, &mut tx).await? else {
            return Err(transactions::transition_error(id, TransactionStatus::Completed, &mut tx).await);
        };
        transactions::insert_history(
            id,
            Some(TransactionStatus::DeliveredPendingConfirmation),
            TransactionStatus::Completed,
            "completed",
            completed_at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(transaction)
    }
}

impl DisputeManagement for SqliteDatabase {
    async fn open_dispute(
        &self,
        dispute: NewDispute,
        allowed_from: &[TransactionStatus],
    ) -> Result<(Dispute, Transaction), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let tx_id = dispute.transaction_id.clone();
        let at = dispute.created_at;
        let frozen = transactions::mark_disputed(&tx_id, &dispute.id, allowed_from, at, &mut tx).await?;
        let Some(transaction) = frozen else {
            if let Some(open) = disputes::fetch_open_dispute_for_transaction(&tx_id, &mut tx).await? {
                return Err(SettlementError::DisputeAlreadyOpen(tx_id, open.id));
            }
            return Err(transactions::transition_error(&tx_id, TransactionStatus::Disputed, &mut tx).await);
        };
        let dispute = match disputes::insert_dispute(dispute, &mut tx).await {
            Ok(d) => d,
            Err(e) if is_unique_violation(&e) => {
                let open = disputes::fetch_open_dispute_for_transaction(&tx_id, &mut tx).await?;
                let open_id = open.map(|d| d.id).unwrap_or_else(|| DisputeId::from("unknown"));
                return Err(SettlementError::DisputeAlreadyOpen(tx_id, open_id));
            },
            Err(e) => return Err(e.into()),
        };
        let note = format!("dispute {} opened: {}", dispute.id, dispute.reason);
        transactions::insert_history(
            &tx_id,
            transaction.status_before_dispute,
            TransactionStatus::Disputed,
            &note,
            at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok((dispute, transaction))
    }

    async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_dispute(id, &mut conn).await?;
        Ok(dispute)
    }

    async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_open_dispute_for_transaction(id, &mut conn).await?;
        Ok(dispute)
    }

    async fn fetch_disputes_for_transaction(&self, id: &TransactionId) -> Result<Vec<Dispute>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let disputes = disputes::fetch_disputes_for_transaction(id, &mut conn).await?;
        Ok(disputes)
    }

    async fn update_dispute_status(&self, id: &DisputeId, update: DisputeUpdate) -> Result<Dispute, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let updated = disputes::update_status(id, &update, &mut conn).await?;
        drop(conn);
        match updated {
            Some(dispute) => Ok(dispute),
            None => Err(self.dispute_transition_error(id, update.to).await),
        }
    }

    async fn resolve_dispute(
        &self,
        id: &DisputeId,
        resolution: Resolution,
    ) -> Result<(Dispute, Transaction), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(dispute) = disputes::record_resolution(id, &resolution, &mut tx).await? else {
            tx.rollback().await?;
            return Err(self.dispute_transition_error(id, DisputeStatus::Resolved).await);
        };
        let outcome = resolution.decision.outcome();
        let tx_id = dispute.transaction_id.clone();
        let settled = transactions::settle_disputed(&tx_id, outcome, resolution.resolved_at, &mut tx).await?;
        let Some(transaction) = settled else {
            return Err(transactions::transition_error(&tx_id, outcome, &mut tx).await);
        };
        let note = match resolution.refund_amount {
            Some(refund) => format!("dispute {id} resolved ({}), refund of {refund}", resolution.decision),
            None => format!("dispute {id} resolved ({})", resolution.decision),
        };
        transactions::insert_history(
            &tx_id,
            Some(TransactionStatus::Disputed),
            outcome,
            &note,
            resolution.resolved_at,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok((dispute, transaction))
    }

    async fn insert_dispute_message(&self, message: NewDisputeMessage) -> Result<DisputeMessage, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let id = message.dispute_id.clone();
        if let Some(message) = disputes::insert_message(message, &mut conn).await? {
            return Ok(message);
        }
        match disputes::fetch_dispute(&id, &mut conn).await? {
            Some(d) => {
                Err(SettlementError::DisputeOperationNotAllowed { status: d.status, operation: "add a message" })
            },
            None => Err(SettlementError::DisputeNotFound(id)),
        }
    }

    async fn fetch_dispute_messages(&self, id: &DisputeId) -> Result<Vec<DisputeMessage>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let messages = disputes::fetch_messages(id, &mut conn).await?;
        Ok(messages)
    }

    async fn close_dispute(&self, id: &DisputeId, closed_at: DateTime<Utc>) -> Result<Dispute, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let update = DisputeUpdate::new(&[DisputeStatus::Resolved], DisputeStatus::Closed, closed_at);
        if let Some(dispute) = disputes::update_status(id, &update, &mut conn).await? {
            return Ok(dispute);
        }
        match disputes::fetch_dispute(id, &mut conn).await? {
            Some(d) if d.status == DisputeStatus::Closed => Ok(d),
            Some(d) => Err(SettlementError::InvalidDisputeTransition { from: d.status, to: DisputeStatus::Closed }),
            None => Err(SettlementError::DisputeNotFound(id.clone())),
        }
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    async fn insert_listing(
        &self,
        id: ListingId,
        listing: NewListing,
        created_at: DateTime<Utc>,
    ) -> Result<Listing, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let listing = listings::insert_listing(id, listing, created_at, &mut conn).await?;
        Ok(listing)
    }

    async fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let listing = listings::fetch_listing(id, &mut conn).await?;
        Ok(listing)
    }

    async fn update_listing_status(
        &self,
        id: &ListingId,
        from: ListingStatus,
        to: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Listing, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(listing) = listings::update_status(id, from, to, updated_at, &mut conn).await? {
            debug!("🗃️ Listing {id} moved from {from} to {to}");
            return Ok(listing);
        }
        match listings::fetch_listing(id, &mut conn).await? {
            Some(l) => Err(SettlementError::ListingNotActive(id.clone(), l.status)),
            None => Err(SettlementError::ListingNotFound(id.clone())),
        }
    }

    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let listing_id = bid.listing_id.clone();
        let amount = bid.amount;
        if let Some(bid) = bids::insert_bid(bid, &mut conn).await? {
            return Ok(bid);
        }
        let listing = listings::fetch_listing(&listing_id, &mut conn)
            .await?
            .ok_or_else(|| SettlementError::ListingNotFound(listing_id.clone()))?;
        let highest = bids::fetch_highest_bid(&listing_id, &mut conn).await?;
        let minimum = match highest {
            Some(b) => listing.price.max(b.amount.checked_add(Cents::new(1)).unwrap_or(b.amount)),
            None => listing.price,
        };
        Err(SettlementError::BidTooLow { amount, minimum })
    }

    async fn fetch_bids(&self, listing_id: &ListingId) -> Result<Vec<Bid>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let bids = bids::fetch_bids(listing_id, &mut conn).await?;
        Ok(bids)
    }

    async fn fetch_highest_bid(&self, listing_id: &ListingId) -> Result<Option<Bid>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let bid = bids::fetch_highest_bid(listing_id, &mut conn).await?;
        Ok(bid)
    }

    async fn fetch_unsettled_auctions(&self) -> Result<Vec<ListingId>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let ids = listings::fetch_unsettled_auctions(&mut conn).await?;
        Ok(ids)
    }
}

impl AuctionTimerStore for SqliteDatabase {
    async fn start_timer(
        &self,
        id: TimerId,
        listing_id: &ListingId,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<(AuctionTimer, Option<AuctionTimer>), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let replaced = timers::close_active_timer(listing_id, TimerStatus::Cancelled, started_at, &mut tx).await?;
        if let Some(old) = &replaced {
            debug!("🗃️ Timer {} for listing {listing_id} replaced", old.id);
        }
        let timer = timers::insert_timer(id, listing_id, started_at, ends_at, &mut tx).await?;
        tx.commit().await?;
        Ok((timer, replaced))
    }

    async fn fetch_active_timer(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let timer = timers::fetch_active_timer(listing_id, &mut conn).await?;
        Ok(timer)
    }

    async fn fetch_latest_timer(&self, listing_id: &ListingId) -> Result<Option<AuctionTimer>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let timer = timers::fetch_latest_timer(listing_id, &mut conn).await?;
        Ok(timer)
    }

    async fn fetch_active_timers(&self) -> Result<Vec<AuctionTimer>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let timers = timers::fetch_active_timers(&mut conn).await?;
        Ok(timers)
    }

    async fn expire_timer(
        &self,
        id: &TimerId,
        expired_at: DateTime<Utc>,
    ) -> Result<Option<AuctionTimer>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let timer = timers::expire_timer(id, expired_at, &mut conn).await?;
        Ok(timer)
    }

    async fn cancel_active_timer(
        &self,
        listing_id: &ListingId,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<AuctionTimer>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let timer = timers::close_active_timer(listing_id, TimerStatus::Cancelled, cancelled_at, &mut conn).await?;
        Ok(timer)
    }
}
