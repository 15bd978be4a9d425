#![allow(dead_code)]
//! Shared fixtures for the engine integration tests: a throw-away database, a scripted payment processor and a
//! manually driven clock.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
    Mutex,
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use escrow_engine::{
    db_types::{Cents, Listing, LocationSample, NewListing, NewTransaction, Party, Transaction},
    events::EventProducers,
    helpers::{Clock, GeoPoint, ManualClock},
    traits::{PaymentIntent, PaymentIntentStatus, PaymentMetadata, PaymentProcessor, PaymentProcessorError},
    AuctionTimerApi,
    DisputeApi,
    MarketplaceApi,
    SettlementConfig,
    SqliteDatabase,
    TransactionFlowApi,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const BUYER: &str = "buyer-alice";
pub const SELLER: &str = "seller-bob";
pub const POOL_SIZE: u32 = 5;

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/escrow_test_{}.db", dir.display(), rand::random::<u64>())
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A payment processor that answers with whatever the test told it to.
#[derive(Debug)]
pub struct FakeProcessor {
    status: Mutex<PaymentIntentStatus>,
    failure: Mutex<Option<PaymentProcessorError>>,
    intents: AtomicU64,
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self {
            status: Mutex::new(PaymentIntentStatus::Succeeded),
            failure: Mutex::new(None),
            intents: AtomicU64::new(0),
        }
    }
}

impl FakeProcessor {
    pub fn set_status(&self, status: PaymentIntentStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_with(&self, failure: Option<PaymentProcessorError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn intents_created(&self) -> u64 {
        self.intents.load(Ordering::SeqCst)
    }
}

impl PaymentProcessor for FakeProcessor {
    async fn create_payment_intent(
        &self,
        amount: Cents,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, PaymentProcessorError> {
        if let Some(e) = self.failure.lock().unwrap().clone() {
            return Err(e);
        }
        let n = self.intents.fetch_add(1, Ordering::SeqCst);
        trace!("Fake intent #{n} for {amount} {currency} on {}", metadata.transaction_id);
        Ok(PaymentIntent {
            intent_id: format!("pi_{}_{n}", metadata.transaction_id),
            client_secret: format!("pi_{n}_secret"),
        })
    }

    async fn payment_intent_status(&self, _intent_id: &str) -> Result<PaymentIntentStatus, PaymentProcessorError> {
        if let Some(e) = self.failure.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Every API of the engine, wired to one database, one fake processor and one manual clock.
#[derive(Debug)]
pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub clock: ManualClock,
    pub processor: Arc<FakeProcessor>,
    pub flow: TransactionFlowApi<SqliteDatabase, FakeProcessor>,
    pub disputes: DisputeApi<SqliteDatabase>,
    pub timers: AuctionTimerApi<SqliteDatabase>,
    pub market: MarketplaceApi<SqliteDatabase, FakeProcessor>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_config(SettlementConfig::default()).await
    }

    pub async fn with_config(config: SettlementConfig) -> Self {
        Self::with_producers(config, EventProducers::default()).await
    }

    pub async fn with_producers(config: SettlementConfig, producers: EventProducers) -> Self {
        let _ = env_logger::try_init();
        let url = random_db_path();
        let db = SqliteDatabase::create_and_migrate(&url, POOL_SIZE).await.expect("Error creating test database");
        let clock = ManualClock::new(start_time());
        Self::assemble(url, db, clock, config, producers)
    }

    /// Builds a fresh set of APIs over an existing database, as a restarted process would.
    pub fn assemble(
        url: String,
        db: SqliteDatabase,
        clock: ManualClock,
        config: SettlementConfig,
        producers: EventProducers,
    ) -> Self {
        let processor = Arc::new(FakeProcessor::default());
        let shared_clock = Arc::new(clock.clone());
        let flow = TransactionFlowApi::new(db.clone(), Arc::clone(&processor), producers.clone(), config.clone())
            .with_clock(shared_clock.clone());
        let disputes = DisputeApi::new(db.clone(), producers.clone(), &config).with_clock(shared_clock.clone());
        let timers = AuctionTimerApi::new(db.clone(), producers).with_clock(shared_clock);
        let market = MarketplaceApi::new(flow.clone(), timers.clone());
        Self { url, db, clock, processor, flow, disputes, timers, market }
    }

    pub async fn tear_down(self) {
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(&self.url).await {
            warn!("Could not remove test database {}: {e}", self.url);
        }
    }

    pub async fn listing(&self, price: i64) -> Listing {
        let listing = NewListing::new(SELLER, "Road bike", Cents::new(price)).with_category("bikes");
        self.market.create_listing(listing).await.expect("Error creating listing")
    }

    pub async fn pending_transaction(&self, price: i64) -> Transaction {
        let listing = self.listing(price).await;
        let new_tx = NewTransaction::new(listing.id, BUYER, SELLER, Cents::new(price));
        self.flow.create_transaction(new_tx).await.expect("Error creating transaction").transaction
    }

    pub async fn paid_transaction(&self, price: i64) -> Transaction {
        let tx = self.pending_transaction(price).await;
        self.flow.confirm_payment(&tx.id).await.expect("Error confirming payment")
    }

    /// Both parties report fixes `metres_apart` apart (roughly, along a meridian) at the current time.
    pub async fn report_locations(&self, tx: &Transaction, metres_apart: f64) {
        let now = self.clock.now();
        let base = GeoPoint::new(-33.9249, 18.4241).unwrap();
        let other = GeoPoint::new(base.lat + metres_apart / 111_195.0, base.lng).unwrap();
        let buyer = LocationSample::new(base, Some(5.0), now).unwrap();
        let seller = LocationSample::new(other, Some(5.0), now).unwrap();
        self.flow.record_location(&tx.id, Party::Buyer, buyer).await.expect("Error recording buyer location");
        self.flow.record_location(&tx.id, Party::Seller, seller).await.expect("Error recording seller location");
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
