use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use escrow_engine::{
    events::EventProducers,
    helpers::SystemClock,
    AuctionTimerApi,
    DisputeApi,
    MarketplaceApi,
    PaymentProcessor,
    SettlementConfig,
    SqliteDatabase,
    TransactionFlowApi,
};
use log::*;

use crate::{
    auction_worker::start_auction_worker,
    config::ServerConfig,
    errors::ServerError,
    integrations::StripeProcessor,
    notifications::start_notifications,
    routes::{
        fee_quote,
        health,
        AuctionStatusRoute,
        CancelAuctionRoute,
        CloseDisputeRoute,
        CompleteTransactionRoute,
        ConfirmCompletionRoute,
        ConfirmPaymentRoute,
        CreateListingRoute,
        DisputeMessagesRoute,
        EscalateDisputeRoute,
        EscrowBackend,
        GetDisputeRoute,
        GetListingRoute,
        GetTransactionRoute,
        ListingBidsRoute,
        OpenDisputeRoute,
        PlaceBidRoute,
        PostDisputeMessageRoute,
        PurchaseRoute,
        RemoveListingRoute,
        ReportLocationRoute,
        ResolveDisputeRoute,
        ReviewDisputeRoute,
        StartAuctionRoute,
        TransactionHistoryRoute,
        VerifyProximityRoute,
    },
};

const MAX_DB_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::create_and_migrate(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let processor = Arc::new(StripeProcessor::new(&config.stripe)?);
    let producers = start_notifications().await;
    if config.auction_worker_enabled {
        let apis = SettlementApis::new(db.clone(), Arc::clone(&processor), producers.clone(), &config.settlement);
        let _worker = start_auction_worker(apis.market, Arc::new(SystemClock), config.auction_poll_interval);
    } else {
        warn!("⏱️ The auction worker is disabled. Auctions will only close when a client asks about them.");
    }
    let srv = create_server_instance(config, db, processor, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    processor: Arc<StripeProcessor>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let settlement = config.settlement.clone();
    let srv = HttpServer::new(move || {
        let apis = SettlementApis::new(db.clone(), Arc::clone(&processor), producers.clone(), &settlement);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("escrow::access_log"))
            .configure(|cfg| apis.register(cfg))
            .configure(configure_routes::<SqliteDatabase, StripeProcessor>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// The settlement APIs, wired to one backend, processor and set of event producers.
pub struct SettlementApis<B, P> {
    pub config: SettlementConfig,
    pub flow: TransactionFlowApi<B, P>,
    pub timers: AuctionTimerApi<B>,
    pub market: MarketplaceApi<B, P>,
    pub disputes: DisputeApi<B>,
}

impl<B: Clone, P> SettlementApis<B, P> {
    pub fn new(db: B, processor: Arc<P>, producers: EventProducers, config: &SettlementConfig) -> Self {
        let flow = TransactionFlowApi::new(db.clone(), processor, producers.clone(), config.clone());
        let timers = AuctionTimerApi::new(db.clone(), producers.clone());
        let market = MarketplaceApi::new(flow.clone(), timers.clone());
        let disputes = DisputeApi::new(db, producers, config);
        Self { config: config.clone(), flow, timers, market, disputes }
    }
}

impl<B: 'static, P: 'static> SettlementApis<B, P> {
    /// Hands each API to actix as application data, where the route handlers will look for it.
    pub fn register(self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.config))
            .app_data(web::Data::new(self.flow))
            .app_data(web::Data::new(self.timers))
            .app_data(web::Data::new(self.market))
            .app_data(web::Data::new(self.disputes));
    }
}

/// Registers every route. Request bodies and queries that cannot be parsed are answered in the same JSON error format
/// as every other failure.
pub fn configure_routes<B, P>(cfg: &mut web::ServiceConfig)
where
    B: EscrowBackend + 'static,
    P: PaymentProcessor + 'static,
{
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _req| ServerError::InvalidQuery(err.to_string()).into()))
    .service(health)
    .service(fee_quote)
    .service(CreateListingRoute::<B, P>::new())
    .service(GetListingRoute::<B, P>::new())
    .service(RemoveListingRoute::<B, P>::new())
    .service(PlaceBidRoute::<B, P>::new())
    .service(ListingBidsRoute::<B, P>::new())
    .service(PurchaseRoute::<B, P>::new())
    .service(StartAuctionRoute::<B>::new())
    .service(AuctionStatusRoute::<B>::new())
    .service(CancelAuctionRoute::<B>::new())
    .service(GetTransactionRoute::<B, P>::new())
    .service(TransactionHistoryRoute::<B, P>::new())
    .service(ConfirmPaymentRoute::<B, P>::new())
    .service(ReportLocationRoute::<B, P>::new())
    .service(VerifyProximityRoute::<B, P>::new())
    .service(ConfirmCompletionRoute::<B, P>::new())
    .service(CompleteTransactionRoute::<B, P>::new())
    .service(OpenDisputeRoute::<B>::new())
    .service(GetDisputeRoute::<B>::new())
    .service(DisputeMessagesRoute::<B>::new())
    .service(PostDisputeMessageRoute::<B>::new())
    .service(ReviewDisputeRoute::<B>::new())
    .service(EscalateDisputeRoute::<B>::new())
    .service(ResolveDisputeRoute::<B>::new())
    .service(CloseDisputeRoute::<B>::new());
}
