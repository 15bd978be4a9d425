//! Request handler definitions
//!
//! Define each route and its handler here. Handlers only translate between HTTP and the settlement APIs; any rule about
//! money, state or time belongs in `escrow_engine`.
//!
//! | Method | Path                                    | Handler                  |
//! |--------|-----------------------------------------|--------------------------|
//! | GET    | `/health`                               | [`health`]               |
//! | GET    | `/fees?price=`                          | [`fee_quote`]            |
//! | POST   | `/listings`                             | [`create_listing`]       |
//! | GET    | `/listings/{id}`                        | [`get_listing`]          |
//! | DELETE | `/listings/{id}`                        | [`remove_listing`]       |
//! | POST   | `/listings/{id}/auction`                | [`start_auction`]        |
//! | GET    | `/listings/{id}/auction`                | [`auction_status`]       |
//! | DELETE | `/listings/{id}/auction`                | [`cancel_auction`]       |
//! | POST   | `/listings/{id}/bids`                   | [`place_bid`]            |
//! | GET    | `/listings/{id}/bids`                   | [`listing_bids`]         |
//! | POST   | `/listings/{id}/purchase`               | [`purchase`]             |
//! | GET    | `/transactions/{id}`                    | [`get_transaction`]      |
//! | GET    | `/transactions/{id}/history`            | [`transaction_history`]  |
//! | POST   | `/transactions/{id}/confirm_payment`    | [`confirm_payment`]      |
//! | POST   | `/transactions/{id}/location`           | [`report_location`]      |
//! | POST   | `/transactions/{id}/verify_proximity`   | [`verify_proximity`]     |
//! | POST   | `/transactions/{id}/confirm_completion` | [`confirm_completion`]   |
//! | POST   | `/transactions/{id}/complete`           | [`complete_transaction`] |
//! | POST   | `/transactions/{id}/disputes`           | [`open_dispute`]         |
//! | GET    | `/disputes/{id}`                        | [`get_dispute`]          |
//! | GET    | `/disputes/{id}/messages`               | [`dispute_messages`]     |
//! | POST   | `/disputes/{id}/messages`               | [`post_dispute_message`] |
//! | POST   | `/disputes/{id}/review`                 | [`review_dispute`]       |
//! | POST   | `/disputes/{id}/escalate`               | [`escalate_dispute`]     |
//! | POST   | `/disputes/{id}/resolve`                | [`resolve_dispute`]      |
//! | POST   | `/disputes/{id}/close`                  | [`close_dispute`]        |
//!
//! Every handler does its work in async database calls, so none of them block the worker thread.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Duration;
use escrow_engine::{
    db_types::{Dispute, DisputeId, ListingId, TransactionId},
    helpers::{GeoPoint, LocationSample},
    AuctionTimerApi,
    AuctionTimerStore,
    DisputeApi,
    DisputeManagement,
    MarketplaceApi,
    MarketplaceDatabase,
    PaymentProcessor,
    SettlementConfig,
    SettlementDatabase,
    SettlementError,
    TransactionFlowApi,
};
use log::*;

use crate::{
    data_objects::{
        AuctionStatus,
        BidRequest,
        CreatedTransactionView,
        DisputeMessageRequest,
        FeeQuery,
        FeeQuote,
        JsonResponse,
        LocationReport,
        NewListingRequest,
        OpenDisputeRequest,
        PartyRequest,
        ProximityView,
        PurchaseRequest,
        ResolveDisputeRequest,
        ResolvedDispute,
        ReviewRequest,
        StartAuctionRequest,
        TransactionView,
    },
    errors::ServerError,
};

/// Everything the routes need from a storage backend. `SqliteDatabase` is one.
pub trait EscrowBackend: SettlementDatabase + DisputeManagement + MarketplaceDatabase + AuctionTimerStore {}

impl<T> EscrowBackend for T where T: SettlementDatabase + DisputeManagement + MarketplaceDatabase + AuctionTimerStore {}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// `route!(name => Method "/path" impl BoundA, BoundB)` creates a `NameRoute<TBoundA, TBoundB>` service factory that
// registers the handler `name::<TBoundA, TBoundB>`.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Fees  ------------------------------------------------------
/// Quotes the escrow fee for an item price (in cents) under the current fee schedule.
#[get("/fees")]
pub async fn fee_quote(
    query: web::Query<FeeQuery>,
    config: web::Data<SettlementConfig>,
) -> Result<HttpResponse, ServerError> {
    let price = query.into_inner().price;
    trace!("💻️ Fee quote requested for {price}");
    let fees = config.fees.calculate(price).map_err(SettlementError::from)?;
    Ok(HttpResponse::Ok().json(FeeQuote::new(price, fees, &config.currency)))
}

// ----------------------------------------------   Listings  --------------------------------------------------
route!(create_listing => Post "/listings" impl EscrowBackend, PaymentProcessor);
pub async fn create_listing<B: EscrowBackend, P: PaymentProcessor>(
    body: web::Json<NewListingRequest>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let listing = api.create_listing(body.into_inner().into()).await?;
    debug!("💻️ Listing {} created by {}", listing.id, listing.seller_id);
    Ok(HttpResponse::Created().json(listing))
}

route!(get_listing => Get "/listings/{id}" impl EscrowBackend, PaymentProcessor);
pub async fn get_listing<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let listing = api.listing(&id).await?;
    Ok(HttpResponse::Ok().json(listing))
}

route!(remove_listing => Delete "/listings/{id}" impl EscrowBackend, PaymentProcessor);
pub async fn remove_listing<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let listing = api.remove_listing(&id).await?;
    Ok(HttpResponse::Ok().json(listing))
}

route!(place_bid => Post "/listings/{id}/bids" impl EscrowBackend, PaymentProcessor);
pub async fn place_bid<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    body: web::Json<BidRequest>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let BidRequest { bidder_id, amount } = body.into_inner();
    let bid = api.place_bid(&id, &bidder_id, amount).await?;
    Ok(HttpResponse::Created().json(bid))
}

route!(listing_bids => Get "/listings/{id}/bids" impl EscrowBackend, PaymentProcessor);
pub async fn listing_bids<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let bids = api.bids(&id).await?;
    Ok(HttpResponse::Ok().json(bids))
}

route!(purchase => Post "/listings/{id}/purchase" impl EscrowBackend, PaymentProcessor);
/// Buy-now at the list price. The response carries the payment client secret, which is not available anywhere else.
pub async fn purchase<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    body: web::Json<PurchaseRequest>,
    api: web::Data<MarketplaceApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let created = api.purchase(&id, &body.buyer_id).await?;
    info!("💻️ {} bought listing {id} in transaction {}", body.buyer_id, created.transaction.id);
    Ok(HttpResponse::Created().json(CreatedTransactionView::from(created)))
}

// ----------------------------------------------   Auctions  --------------------------------------------------
route!(start_auction => Post "/listings/{id}/auction" impl EscrowBackend);
pub async fn start_auction<B: EscrowBackend>(
    path: web::Path<String>,
    body: web::Json<StartAuctionRequest>,
    api: web::Data<AuctionTimerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let duration = Duration::try_seconds(body.duration_secs)
        .ok_or_else(|| SettlementError::validation("duration_secs", "is out of range"))?;
    let timer = api.start_timer(&id, duration).await?;
    Ok(HttpResponse::Created().json(timer))
}

route!(auction_status => Get "/listings/{id}/auction" impl EscrowBackend);
pub async fn auction_status<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<AuctionTimerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let listing_id = ListingId::from(path.into_inner());
    let timer = api.timer(&listing_id).await?;
    let active = api.is_active(&listing_id).await;
    let time_left_secs = api.time_left(&listing_id).await.num_seconds();
    Ok(HttpResponse::Ok().json(AuctionStatus { listing_id, active, time_left_secs, timer }))
}

route!(cancel_auction => Delete "/listings/{id}/auction" impl EscrowBackend);
pub async fn cancel_auction<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<AuctionTimerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ListingId::from(path.into_inner());
    let response = if api.cancel_timer(&id).await? {
        JsonResponse::success(format!("The auction for {id} was cancelled."))
    } else {
        JsonResponse::failure(format!("There is no running auction for {id}."))
    };
    Ok(HttpResponse::Ok().json(response))
}

// ----------------------------------------------   Transactions  ----------------------------------------------
route!(get_transaction => Get "/transactions/{id}" impl EscrowBackend, PaymentProcessor);
pub async fn get_transaction<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let tx = api.transaction(&id).await?;
    Ok(HttpResponse::Ok().json(TransactionView::from(tx)))
}

route!(transaction_history => Get "/transactions/{id}/history" impl EscrowBackend, PaymentProcessor);
pub async fn transaction_history<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let history = api.history(&id).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(confirm_payment => Post "/transactions/{id}/confirm_payment" impl EscrowBackend, PaymentProcessor);
/// Asks the payment processor whether the buyer has paid. Any answer other than "succeeded" leaves the transaction
/// pending and is reported as a 502 that the client may retry.
pub async fn confirm_payment<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let tx = api.confirm_payment(&id).await?;
    Ok(HttpResponse::Ok().json(TransactionView::from(tx)))
}

route!(report_location => Post "/transactions/{id}/location" impl EscrowBackend, PaymentProcessor);
pub async fn report_location<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    body: web::Json<LocationReport>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let report = body.into_inner();
    let sample = GeoPoint::new(report.lat, report.lng)
        .and_then(|point| LocationSample::new(point, report.accuracy, report.timestamp))
        .map_err(SettlementError::from)?;
    trace!("💻️ {} reported a location for {id}", report.party);
    let tx = api.record_location(&id, report.party, sample).await?;
    Ok(HttpResponse::Ok().json(TransactionView::from(tx)))
}

route!(verify_proximity => Post "/transactions/{id}/verify_proximity" impl EscrowBackend, PaymentProcessor);
/// Runs a proximity check on the latest reported locations. A failed check is still a 200: the body says why.
pub async fn verify_proximity<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    body: web::Json<PartyRequest>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let check = api.verify_proximity(&id, body.party).await?;
    Ok(HttpResponse::Ok().json(ProximityView::from(check)))
}

route!(confirm_completion => Post "/transactions/{id}/confirm_completion" impl EscrowBackend, PaymentProcessor);
pub async fn confirm_completion<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    body: web::Json<PartyRequest>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let tx = api.confirm_completion(&id, body.party).await?;
    Ok(HttpResponse::Ok().json(TransactionView::from(tx)))
}

route!(complete_transaction => Post "/transactions/{id}/complete" impl EscrowBackend, PaymentProcessor);
pub async fn complete_transaction<B: EscrowBackend, P: PaymentProcessor>(
    path: web::Path<String>,
    api: web::Data<TransactionFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let tx = api.complete_transaction(&id).await?;
    Ok(HttpResponse::Ok().json(TransactionView::from(tx)))
}

// ----------------------------------------------   Disputes  --------------------------------------------------
route!(open_dispute => Post "/transactions/{id}/disputes" impl EscrowBackend);
pub async fn open_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    body: web::Json<OpenDisputeRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = TransactionId::from(path.into_inner());
    let OpenDisputeRequest { initiator_id, reason, description } = body.into_inner();
    let dispute = api.open_dispute(&id, &initiator_id, reason, &description).await?;
    Ok(HttpResponse::Created().json(dispute))
}

route!(get_dispute => Get "/disputes/{id}" impl EscrowBackend);
pub async fn get_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let dispute = api.dispute(&id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(dispute_messages => Get "/disputes/{id}/messages" impl EscrowBackend);
pub async fn dispute_messages<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let messages = api.messages(&id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

route!(post_dispute_message => Post "/disputes/{id}/messages" impl EscrowBackend);
pub async fn post_dispute_message<B: EscrowBackend>(
    path: web::Path<String>,
    body: web::Json<DisputeMessageRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let DisputeMessageRequest { author_id, author_role, body } = body.into_inner();
    let message = api.add_message(&id, &author_id, author_role, &body).await?;
    Ok(HttpResponse::Created().json(message))
}

route!(review_dispute => Post "/disputes/{id}/review" impl EscrowBackend);
pub async fn review_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    body: web::Json<ReviewRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let dispute = api.start_review(&id, &body.assignee_id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(escalate_dispute => Post "/disputes/{id}/escalate" impl EscrowBackend);
pub async fn escalate_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let dispute = api.escalate(&id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(resolve_dispute => Post "/disputes/{id}/resolve" impl EscrowBackend);
pub async fn resolve_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    body: web::Json<ResolveDisputeRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let (dispute, tx) = api.resolve_dispute(&id, body.into_inner().into()).await?;
    info!("💻️ Dispute {id} resolved as {}. Transaction {} is now {}", resolution_label(&dispute), tx.id, tx.status);
    Ok(HttpResponse::Ok().json(ResolvedDispute { dispute, transaction: tx.into() }))
}

route!(close_dispute => Post "/disputes/{id}/close" impl EscrowBackend);
pub async fn close_dispute<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = DisputeId::from(path.into_inner());
    let dispute = api.close_dispute(&id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

fn resolution_label(dispute: &Dispute) -> &'static str {
    dispute.resolution.as_ref().map(|r| r.decision.as_str()).unwrap_or("unresolved")
}
