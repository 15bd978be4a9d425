use std::{sync::Arc, time::Duration};

use escrow_engine::{
    helpers::Clock,
    CreatedTransaction,
    MarketplaceApi,
    PaymentProcessor,
    SettlementError,
};
use log::*;
use tokio::task::JoinHandle;

use crate::routes::EscrowBackend;

const MIN_PAUSE: Duration = Duration::from_millis(250);

/// Starts the auction worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The worker sleeps until the earliest running auction is due (but never longer than `max_sleep`, so that auctions
/// started after it went to sleep are not missed by much), closes every auction that has ended and sells each item to
/// its highest bidder. Auctions that end while the server is down are closed on the first pass after start-up.
pub fn start_auction_worker<B, P>(
    market: MarketplaceApi<B, P>,
    clock: Arc<dyn Clock>,
    max_sleep: Duration,
) -> JoinHandle<()>
where
    B: EscrowBackend + Clone + 'static,
    P: PaymentProcessor + 'static,
{
    actix_web::rt::spawn(async move {
        info!("⏱️ Auction worker started");
        loop {
            match settle_ended_auctions(&market).await {
                Ok(sold) if !sold.is_empty() => info!("⏱️ {} auctions settled", sold.len()),
                Ok(_) => trace!("⏱️ No auctions to settle"),
                Err(e) => error!("⏱️ Error closing ended auctions: {e}"),
            }
            let pause = next_pause(&market, clock.as_ref(), max_sleep).await;
            trace!("⏱️ Auction worker sleeping for {}ms", pause.as_millis());
            tokio::time::sleep(pause).await;
        }
    })
}

/// Expires every auction timer that has run out, then settles every ended auction that has bids but no sale yet.
/// Returns the transactions created for auction winners.
///
/// The second step does not depend on the first: an auction whose settlement failed on an earlier pass (the payment
/// processor was down, say) is picked up again here until it sells.
pub async fn settle_ended_auctions<B, P>(
    market: &MarketplaceApi<B, P>,
) -> Result<Vec<CreatedTransaction>, SettlementError>
where
    B: EscrowBackend + Clone,
    P: PaymentProcessor,
{
    let ended = market.timers().expire_due().await?;
    if !ended.is_empty() {
        debug!("⏱️ {} auction timers ran out", ended.len());
    }
    let unsettled = market.unsettled_auctions().await?;
    let mut sold = Vec::with_capacity(unsettled.len());
    for listing_id in unsettled {
        match market.settle_auction(&listing_id).await {
            Ok(Some(created)) => {
                let tx = &created.transaction;
                debug!("⏱️ Listing {listing_id} sold to {} in {}", tx.buyer_id, tx.id);
                sold.push(created);
            },
            Ok(None) => debug!("⏱️ Auction for {listing_id} was settled elsewhere"),
            Err(e) => error!("⏱️ Could not settle the auction for {listing_id}. Will retry on the next pass. {e}"),
        }
    }
    Ok(sold)
}

async fn next_pause<B, P>(market: &MarketplaceApi<B, P>, clock: &dyn Clock, max_sleep: Duration) -> Duration
where
    B: EscrowBackend + Clone,
    P: PaymentProcessor,
{
    match market.timers().next_wake().await {
        Ok(Some(at)) => (at - clock.now()).to_std().unwrap_or(MIN_PAUSE).max(MIN_PAUSE).min(max_sleep),
        Ok(None) => max_sleep,
        Err(e) => {
            warn!("⏱️ Could not work out when the next auction ends. {e}");
            max_sleep
        },
    }
}
