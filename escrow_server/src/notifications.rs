//! Notification hooks.
//!
//! Delivering email or SMS is somebody else's job. The server subscribes to every settlement event and logs the
//! notification that a delivery service would send, under the `escrow::notifications` log target, so that an external
//! shipper can pick them up from the logs.
use escrow_engine::{
    db_types::Transaction,
    events::{EventHandlers, EventHooks, EventProducers},
};
use futures::FutureExt;
use log::*;

const NOTIFICATION_TARGET: &str = "escrow::notifications";
const EVENT_BUFFER_SIZE: usize = 25;

/// Hooks that log a notification for every settlement event.
pub fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_transaction_created(|ev| {
            async move {
                let tx = &ev.transaction;
                let msg = format!("Payment of {} is waiting for {}", tx.fees.total_charge, tx.buyer_id);
                dispatch(ev.name(), &parties(tx), &msg);
            }
            .boxed()
        })
        .on_transaction_paid(|ev| {
            async move {
                let tx = &ev.transaction;
                let msg = format!("{} is held in escrow. Arrange the handoff.", tx.fees.total_charge);
                dispatch(ev.name(), &parties(tx), &msg);
            }
            .boxed()
        })
        .on_transaction_delivered(|ev| {
            async move {
                let msg = "You met up. Please both confirm the handoff.";
                dispatch(ev.name(), &parties(&ev.transaction), msg);
            }
            .boxed()
        })
        .on_transaction_completed(|ev| {
            async move {
                let tx = &ev.transaction;
                let msg = format!("Transaction complete. {} will be paid out to the seller.", tx.fees.seller_payout);
                dispatch(ev.name(), &parties(tx), &msg);
            }
            .boxed()
        })
        .on_transaction_refunded(|ev| {
            async move {
                let tx = &ev.transaction;
                let msg = format!("Transaction {} was refunded to the buyer.", tx.id);
                dispatch(ev.name(), &parties(tx), &msg);
            }
            .boxed()
        })
        .on_dispute_opened(|ev| {
            async move {
                let d = &ev.dispute;
                let msg = format!("{} opened a {} priority dispute: {}", d.initiator_id, d.priority, d.reason);
                dispatch(ev.name(), &[format!("parties of transaction {}", d.transaction_id), "staff".into()], &msg);
            }
            .boxed()
        })
        .on_dispute_resolved(|ev| {
            async move {
                let d = &ev.dispute;
                let outcome = d.resolution.as_ref().map(|r| r.decision.as_str()).unwrap_or("resolved");
                let msg = format!("Dispute {} was resolved: {outcome}", d.id);
                dispatch(ev.name(), &[format!("parties of transaction {}", d.transaction_id)], &msg);
            }
            .boxed()
        })
        .on_auction_ended(|ev| {
            async move {
                let msg = format!("The auction for listing {} has ended", ev.timer.listing_id);
                dispatch(ev.name(), &[format!("seller and bidders of {}", ev.timer.listing_id)], &msg);
            }
            .boxed()
        });
    hooks
}

/// Starts the notification handlers and returns the producers the settlement APIs publish to.
pub async fn start_notifications() -> EventProducers {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    debug!("📣️ Notification handlers started");
    producers
}

fn parties(tx: &Transaction) -> [String; 2] {
    [format!("buyer {}", tx.buyer_id), format!("seller {}", tx.seller_id)]
}

fn dispatch(topic: &str, recipients: &[String], message: &str) {
    info!(target: NOTIFICATION_TARGET, "📣️ [{topic}] to {}: {message}", recipients.join(", "));
}
