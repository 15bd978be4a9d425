use std::str::FromStr;

use chrono::Duration;
use cucumber::{then, when};
use escrow_engine::{
    db_types::{Cents, Decision, DisputeReason, Party, Priority, TransactionStatus},
    traits::PaymentIntentStatus,
    DisputeDecision,
    ProximityCheck,
    SettlementError,
};

use crate::cucumber::SettlementWorld;

fn cents(s: &str) -> Cents {
    Cents::from_str(s).expect("Not a valid amount")
}

fn party(s: &str) -> Party {
    Party::from_str(s).expect("Not a party")
}

#[when(expr = "'{word}' buys the listing")]
async fn buy_listing(world: &mut SettlementWorld, buyer: String) {
    let id = world.listing().id.clone();
    let created = world.system().market.purchase(&id, &buyer).await.expect("Error buying listing");
    assert!(!created.client_secret.is_empty());
    world.transaction = Some(created.transaction);
}

#[when(expr = "the processor reports the payment as {word}")]
async fn processor_status(world: &mut SettlementWorld, status: String) {
    world.system().processor.set_status(PaymentIntentStatus::from(status.as_str()));
}

#[when("payment is confirmed")]
async fn confirm_payment(world: &mut SettlementWorld) {
    let id = world.transaction().id.clone();
    match world.system().flow.confirm_payment(&id).await {
        Ok(tx) => world.transaction = Some(tx),
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "the buyer and seller report locations {float} metres apart")]
async fn report_locations(world: &mut SettlementWorld, metres: f64) {
    let tx = world.transaction().clone();
    world.system().report_locations(&tx, metres).await;
}

#[when(expr = "the {word} asks for a proximity check")]
async fn proximity_check(world: &mut SettlementWorld, who: String) {
    let id = world.transaction().id.clone();
    let check = world.system().flow.verify_proximity(&id, party(&who)).await.expect("Error checking proximity");
    if let ProximityCheck::Verified { transaction, .. } = check {
        world.transaction = Some(transaction);
    }
}

#[when(expr = "the {word} confirms completion")]
async fn confirm_completion(world: &mut SettlementWorld, who: String) {
    let id = world.transaction().id.clone();
    let tx = world.system().flow.confirm_completion(&id, party(&who)).await.expect("Error confirming completion");
    world.transaction = Some(tx);
}

#[when(expr = "'{word}' bids {word}")]
async fn place_bid(world: &mut SettlementWorld, bidder: String, amount: String) {
    let id = world.listing().id.clone();
    world.system().market.place_bid(&id, &bidder, cents(&amount)).await.expect("Error placing bid");
}

#[when(expr = "{int} minutes pass")]
async fn time_passes(world: &mut SettlementWorld, minutes: i64) {
    world.system().advance(Duration::minutes(minutes));
}

#[when("the auction is settled")]
async fn settle_auction(world: &mut SettlementWorld) {
    let sys = world.system();
    let id = world.listing().id.clone();
    sys.timers.expire_due().await.expect("Error expiring timers");
    let created = sys.market.settle_auction(&id).await.expect("Error settling auction");
    world.transaction = created.map(|c| c.transaction);
}

#[when(expr = "'{word}' opens a dispute because {word}")]
async fn open_dispute(world: &mut SettlementWorld, who: String, reason: String) {
    let id = world.transaction().id.clone();
    let reason = DisputeReason::from_str(&reason).expect("Not a dispute reason");
    let dispute = world
        .system()
        .disputes
        .open_dispute(&id, &who, reason, "Raised during an acceptance test")
        .await
        .expect("Error opening dispute");
    world.dispute = Some(dispute);
}

#[when(expr = "'{word}' reviews the dispute")]
async fn review_dispute(world: &mut SettlementWorld, staff: String) {
    let id = world.dispute().id.clone();
    let dispute = world.system().disputes.start_review(&id, &staff).await.expect("Error starting review");
    world.dispute = Some(dispute);
}

#[when(expr = "'{word}' resolves the dispute as {word}")]
async fn resolve_dispute(world: &mut SettlementWorld, staff: String, decision: String) {
    let id = world.dispute().id.clone();
    let decision = Decision::from_str(&decision).expect("Not a decision");
    let decision = DisputeDecision::new(decision, "Settled after review".to_string(), staff);
    let (dispute, tx) = world.system().disputes.resolve_dispute(&id, decision).await.expect("Error resolving dispute");
    world.dispute = Some(dispute);
    world.transaction = Some(tx);
}

#[then(expr = "the transaction is {word}")]
async fn check_status(world: &mut SettlementWorld, status: String) {
    let expected = TransactionStatus::from_str(&status).expect("Not a transaction status");
    let tx = world.refresh_transaction().await;
    assert_eq!(tx.status, expected);
}

#[then(expr = "the total charge is {word}")]
async fn check_total_charge(world: &mut SettlementWorld, amount: String) {
    assert_eq!(world.transaction().fees.total_charge, cents(&amount));
}

#[then(expr = "the seller payout is {word}")]
async fn check_payout(world: &mut SettlementWorld, amount: String) {
    assert_eq!(world.transaction().fees.seller_payout, cents(&amount));
}

#[then(expr = "the buyer is '{word}'")]
async fn check_buyer(world: &mut SettlementWorld, buyer: String) {
    assert_eq!(world.transaction().buyer_id, buyer);
}

#[then(expr = "the funds are held for {int} hours")]
async fn check_fund_hold(world: &mut SettlementWorld, hours: i64) {
    let tx = world.transaction();
    let paid_at = tx.paid_at.expect("Transaction has not been paid");
    assert_eq!(tx.funds_release_at, Some(paid_at + Duration::hours(hours)));
}

#[then("the payment was not confirmed")]
async fn check_payment_not_confirmed(world: &mut SettlementWorld) {
    let err = world.last_error.take().expect("Expected the payment confirmation to fail");
    assert!(matches!(err, SettlementError::PaymentNotConfirmed(..)), "Unexpected error: {err}");
}

#[then(expr = "the history reads {string}")]
async fn check_history(world: &mut SettlementWorld, expected: String) {
    let id = world.transaction().id.clone();
    let history = world.system().flow.history(&id).await.expect("Error fetching history");
    let statuses = history.iter().map(|h| h.to_status.as_str()).collect::<Vec<_>>().join(", ");
    assert_eq!(statuses, expected);
}

#[then(expr = "the dispute priority is {word}")]
async fn check_priority(world: &mut SettlementWorld, priority: String) {
    let expected = Priority::from_str(&priority).expect("Not a priority");
    assert_eq!(world.dispute().priority, expected);
}

#[then(expr = "the refund is {word}")]
async fn check_refund(world: &mut SettlementWorld, amount: String) {
    let resolution = world.dispute().resolution.as_ref().expect("Dispute has not been resolved");
    assert_eq!(resolution.refund_amount, Some(cents(&amount)));
}

#[then(expr = "a bid of {word} from '{word}' is rejected with minimum {word}")]
async fn check_rejected_bid(world: &mut SettlementWorld, amount: String, bidder: String, minimum: String) {
    let id = world.listing().id.clone();
    let err = world.system().market.place_bid(&id, &bidder, cents(&amount)).await.expect_err("Bid should be rejected");
    match err {
        SettlementError::BidTooLow { minimum: m, .. } => assert_eq!(m, cents(&minimum)),
        other => panic!("Expected BidTooLow, got {other}"),
    }
}
