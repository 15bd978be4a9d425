use actix_web::http::StatusCode;
use escrow_engine::traits::{PaymentIntent, PaymentProcessorError};
use serde_json::json;

use super::{
    helpers::{assert_error, id_of, TestContext},
    mocks::MockProcessor,
};

#[actix_web::test]
async fn health_check() {
    let ctx = TestContext::paying().await;
    let (status, _) = ctx.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn fee_quote() {
    let ctx = TestContext::paying().await;
    let (status, body) = ctx.get("/fees?price=5000").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["flatFee"], 300);
    assert_eq!(body["percentageFee"], 150);
    assert_eq!(body["totalFee"], 450);
    assert_eq!(body["totalAmount"], 5450);
    assert_eq!(body["sellerPayout"], 5000);
    assert_eq!(body["rateBps"], 300);
    assert_eq!(body["currency"], "usd");
}

#[actix_web::test]
async fn fee_quote_rejects_bad_prices() {
    let ctx = TestContext::paying().await;
    let (status, body) = ctx.get("/fees?price=0").await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    let (status, body) = ctx.get("/fees?price=ten").await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
}

#[actix_web::test]
async fn create_and_fetch_listing() {
    let ctx = TestContext::paying().await;
    let id = ctx.listing(12_000).await;
    let (status, body) = ctx.get(&format!("/listings/{id}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sellerId"], "alice");
    assert_eq!(body["price"], 12_000);
    assert_eq!(body["status"], "active");

    let (status, body) = ctx.get("/listings/no-such-listing").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
}

#[actix_web::test]
async fn invalid_listings_are_rejected() {
    let ctx = TestContext::paying().await;
    let (status, body) = ctx.post("/listings", json!({ "sellerId": "alice", "title": "", "price": 500 })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    // Missing price
    let (status, body) = ctx.post("/listings", json!({ "sellerId": "alice", "title": "Lamp" })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
}

#[actix_web::test]
async fn purchase_returns_the_client_secret() {
    let ctx = TestContext::paying().await;
    let listing = ctx.listing(5000).await;
    let (status, body) = ctx.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "bob" })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let tx = &body["transaction"];
    assert!(body["clientSecret"].as_str().unwrap().ends_with("_secret"));
    assert_eq!(tx["amount"], 5000);
    assert_eq!(tx["totalAmount"], 5450);
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["buyerId"], "bob");
    assert_eq!(tx["completionConfirmed"], json!({ "buyer": false, "seller": false }));
    assert!(tx.get("paidAt").is_none());
    // The secret is only handed out once
    let (_, body) = ctx.get(&format!("/transactions/{}", id_of(tx))).await;
    assert!(body.get("clientSecret").is_none());

    let (status, body) = ctx.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "carol" })).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}

#[actix_web::test]
async fn processor_outage_during_purchase() {
    let mut processor = MockProcessor::new();
    processor
        .expect_create_payment_intent()
        .times(1)
        .returning(|_, _, _| Err(PaymentProcessorError::Unavailable("connection reset".into())));
    let ctx = TestContext::new(processor).await;
    let listing = ctx.listing(5000).await;
    let (status, body) = ctx.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "bob" })).await;
    assert_error(status, &body, StatusCode::BAD_GATEWAY, "external_service");
    assert_eq!(body["retryable"], true);
    // The item is still for sale
    let (_, body) = ctx.get(&format!("/listings/{listing}")).await;
    assert_eq!(body["status"], "active");
}

#[actix_web::test]
async fn sellers_cannot_buy_their_own_items() {
    let mut processor = MockProcessor::new();
    processor.expect_create_payment_intent().never().returning(|_, _, _| {
        Ok(PaymentIntent { intent_id: "pi_never".into(), client_secret: "pi_never_secret".into() })
    });
    let ctx = TestContext::new(processor).await;
    let listing = ctx.listing(5000).await;
    let (status, body) = ctx.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "alice" })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
}

#[actix_web::test]
async fn auction_lifecycle() {
    let ctx = TestContext::paying().await;
    let listing = ctx.listing(1000).await;
    let auction = format!("/listings/{listing}/auction");
    let bids = format!("/listings/{listing}/bids");

    let (status, body) = ctx.post(&bids, json!({ "bidderId": "bob", "amount": 1500 })).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");

    let (status, body) = ctx.post(&auction, json!({ "durationSecs": 600 })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "active");

    let (status, body) = ctx.get(&auction).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["active"], true);
    let left = body["timeLeftSecs"].as_i64().unwrap();
    assert!(left > 590 && left <= 600, "{left}");

    let (status, body) = ctx.post(&bids, json!({ "bidderId": "bob", "amount": 1500 })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, body) = ctx.post(&bids, json!({ "bidderId": "dave", "amount": 1400 })).await;
    assert_error(status, &body, StatusCode::CONFLICT, "conflict");
    let (_, body) = ctx.get(&bids).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = ctx.delete(&auction).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (_, body) = ctx.delete(&auction).await;
    assert_eq!(body["success"], false);
    let (_, body) = ctx.get(&auction).await;
    assert_eq!(body["active"], false);
    assert_eq!(body["timeLeftSecs"], 0);
}

#[actix_web::test]
async fn out_of_range_auctions_and_bids_are_rejected() {
    let ctx = TestContext::paying().await;
    let listing = ctx.listing(1000).await;
    let auction = format!("/listings/{listing}/auction");
    // too long to be a duration at all, then a duration that ends past the last representable date
    for secs in [i64::MAX, 1_000_000_000_000_000] {
        let (status, body) = ctx.post(&auction, json!({ "durationSecs": secs })).await;
        assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    }
    let (_, body) = ctx.get(&auction).await;
    assert_eq!(body["active"], false);

    let (status, body) = ctx.post(&auction, json!({ "durationSecs": 600 })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let bids = format!("/listings/{listing}/bids");
    let (status, body) = ctx.post(&bids, json!({ "bidderId": "bob", "amount": i64::MAX })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    let (_, body) = ctx.get(&bids).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn removed_listings_cannot_be_bought() {
    let ctx = TestContext::paying().await;
    let listing = ctx.listing(2000).await;
    let (status, body) = ctx.delete(&format!("/listings/{listing}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "removed");
    let (status, body) = ctx.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "bob" })).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}
