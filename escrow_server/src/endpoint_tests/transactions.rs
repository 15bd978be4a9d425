use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use actix_web::http::StatusCode;
use chrono::Utc;
use escrow_engine::traits::{PaymentIntent, PaymentIntentStatus};
use serde_json::{json, Value};

use super::{
    helpers::{assert_error, TestContext},
    mocks::MockProcessor,
};

const LAT: f64 = 51.5007;
const LNG: f64 = -0.1246;

async fn report(ctx: &TestContext, id: &str, party: &str, lat: f64, lng: f64) -> (StatusCode, Value) {
    let fix = json!({ "party": party, "lat": lat, "lng": lng, "timestamp": Utc::now() });
    ctx.post(&format!("/transactions/{id}/location"), fix).await
}

#[actix_web::test]
async fn payment_is_only_confirmed_once_the_processor_agrees() {
    let _ = env_logger::try_init();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut processor = MockProcessor::new();
    processor.expect_create_payment_intent().returning(|_, _, metadata| {
        Ok(PaymentIntent {
            intent_id: format!("pi_{}", metadata.transaction_id),
            client_secret: format!("pi_{}_secret", metadata.transaction_id),
        })
    });
    processor.expect_payment_intent_status().returning(move |_| {
        let status = if counter.fetch_add(1, Ordering::SeqCst) == 0 { "processing" } else { "succeeded" };
        Ok(PaymentIntentStatus::from(status))
    });
    let ctx = TestContext::new(processor).await;
    let id = ctx.pending_transaction(5000).await;
    let confirm = format!("/transactions/{id}/confirm_payment");

    let (status, body) = ctx.post(&confirm, json!({})).await;
    assert_error(status, &body, StatusCode::BAD_GATEWAY, "external_service");
    let (_, body) = ctx.get(&format!("/transactions/{id}")).await;
    assert_eq!(body["status"], "pending");

    let (status, body) = ctx.post(&confirm, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "paid");
    assert!(body["paidAt"].is_string());
    assert!(body["fundsReleaseAt"].is_string());

    // Already paid. The processor is not asked again.
    let (status, body) = ctx.post(&confirm, json!({})).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn verified_handoff_then_both_parties_confirm() {
    let _ = env_logger::try_init();
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;

    let (status, body) = report(&ctx, &id, "buyer", LAT, LNG).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = report(&ctx, &id, "seller", LAT + 0.00009, LNG).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = ctx.post(&format!("/transactions/{id}/verify_proximity"), json!({ "party": "buyer" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["verified"], true);
    assert_eq!(body["withinRange"], true);
    let distance = body["distanceMeters"].as_f64().unwrap();
    assert!(distance > 9.0 && distance < 11.0, "{distance}");
    assert_eq!(body["transaction"]["status"], "delivered_pending_confirmation");
    assert_eq!(body["transaction"]["proximityVerified"], true);

    let confirm = format!("/transactions/{id}/confirm_completion");
    let (status, body) = ctx.post(&confirm, json!({ "party": "buyer" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "delivered_pending_confirmation");
    assert_eq!(body["completionConfirmed"], json!({ "buyer": true, "seller": false }));

    let (status, body) = ctx.post(&confirm, json!({ "party": "seller" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert!(body["completedAt"].is_string());

    let (status, body) = ctx.get(&format!("/transactions/{id}/history")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let history = body.as_array().unwrap();
    assert_eq!(history.first().unwrap()["toStatus"], "pending");
    assert_eq!(history.last().unwrap()["toStatus"], "completed");
}

#[actix_web::test]
async fn parties_too_far_apart() {
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;
    report(&ctx, &id, "buyer", LAT, LNG).await;
    report(&ctx, &id, "seller", LAT + 0.018, LNG).await;

    let (status, body) = ctx.post(&format!("/transactions/{id}/verify_proximity"), json!({ "party": "seller" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["verified"], false);
    assert_eq!(body["withinRange"], false);
    assert!(body["distanceMeters"].as_f64().unwrap() > 1900.0);
    let (_, body) = ctx.get(&format!("/transactions/{id}")).await;
    assert_eq!(body["status"], "paid");
}

#[actix_web::test]
async fn proximity_needs_both_locations() {
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;
    report(&ctx, &id, "buyer", LAT, LNG).await;
    let (status, body) = ctx.post(&format!("/transactions/{id}/verify_proximity"), json!({ "party": "buyer" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["verified"], false);
    assert!(body["reason"].as_str().unwrap().contains("seller"));
}

#[actix_web::test]
async fn bad_locations_are_rejected() {
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;
    let (status, body) = report(&ctx, &id, "buyer", 123.0, LNG).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    let courier = json!({ "party": "courier", "lat": LAT, "lng": LNG, "timestamp": Utc::now() });
    let (status, body) = ctx.post(&format!("/transactions/{id}/location"), courier).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
}

#[actix_web::test]
async fn locations_need_a_timestamp() {
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;
    let undated = json!({ "party": "buyer", "lat": LAT, "lng": LNG });
    let (status, body) = ctx.post(&format!("/transactions/{id}/location"), undated).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    report(&ctx, &id, "seller", LAT, LNG).await;
    let (status, body) = ctx.post(&format!("/transactions/{id}/verify_proximity"), json!({ "party": "seller" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["verified"], false);
    assert!(body["reason"].as_str().unwrap().contains("buyer"), "{body}");
}

#[actix_web::test]
async fn locations_are_not_accepted_before_payment() {
    let ctx = TestContext::paying().await;
    let id = ctx.pending_transaction(5000).await;
    let (status, body) = report(&ctx, &id, "buyer", LAT, LNG).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}

#[actix_web::test]
async fn unknown_transactions() {
    let ctx = TestContext::paying().await;
    let (status, body) = ctx.get("/transactions/tx_missing").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
    let (status, body) = ctx.get("/transactions/tx_missing/history").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
}

#[actix_web::test]
async fn completion_before_handoff_is_refused() {
    let ctx = TestContext::paying().await;
    let id = ctx.paid_transaction(5000).await;
    let (status, body) = ctx.post(&format!("/transactions/{id}/confirm_completion"), json!({ "party": "buyer" })).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
    let (status, body) = ctx.post(&format!("/transactions/{id}/complete"), json!({})).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}
