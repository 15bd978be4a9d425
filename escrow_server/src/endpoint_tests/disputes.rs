use actix_web::http::StatusCode;
use serde_json::{json, Value};

use super::helpers::{assert_error, id_of, TestContext};

async fn open(ctx: &TestContext, tx: &str, initiator: &str) -> (StatusCode, Value) {
    let req = json!({
        "initiatorId": initiator,
        "reason": "item_not_received",
        "description": "The seller never showed up",
    });
    ctx.post(&format!("/transactions/{tx}/disputes"), req).await
}

#[actix_web::test]
async fn opening_a_dispute_freezes_the_transaction() {
    let _ = env_logger::try_init();
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;

    let (status, body) = open(&ctx, &tx, "bob").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "open");
    assert_eq!(body["priority"], "high");
    assert_eq!(body["transactionId"], tx.as_str());
    assert_eq!(body["initiatorId"], "bob");

    let (status, body) = open(&ctx, &tx, "alice").await;
    assert_error(status, &body, StatusCode::CONFLICT, "conflict");

    let (_, body) = ctx.get(&format!("/transactions/{tx}")).await;
    assert_eq!(body["status"], "disputed");
    assert!(body["disputeId"].is_string());
}

#[actix_web::test]
async fn only_the_parties_can_open_a_dispute() {
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;
    let (status, body) = open(&ctx, &tx, "mallory").await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");
    let (status, body) = open(&ctx, "tx_missing", "bob").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
}

#[actix_web::test]
async fn buyer_favour_refunds_the_full_charge() {
    let _ = env_logger::try_init();
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;
    let (_, body) = open(&ctx, &tx, "bob").await;
    let dispute = id_of(&body);
    let resolve = format!("/disputes/{dispute}/resolve");
    let decision = json!({ "decision": "buyer_favor", "reason": "No handoff took place", "resolverId": "staff-7" });

    let (status, body) = ctx.post(&resolve, decision.clone()).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");

    let (status, body) = ctx.post(&format!("/disputes/{dispute}/review"), json!({ "assigneeId": "staff-7" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "under_review");
    assert_eq!(body["assigneeId"], "staff-7");

    let (status, body) = ctx.post(&resolve, decision).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["dispute"]["status"], "resolved");
    assert_eq!(body["dispute"]["resolution"]["decision"], "buyer_favor");
    assert_eq!(body["dispute"]["resolution"]["refundAmount"], 5450);
    assert_eq!(body["transaction"]["status"], "refunded");
    assert!(body["transaction"]["refundedAt"].is_string());

    let (status, body) = ctx.post(&format!("/disputes/{dispute}/close"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "closed");

    let msg = json!({ "authorId": "bob", "authorRole": "buyer", "body": "Thanks" });
    let (status, body) = ctx.post(&format!("/disputes/{dispute}/messages"), msg).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}

#[actix_web::test]
async fn seller_favour_completes_the_transaction() {
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;
    let (_, body) = open(&ctx, &tx, "bob").await;
    let dispute = id_of(&body);
    ctx.post(&format!("/disputes/{dispute}/review"), json!({ "assigneeId": "staff-7" })).await;

    let with_refund = json!({
        "decision": "seller_favor",
        "reason": "Tracking shows a handoff",
        "resolverId": "staff-7",
        "refundAmount": 100,
    });
    let (status, body) = ctx.post(&format!("/disputes/{dispute}/resolve"), with_refund).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");

    let decision = json!({ "decision": "seller_favor", "reason": "Tracking shows a handoff", "resolverId": "staff-7" });
    let (status, body) = ctx.post(&format!("/disputes/{dispute}/resolve"), decision).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["transaction"]["status"], "completed");
    assert!(body["dispute"]["resolution"].get("refundAmount").map_or(true, Value::is_null));
}

#[actix_web::test]
async fn escalation_makes_a_dispute_urgent() {
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;
    let (_, body) = open(&ctx, &tx, "alice").await;
    let dispute = id_of(&body);
    let (status, body) = ctx.post(&format!("/disputes/{dispute}/escalate"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "escalated");
    assert_eq!(body["priority"], "urgent");
    let (status, body) = ctx.post(&format!("/disputes/{dispute}/close"), json!({})).await;
    assert_error(status, &body, StatusCode::CONFLICT, "invalid_transition");
}

#[actix_web::test]
async fn dispute_thread() {
    let ctx = TestContext::paying().await;
    let tx = ctx.paid_transaction(5000).await;
    let (_, body) = open(&ctx, &tx, "bob").await;
    let dispute = id_of(&body);
    let messages = format!("/disputes/{dispute}/messages");

    let posts = [
        json!({ "authorId": "bob", "authorRole": "buyer", "body": "I waited an hour" }),
        json!({ "authorId": "alice", "authorRole": "seller", "body": "Wrong car park" }),
        json!({ "authorId": "staff-7", "authorRole": "staff", "body": "Looking into it" }),
    ];
    for post in posts {
        let (status, body) = ctx.post(&messages, post).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    // alice is the seller, not the buyer
    let imposter = json!({ "authorId": "alice", "authorRole": "buyer", "body": "Refund me" });
    let (status, body) = ctx.post(&messages, imposter).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "validation");

    let (status, body) = ctx.get(&messages).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let authors = body.as_array().unwrap().iter().map(|m| m["authorId"].as_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(authors, ["bob", "alice", "staff-7"]);

    let (status, body) = ctx.get("/disputes/dsp_missing").await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
}
