use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use escrow_engine::{
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SettlementConfig,
    SqliteDatabase,
};
use log::debug;
use serde::Serialize;
use serde_json::{json, Value};

use super::mocks::{processor_reporting, MockProcessor};
use crate::server::{configure_routes, SettlementApis};

/// A migrated throw-away database plus a mock payment processor. Every request builds a fresh app over the same
/// database, so state carries over from one request to the next just as it would on a real server.
pub struct TestContext {
    pub db: SqliteDatabase,
    pub processor: Arc<MockProcessor>,
}

impl TestContext {
    pub async fn new(processor: MockProcessor) -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        Self { db, processor: Arc::new(processor) }
    }

    /// A context whose processor accepts every charge and reports every payment as succeeded.
    pub async fn paying() -> Self {
        Self::new(processor_reporting("succeeded")).await
    }

    pub async fn call(&self, req: TestRequest) -> (StatusCode, Value) {
        let apis = SettlementApis::new(
            self.db.clone(),
            Arc::clone(&self.processor),
            EventProducers::default(),
            &SettlementConfig::default(),
        );
        let app = App::new()
            .configure(|cfg| apis.register(cfg))
            .configure(configure_routes::<SqliteDatabase, MockProcessor>);
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        debug!("Response {status}: {}", String::from_utf8_lossy(&body));
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.call(TestRequest::get().uri(path)).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: T) -> (StatusCode, Value) {
        self.call(TestRequest::post().uri(path).set_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.call(TestRequest::delete().uri(path)).await
    }

    /// Lists an item for `alice` and returns its id.
    pub async fn listing(&self, price: i64) -> String {
        let (status, body) = self
            .post("/listings", json!({ "sellerId": "alice", "title": "Road bike", "price": price }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body)
    }

    /// `bob` buys a fresh listing. Returns the transaction id.
    pub async fn pending_transaction(&self, price: i64) -> String {
        let listing = self.listing(price).await;
        let (status, body) = self.post(&format!("/listings/{listing}/purchase"), json!({ "buyerId": "bob" })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id_of(&body["transaction"])
    }

    pub async fn paid_transaction(&self, price: i64) -> String {
        let id = self.pending_transaction(price).await;
        let (status, body) = self.post(&format!("/transactions/{id}/confirm_payment"), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        id
    }
}

pub fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("Response has no id").to_string()
}

pub fn assert_error(status: StatusCode, body: &Value, expected_status: StatusCode, code: &str) {
    assert_eq!(status, expected_status, "{body}");
    assert_eq!(body["code"], code, "{body}");
    assert!(body["error"].is_string(), "{body}");
}
