mod support;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use slotfactory_execution::{HistoryProvider, MemoryLedger, Payment, PaymentError};
use slotfactory_types::TransactionRecord;
use std::sync::Arc;
use support::*;

/// Wallet whose backend is down.
struct Offline;

#[async_trait]
impl HistoryProvider for Offline {
    async fn history(&self, _: &str, _: usize) -> Result<Vec<TransactionRecord>, PaymentError> {
        Err(PaymentError::unavailable())
    }
}

#[async_trait]
impl Payment for Offline {
    async fn balance(&self, _: &str) -> Result<Decimal, PaymentError> {
        Err(PaymentError::unavailable())
    }

    async fn debit(&self, _: &str, _: Decimal) -> Result<Decimal, PaymentError> {
        Err(PaymentError::unavailable())
    }

    async fn credit(&self, _: &str, _: Decimal) -> Result<Decimal, PaymentError> {
        Err(PaymentError::unavailable())
    }

    async fn debit_and_credit(&self, _: &str, _: Decimal, _: Decimal) -> Result<Decimal, PaymentError> {
        Err(PaymentError::unavailable())
    }
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    let (status, body) = request(&app, Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn games_are_listed_in_id_order() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    let (status, body) = request(&app, Method::GET, "/api/v1/games").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"games": [
            {"id": "1000", "playerCount": 0},
            {"id": "1001", "playerCount": 0},
        ]})
    );
}

#[tokio::test]
async fn kick_all_without_fleet_is_local() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    let (status, body) = request(&app, Method::POST, "/api/v1/admin/kick_all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "kick all signal sent", "scope": "local"}));
}

#[tokio::test]
async fn history_requires_player_id() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    for uri in ["/api/v1/history", "/api/v1/history?playerID="] {
        let (status, body) = request(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "playerID is required");
    }
}

#[tokio::test]
async fn history_is_newest_first_and_bounded() {
    let ledger = Arc::new(MemoryLedger::new());
    for amount in [10, 20, 30] {
        ledger.debit("p1", Decimal::from(amount)).await.unwrap();
    }
    let (app, _shutdown) = start_app(mock_adapters(ledger)).await;

    let (status, body) = request(&app, Method::GET, "/api/v1/history?playerID=p1&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playerID"], "p1");
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["amount"], "30");
    assert_eq!(history[1]["amount"], "20");

    let (_, body) = request(&app, Method::GET, "/api/v1/history?playerID=p1&limit=oops").await;
    assert_eq!(body["history"].as_array().unwrap().len(), 3);

    let (_, body) = request(&app, Method::GET, "/api/v1/history?playerID=nobody").await;
    assert_eq!(body["history"], json!([]));
}

#[tokio::test]
async fn wallet_failure_is_a_server_error() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(Offline))).await;
    let (status, body) = request(&app, Method::GET, "/api/v1/history?playerID=p1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "External API error");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (app, _shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    let response = tower::ServiceExt::oneshot(
        app.router(),
        axum::http::Request::builder()
            .uri("/api/v2/games")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
