mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::Value;
use spout_client::api::ApiServer;
use std::sync::Arc;
use tower::ServiceExt;

fn build_app(metrics_enabled: bool) -> (Router, Arc<MockLedger>) {
    let ledger = MockLedger::new(1000, 50, 0);
    let identity = MockIdentity::new();
    let session = Arc::new(session(&ledger, &identity));
    (ApiServer::new(session, metrics_enabled, false).router(), ledger)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_state_starts_disconnected() {
    let (app, _ledger) = build_app(true);
    let (status, body) = call(&app, "GET", "/api/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "disconnected");
    assert!(body["data"]["latest_snapshot"].is_null());
}

#[tokio::test]
async fn test_request_before_connect_is_unauthorized() {
    let (app, _ledger) = build_app(true);
    let (status, body) = call(&app, "POST", "/api/request", Some(serde_json::json!({"amount": "5"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NOT_CONNECTED");
}

#[tokio::test]
async fn test_connect_then_withdraw() {
    let (app, ledger) = build_app(true);

    let (status, body) = call(&app, "POST", "/api/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["address"], user().to_string());

    let (status, body) = call(&app, "POST", "/api/request", Some(serde_json::json!({"amount": "20"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["receipt"]["kind"], "withdraw");

    let (_, body) = call(&app, "GET", "/api/state", None).await;
    assert_eq!(body["data"]["phase"], "connected");
    assert_eq!(body["data"]["latest_snapshot"]["caller_allowance_remaining"], "30.0");
    assert_eq!(body["data"]["latest_snapshot"]["cooldown_formatted"], "0 days, 0 hours, 0 minutes");
    assert_eq!(ledger.withdrawals.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_amount_is_bad_request() {
    let (app, _ledger) = build_app(true);
    call(&app, "POST", "/api/connect", None).await;

    let (status, body) = call(&app, "POST", "/api/request", Some(serde_json::json!({"amount": "abc"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_AMOUNT");

    let (_, body) = call(&app, "GET", "/api/state", None).await;
    assert_eq!(body["data"]["last_error"]["kind"], "invalid_amount");
}

#[tokio::test]
async fn test_auto_mint_unavailable_is_precondition_failure() {
    let (app, ledger) = build_app(true);
    ledger.set_cooldown(3600);
    call(&app, "POST", "/api/connect", None).await;

    let (status, body) = call(&app, "POST", "/api/auto-mint", None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "AUTO_MINT_UNAVAILABLE");
}

#[tokio::test]
async fn test_disconnect_and_info() {
    let (app, _ledger) = build_app(true);
    call(&app, "POST", "/api/connect", None).await;

    let (status, body) = call(&app, "POST", "/api/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "disconnected");

    let (status, body) = call(&app, "GET", "/api/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["max_tokens_per_day"], "50.0");

    let (status, body) = call(&app, "GET", "/api/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, _ledger) = build_app(true);
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("spout_session_connected"));

    let (disabled, _ledger) = build_app(false);
    let (status, _) = call(&disabled, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_force_auto_mint_requires_owner() {
    let (app, ledger) = build_app(true);
    call(&app, "POST", "/api/connect", None).await;

    let (status, body) = call(&app, "POST", "/api/force-auto-mint", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_OWNER");

    ledger.set_owner(user());
    let (status, body) = call(&app, "POST", "/api/force-auto-mint", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["receipt"]["kind"], "force_auto_mint");
}
