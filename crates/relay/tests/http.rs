// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the relay HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use axum_test::TestServer;

use relayd::config::RelayConfig;
use relayd::persistence::NullSink;
use relayd::state::AppState;
use relayd::transport::build_router;

fn test_config() -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: None,
        buffer_capacity: 16,
        watchdog_interval_ms: 15_000,
        startup_deadline_ms: 180_000,
        log_persistence: false,
    }
}

fn test_state() -> Arc<AppState> {
    AppState::new(test_config(), Arc::new(NullSink))
}

fn test_server(state: Arc<AppState>) -> TestServer {
    let router = build_router(state);
    TestServer::new(router).expect("failed to create test server")
}

#[tokio::test]
async fn healthz_reports_session_count() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state));

    let resp = server.get("/healthz").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_count"], 0);

    state.registry.get_or_create("s1", "alice", Default::default(), 16).await;
    let resp = server.get("/healthz").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["session_count"], 1);
    Ok(())
}

#[tokio::test]
async fn create_session_generates_id_when_omitted() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state));

    let resp = server
        .post("/api/v1/sessions")
        .json(&serde_json::json!({ "user_id": "alice" }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let session_id = body["session_id"].as_str().expect("session_id present");
    assert!(!session_id.is_empty());
    assert_eq!(body["user_id"], "alice");

    assert!(state.registry.get(session_id).await.is_some());
    Ok(())
}

#[tokio::test]
async fn create_session_is_idempotent_for_same_id() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state));

    let resp = server
        .post("/api/v1/sessions")
        .json(&serde_json::json!({ "session_id": "s1", "user_id": "alice" }))
        .await;
    resp.assert_status_ok();

    let resp = server
        .post("/api/v1/sessions")
        .json(&serde_json::json!({ "session_id": "s1", "user_id": "alice" }))
        .await;
    resp.assert_status_ok();

    assert_eq!(state.registry.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn get_session_returns_status_snapshot() -> anyhow::Result<()> {
    let state = test_state();
    state.registry.get_or_create("s1", "alice", Default::default(), 16).await;
    let server = test_server(Arc::clone(&state));

    let resp = server.get("/api/v1/sessions/s1").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["userId"], "alice");
    assert_eq!(body["status"], "starting");
    assert_eq!(body["initialized"], false);
    Ok(())
}

#[tokio::test]
async fn get_session_missing_returns_404() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(state);

    let resp = server.get("/api/v1/sessions/nope").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn remove_session_reports_whether_it_existed() -> anyhow::Result<()> {
    let state = test_state();
    state.registry.get_or_create("s1", "alice", Default::default(), 16).await;
    let server = test_server(Arc::clone(&state));

    let resp = server.delete("/api/v1/sessions/s1").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["removed"], true);
    assert!(state.registry.get("s1").await.is_none());

    let resp = server.delete("/api/v1/sessions/s1").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["removed"], false);
    Ok(())
}

#[tokio::test]
async fn bearer_token_required_when_configured() -> anyhow::Result<()> {
    let mut config = test_config();
    config.auth_token = Some("secret".to_string());
    let state = AppState::new(config, Arc::new(NullSink));
    let server = test_server(Arc::clone(&state));

    let resp = server
        .post("/api/v1/sessions")
        .json(&serde_json::json!({ "user_id": "alice" }))
        .await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/api/v1/sessions")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer secret")
        .json(&serde_json::json!({ "user_id": "alice" }))
        .await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn healthz_is_exempt_from_auth() -> anyhow::Result<()> {
    let mut config = test_config();
    config.auth_token = Some("secret".to_string());
    let state = AppState::new(config, Arc::new(NullSink));
    let server = test_server(state);

    let resp = server.get("/healthz").await;
    resp.assert_status_ok();
    Ok(())
}
