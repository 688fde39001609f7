// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: the thinnest possible shim over the Relay Registry/Relay
//! API (`SPEC_FULL.md` §1 AMBIENT) — register/create a session, fetch its
//! status snapshot, and remove it. Liveness has its own unauthenticated
//! route.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::browser_egress;
use crate::error::RelayError;
use crate::relay::RelayOptions;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
}

/// `GET /healthz` — liveness, no auth.
pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_owned(), session_count: state.registry.len().await })
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Caller-supplied session id. Generated with `uuid::Uuid::new_v4` when
    /// omitted — the id itself is opaque, per `spec.md` §3.
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub initial_prompt: Option<String>,
    #[serde(default)]
    pub worker_context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
}

/// `POST /api/v1/sessions` — `getOrCreate` (`spec.md` §4.1).
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let session_id = req.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let options =
        RelayOptions { initial_prompt: req.initial_prompt, worker_context: req.worker_context };
    let relay = state
        .registry
        .get_or_create(&session_id, &req.user_id, options, state.config.buffer_capacity)
        .await;
    tracing::info!(session_id = %relay.session_id, user_id = %relay.user_id, "session created");
    Json(SessionResponse { session_id: relay.session_id.clone(), user_id: relay.user_id.clone() })
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub status: crate::envelope::SessionStatusPayload,
}

/// `GET /api/v1/sessions/{id}` — current status snapshot.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Some(relay) = state.registry.get(&session_id).await else {
        return RelayError::SessionNotFound.to_response("session not found").into_response();
    };
    let inner = relay.inner.lock().await;
    let status = browser_egress::status_snapshot(&inner);
    Json(SessionStatusResponse { session_id, user_id: relay.user_id.clone(), status }).into_response()
}

#[derive(Debug, Serialize)]
pub struct RemoveSessionResponse {
    pub session_id: String,
    pub removed: bool,
}

/// `DELETE /api/v1/sessions/{id}` — `remove` (`spec.md` §4.1).
pub async fn remove_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let removed = state.registry.remove(&session_id, state.persistence.as_ref()).await.is_some();
    if removed {
        tracing::info!(session_id = %session_id, "session removed");
    }
    Json(RemoveSessionResponse { session_id, removed })
}
