// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: the thinnest possible shim over the Relay
//! Registry/Relay API (`spec.md` §1, `SPEC_FULL.md` §1 AMBIENT).

pub mod auth;
pub mod http;
pub mod ws_browser;
pub mod ws_container;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all relayd routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz))
        .route("/api/v1/sessions", post(http::create_session))
        .route("/api/v1/sessions/{id}", get(http::get_session).delete(http::remove_session))
        .route("/ws/container/{id}", get(ws_container::ws_container_handler))
        .route("/ws/browser/{id}", get(ws_browser::ws_browser_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::http_auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
