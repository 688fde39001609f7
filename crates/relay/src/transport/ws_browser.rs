// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /ws/browser/{id}` — the browser-side envelope WebSocket subscribe
//! point (`spec.md` §4.3 `addBrowserToSession`, §4.4 `handleBrowserMessage`).
//! Grounded on the teacher's (`coopmux`) `transport::ws::handle_ws`: split
//! reader/writer over a per-client mpsc channel fed by the aggregate's
//! broadcast fan-out.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::browser_egress;
use crate::browser_ingress;
use crate::relay::BrowserFrame;
use crate::state::AppState;
use crate::transport::auth;

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserWsQuery {
    pub token: Option<String>,
    /// The owning user's identity. Omitted means compat mode — the socket
    /// was pre-authenticated by the caller and no ownership check runs
    /// (`spec.md` §4.4).
    pub user_id: Option<String>,
    pub last_event_id: Option<String>,
}

/// `GET /ws/browser/{id}`.
pub async fn ws_browser_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<BrowserWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_token_param(query.token.as_deref(), state.config.auth_token.as_deref())
        .is_err()
    {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state, session_id, query)).into_response()
}

async fn handle_ws(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    query: BrowserWsQuery,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some((relay, client_id)) = browser_egress::add_browser_to_session(
        &state.registry,
        &session_id,
        tx,
        query.last_event_id.as_deref(),
    )
    .await
    else {
        tracing::warn!(session_id = %session_id, "browser subscribe to unknown session");
        let _ = ws_tx.close().await;
        return;
    };

    tracing::info!(session_id = %session_id, "browser subscribed");

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(BrowserFrame::Text(text)) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(BrowserFrame::Close { .. }) | None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        browser_ingress::handle_browser_message(
                            &relay,
                            &text,
                            query.user_id.as_deref(),
                            &state.persistence,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    {
        let mut inner = relay.inner.lock().await;
        browser_egress::remove_browser(&mut inner, client_id);
    }
    tracing::info!(session_id = %relay.session_id, "browser unsubscribed");
}
