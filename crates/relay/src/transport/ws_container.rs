// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /ws/container/{id}` — the container-side NDJSON WebSocket attach
//! point (`spec.md` §4.2 `attachContainer`). Grounded on the teacher's
//! (`coopmux`) `upstream::bridge::WsBridge::run_loop`: a split
//! reader/writer pair driven by `tokio::select!`, generalized from "relay
//! one upstream PTY stream" to "relay one container's NDJSON frames,
//! dispatching each parsed line against the Relay".

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::container_ingress;
use crate::relay::ContainerFrame;
use crate::state::AppState;
use crate::transport::auth;

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerWsQuery {
    pub token: Option<String>,
}

/// `GET /ws/container/{id}`.
pub async fn ws_container_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<ContainerWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_token_param(query.token.as_deref(), state.config.auth_token.as_deref())
        .is_err()
    {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state, session_id)).into_response()
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let Some((relay, generation, rx)) =
        container_ingress::attach_container(&state.registry, &session_id).await
    else {
        tracing::warn!(session_id = %session_id, "container attach to unknown session");
        let (mut ws_tx, _ws_rx) = socket.split();
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: 4004,
                reason: "Unknown session".into(),
            })))
            .await;
        return;
    };

    tracing::info!(session_id = %session_id, "container attached");
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rx = rx;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(ContainerFrame::Text(text)) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(ContainerFrame::Close { code, reason }) => {
                        let _ = ws_tx
                            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for value in container_ingress::parse_ndjson(&text) {
                            container_ingress::dispatch_message(&relay, value, &state.persistence)
                                .await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    container_ingress::handle_disconnect(&relay, generation, &state.persistence).await;
    tracing::info!(session_id = %relay.session_id, "container detached");
}
