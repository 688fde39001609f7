// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept typed client requests on a browser socket, enforce session
//! ownership, and translate to container actions (`spec.md` §4.4). Grounded
//! on `coopmux`'s `transport::ws_mux::handle_client_input` — a generic
//! `{event, session, ...}` envelope parsed by field extraction and routed to
//! per-event effects — generalized here to the fixed `session_*` request set.

use std::sync::Arc;

use serde_json::Value;

use crate::container_ingress::try_send_to_container;
use crate::envelope::{
    Envelope, EventKind, SessionMessagePayload, SessionPermissionResolvedPayload,
};
use crate::persistence::{MessageKind, PersistenceSink};
use crate::browser_egress;
use crate::relay::{now_ms, Relay};

/// `handleBrowserMessage(sessionId, socket, raw, userId?)` (`spec.md` §4.4).
/// `user_id` is `None` in compat mode (pre-authenticated at the socket
/// level); `Some` enforces the ownership check.
pub async fn handle_browser_message(
    relay: &Arc<Relay>,
    raw: &str,
    user_id: Option<&str>,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let Ok(message) = serde_json::from_str::<Value>(raw) else {
        return;
    };
    if let Some(user_id) = user_id {
        if user_id != relay.user_id {
            return;
        }
    }

    let msg_type = message.get("type").and_then(Value::as_str).unwrap_or("");
    match msg_type {
        "session_user_message" => handle_user_message(relay, &message, persistence).await,
        "session_permission_response" => {
            handle_permission_response(relay, &message, persistence).await
        }
        "session_interrupt" => handle_interrupt(relay, persistence).await,
        "session_set_permission_mode" => {
            handle_set_permission_mode(relay, &message, persistence).await
        }
        "session_set_model" => handle_set_model(relay, &message, persistence).await,
        "session_update_env" => handle_update_env(relay, &message, persistence).await,
        _ => {}
    }
}

async fn handle_user_message(
    relay: &Arc<Relay>,
    message: &Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let content = message.get("content").and_then(Value::as_str).unwrap_or("");
    if content.is_empty() {
        return;
    }
    let frame = serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": content },
        "parent_tool_use_id": Value::Null,
        "session_id": relay.session_id,
    });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }

    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::User,
        serde_json::json!({ "content": content }),
        None,
    );

    let mut inner = relay.inner.lock().await;
    inner.last_activity_at = Some(now_ms());
    let payload = SessionMessagePayload {
        message_type: "user".to_string(),
        content: Value::String(content.to_string()),
        raw: None,
    };
    let envelope =
        Envelope::new(EventKind::SessionMessage, serde_json::to_value(payload).unwrap_or(Value::Null));
    browser_egress::broadcast(&mut inner, envelope);
    drop(inner);
    crate::persistence::spawn_touch_activity(persistence.clone(), relay.session_id.clone());
}

async fn handle_permission_response(
    relay: &Arc<Relay>,
    message: &Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let request_id = message.get("requestId").and_then(Value::as_str).unwrap_or("");
    let behavior = message.get("behavior").and_then(Value::as_str).unwrap_or("");

    let pending = {
        let mut inner = relay.inner.lock().await;
        inner.pending_permissions.take(request_id)
    };
    let Some(pending) = pending else {
        return;
    };

    let mut response = serde_json::json!({
        "behavior": behavior,
    });
    if behavior == "allow" {
        if let Value::Object(map) = &mut response {
            map.insert("updatedInput".to_string(), pending.input.clone());
        }
    }
    let frame = serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        },
    });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }

    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::PermissionResponse,
        serde_json::json!({ "content": format!("{behavior}: {}", pending.tool_name) }),
        Some(serde_json::json!({
            "requestId": request_id,
            "behavior": behavior,
            "toolName": pending.tool_name,
        })),
    );

    let mut inner = relay.inner.lock().await;
    let payload =
        SessionPermissionResolvedPayload { request_id: request_id.to_string(), behavior: behavior.to_string() };
    let envelope = Envelope::new(
        EventKind::SessionPermissionResolved,
        serde_json::to_value(payload).unwrap_or(Value::Null),
    );
    browser_egress::broadcast(&mut inner, envelope);
}

/// The browser-facing interrupt deliberately sends a synthesized user
/// message rather than the raw `{type:"interrupt"}` frame, which crashes the
/// container (`spec.md` §9 Open Question — preserve until the downstream is
/// confirmed fixed).
async fn handle_interrupt(relay: &Arc<Relay>, persistence: &Arc<dyn PersistenceSink>) {
    let frame = serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": "[Interrupt requested by user]" },
        "parent_tool_use_id": Value::Null,
        "session_id": relay.session_id,
    });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }

    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::System,
        serde_json::json!({ "content": "User interrupted session" }),
        None,
    );

    let mut inner = relay.inner.lock().await;
    let payload = SessionMessagePayload {
        message_type: "system".to_string(),
        content: Value::String("Interrupt requested".to_string()),
        raw: None,
    };
    let envelope =
        Envelope::new(EventKind::SessionMessage, serde_json::to_value(payload).unwrap_or(Value::Null));
    browser_egress::broadcast(&mut inner, envelope);
}

async fn handle_set_permission_mode(
    relay: &Arc<Relay>,
    message: &Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let mode = message.get("permissionMode").and_then(Value::as_str).unwrap_or("");
    let frame = serde_json::json!({ "type": "set_permission_mode", "permission_mode": mode });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::System,
        serde_json::json!({ "content": format!("Permission mode set to: {mode}") }),
        Some(serde_json::json!({ "mode": mode })),
    );
}

async fn handle_set_model(
    relay: &Arc<Relay>,
    message: &Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let model = message.get("model").and_then(Value::as_str).unwrap_or("");
    let frame = serde_json::json!({ "type": "set_model", "model": model });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::System,
        serde_json::json!({ "content": format!("Model set to: {model}") }),
        Some(serde_json::json!({ "model": model })),
    );
}

async fn handle_update_env(
    relay: &Arc<Relay>,
    message: &Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let env = message.get("environmentVariables").cloned().unwrap_or(Value::Null);
    let keys: Vec<String> = match &env {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };
    let frame =
        serde_json::json!({ "type": "update_environment_variables", "environment_variables": env });
    if !try_send_to_container(relay, format!("{frame}\n")).await {
        return;
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::System,
        serde_json::json!({ "content": "Environment variables updated" }),
        Some(serde_json::json!({ "variableKeys": keys })),
    );
}

#[cfg(test)]
#[path = "browser_ingress_tests.rs"]
mod tests;
