// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attach a container socket to a Relay, parse its NDJSON output, and
//! dispatch by `type` (`spec.md` §4.2). Grounded on `coopmux`'s
//! `upstream::bridge::WsBridge::run_loop` — one upstream connection pushing
//! events that get fanned out and correlated against client-originated
//! requests — generalized here to "one container, broadcast to N browsers,
//! plus a permission-response correlation table keyed by request id".

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::envelope::{
    Envelope, EventKind, SessionControlPayload, SessionMessagePayload,
    SessionPermissionRequestPayload, SessionRawPayload, SessionResultPayload,
};
use crate::permissions::PendingPermission;
use crate::persistence::{MessageKind, PersistenceSink};
use crate::registry::RelayRegistry;
use crate::relay::{
    now_ms, Capabilities, ContainerFrame, ContainerHandle, Relay, ResultStats, SessionStatus,
    StartupPhase,
};
use crate::browser_egress;

/// `attachContainer(sessionId, socket)` (`spec.md` §4.2). Returns `None` if
/// no Relay exists for `session_id` — the caller must close the socket with
/// code 4004 ("Unknown session") in that case. On success, returns the
/// Relay, the new container generation (for disconnect correlation), and
/// the receiver side of the channel the writer task should drain.
pub async fn attach_container(
    registry: &RelayRegistry,
    session_id: &str,
) -> Option<(Arc<Relay>, u64, mpsc::UnboundedReceiver<ContainerFrame>)> {
    let relay = registry.get(session_id).await?;
    let (tx, rx) = mpsc::unbounded_channel();
    let generation = {
        let mut inner = relay.inner.lock().await;
        if let Some(prior) = inner.container.take() {
            let _ = prior.tx.send(ContainerFrame::Close {
                code: 1000,
                reason: "Replaced".to_string(),
            });
        }
        let generation = inner.next_container_generation();
        inner.container = Some(ContainerHandle { tx, generation });
        inner.startup_phase = Some(StartupPhase::Initializing);
        inner.startup_timestamp = Some(now_ms());

        let envelope = browser_egress::status_envelope(&inner);
        browser_egress::broadcast(&mut inner, envelope);
        generation
    };
    Some((relay, generation, rx))
}

/// Split one WebSocket text frame into NDJSON lines and parse each
/// independently; malformed lines are skipped without aborting the frame
/// (`spec.md` §4.2).
pub fn parse_ndjson(frame: &str) -> Vec<Value> {
    frame
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

/// Dispatch a single parsed container message against a relay, already
/// resolved by the caller (`spec.md` §4.2 dispatch table).
pub async fn dispatch_message(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let msg_type = message.get("type").and_then(Value::as_str).unwrap_or("");

    match msg_type {
        "system" if message.get("subtype").and_then(Value::as_str) == Some("init") => {
            handle_system_init(relay, message, persistence).await;
        }
        "assistant" => handle_assistant(relay, message, persistence).await,
        "stream_event" => handle_stream_event(relay, message).await,
        "control_request" => {
            match message.get("request").and_then(|r| r.get("subtype")).and_then(Value::as_str) {
                Some("can_use_tool") => handle_can_use_tool(relay, message, persistence).await,
                Some("hook_callback") => handle_hook_callback(relay, message, persistence).await,
                _ => handle_raw(relay, message).await,
            }
        }
        "tool_progress" => handle_tool_progress(relay, message).await,
        "result" => handle_result(relay, message, persistence).await,
        "keep_alive" => handle_keep_alive(relay, persistence).await,
        "auth_status" => handle_auth_status(relay, message).await,
        "tool_use_summary" => handle_tool_use_summary(relay, message, persistence).await,
        _ => handle_raw(relay, message).await,
    }
}

async fn handle_system_init(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let capabilities = Capabilities {
        cwd: str_field(&message, "cwd"),
        model: str_field(&message, "model"),
        tools: string_array(&message, "tools"),
        mcp_servers: string_array(&message, "mcp_servers"),
        permission_mode: str_field(&message, "permission_mode"),
        claude_code_version: str_field(&message, "claude_code_version"),
    };

    let initial_prompt = {
        let mut inner = relay.inner.lock().await;
        inner.capabilities = Some(capabilities.clone());
        inner.initialized = true;
        inner.startup_phase = None;

        let envelope = browser_egress::status_envelope(&inner);
        browser_egress::broadcast(&mut inner, envelope);
        relay.options.initial_prompt.clone()
    };

    let extra = serde_json::to_value(&capabilities).unwrap_or(Value::Null);
    crate::persistence::spawn_record_status(
        persistence.clone(),
        relay.session_id.clone(),
        SessionStatus::Active,
        extra,
    );

    if let Some(prompt) = initial_prompt {
        send_initial_prompt(relay, &prompt, persistence).await;
    }
}

async fn send_initial_prompt(
    relay: &Arc<Relay>,
    prompt: &str,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let frame = serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": prompt },
        "parent_tool_use_id": Value::Null,
        "session_id": relay.session_id,
    });
    send_to_container(relay, frame.to_string()).await;
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::User,
        serde_json::json!({ "content": prompt }),
        None,
    );
}

async fn handle_assistant(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let content = message.get("content").cloned().unwrap_or(Value::Null);
    {
        let mut inner = relay.inner.lock().await;
        inner.last_activity_at = Some(now_ms());
        let payload = SessionMessagePayload {
            message_type: "assistant".to_string(),
            content: content.clone(),
            raw: Some(message.clone()),
        };
        let envelope = Envelope::new(
            EventKind::SessionMessage,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
        browser_egress::broadcast(&mut inner, envelope);
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::Assistant,
        serde_json::json!({ "type": "assistant", "content": content }),
        None,
    );
    crate::persistence::spawn_touch_activity(persistence.clone(), relay.session_id.clone());
}

async fn handle_stream_event(relay: &Arc<Relay>, message: Value) {
    let event = message.get("event").cloned().unwrap_or_else(|| message.clone());
    let mut inner = relay.inner.lock().await;
    let envelope = Envelope::new(EventKind::SessionStream, serde_json::json!({ "event": event }));
    browser_egress::broadcast(&mut inner, envelope);
}

async fn handle_can_use_tool(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let request_id = str_field(&message, "request_id");
    let request = message.get("request").cloned().unwrap_or(Value::Null);
    let tool_name = str_field(&request, "tool_name");
    let input = request.get("input").cloned().unwrap_or(Value::Null);
    let tool_use_id = request.get("tool_use_id").and_then(Value::as_str).map(str::to_string);
    let decision_reason =
        request.get("decision_reason").and_then(Value::as_str).map(str::to_string);

    {
        let mut inner = relay.inner.lock().await;
        inner.pending_permissions.insert(PendingPermission {
            request_id: request_id.clone(),
            tool_name: tool_name.clone(),
            tool_use_id: tool_use_id.clone(),
            input: input.clone(),
            decision_reason: decision_reason.clone(),
        });
        let payload = SessionPermissionRequestPayload {
            request_id: request_id.clone(),
            tool_name: tool_name.clone(),
            input: input.clone(),
            decision_reason: decision_reason.clone(),
        };
        let envelope = Envelope::new(
            EventKind::SessionPermissionRequest,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
        browser_egress::broadcast(&mut inner, envelope);
    }

    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::PermissionRequest,
        serde_json::json!({ "requestId": request_id, "toolName": tool_name }),
        Some(serde_json::json!({
            "requestId": request_id,
            "toolName": tool_name,
            "toolUseId": tool_use_id,
            "decisionReason": decision_reason,
        })),
    );
}

async fn handle_hook_callback(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let request_id = str_field(&message, "request_id");
    {
        let mut inner = relay.inner.lock().await;
        let payload = SessionControlPayload { subtype: "hook_callback".to_string() };
        let envelope = Envelope::new(
            EventKind::SessionControl,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
        browser_egress::broadcast(&mut inner, envelope);
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::System,
        serde_json::json!({ "subtype": "hook_callback" }),
        Some(serde_json::json!({ "requestId": request_id })),
    );
}

async fn handle_tool_progress(relay: &Arc<Relay>, message: Value) {
    let mut inner = relay.inner.lock().await;
    let envelope = Envelope::new(EventKind::SessionToolProgress, message);
    browser_egress::broadcast(&mut inner, envelope);
}

async fn handle_result(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let result_type = str_field(&message, "result_type");
    let usage = message.get("usage").cloned().unwrap_or(Value::Null);
    let stats = ResultStats {
        duration_ms: message.get("duration_ms").and_then(Value::as_u64),
        cost_usd: message.get("cost_usd").and_then(Value::as_f64),
        input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
        output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
        result_type: result_type.clone(),
    };

    {
        let mut inner = relay.inner.lock().await;
        inner.result_stats = Some(stats.clone());
        let payload = SessionResultPayload {
            duration_ms: stats.duration_ms,
            cost_usd: stats.cost_usd,
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            total_tokens: stats.total_tokens,
            result_type: stats.result_type.clone(),
        };
        let envelope = Envelope::new(
            EventKind::SessionResult,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
        browser_egress::broadcast(&mut inner, envelope);
    }

    let stats_value = serde_json::to_value(&stats).unwrap_or(Value::Null);
    if result_type == "success" {
        crate::persistence::spawn_record_status(
            persistence.clone(),
            relay.session_id.clone(),
            SessionStatus::Active,
            stats_value,
        );
    } else if result_type.starts_with("error_")
        || result_type == "error_during_execution"
        || result_type == "error_max_turns"
    {
        let error = message
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| result_type.clone());
        let mut extra = stats_value;
        if let Value::Object(map) = &mut extra {
            map.insert("error".to_string(), Value::String(error));
        }
        relay.inner.lock().await.last_error = Some(result_type.clone());
        crate::persistence::spawn_record_status(
            persistence.clone(),
            relay.session_id.clone(),
            SessionStatus::Errored,
            extra,
        );
    }
}

async fn handle_keep_alive(relay: &Arc<Relay>, persistence: &Arc<dyn PersistenceSink>) {
    relay.inner.lock().await.last_activity_at = Some(now_ms());
    crate::persistence::spawn_touch_activity(persistence.clone(), relay.session_id.clone());
}

async fn handle_auth_status(relay: &Arc<Relay>, message: Value) {
    let mut inner = relay.inner.lock().await;
    let envelope = Envelope::new(EventKind::SessionAuthStatus, message);
    browser_egress::broadcast(&mut inner, envelope);
}

async fn handle_tool_use_summary(
    relay: &Arc<Relay>,
    message: Value,
    persistence: &Arc<dyn PersistenceSink>,
) {
    {
        let mut inner = relay.inner.lock().await;
        let envelope = Envelope::new(EventKind::SessionToolUseSummary, message.clone());
        browser_egress::broadcast(&mut inner, envelope);
    }
    crate::persistence::spawn_record_message(
        persistence.clone(),
        relay.session_id.clone(),
        MessageKind::ToolUse,
        message,
        None,
    );
}

async fn handle_raw(relay: &Arc<Relay>, message: Value) {
    let mut inner = relay.inner.lock().await;
    let payload = SessionRawPayload { message };
    let envelope =
        Envelope::new(EventKind::SessionRaw, serde_json::to_value(payload).unwrap_or(Value::Null));
    browser_egress::broadcast(&mut inner, envelope);
}

/// `onClose` for the container socket (`spec.md` §4.2). `generation` is the
/// value captured when the socket was attached; if the relay's current
/// container generation has since moved on (a newer socket replaced this
/// one), this is a stale callback and must not clear the newer attachment.
pub async fn handle_disconnect(
    relay: &Arc<Relay>,
    generation: u64,
    persistence: &Arc<dyn PersistenceSink>,
) {
    let was_initializing = {
        let mut inner = relay.inner.lock().await;
        let current_generation = inner.container.as_ref().map(|c| c.generation);
        if current_generation != Some(generation) {
            return;
        }
        inner.container = None;
        let was_initializing = inner.startup_phase == Some(StartupPhase::Initializing);
        if was_initializing {
            inner.startup_phase = Some(StartupPhase::Failed);
            inner.last_error = Some("Container disconnected during startup".to_string());
        }
        let envelope = browser_egress::status_envelope(&inner);
        browser_egress::broadcast(&mut inner, envelope);
        was_initializing
    };
    if was_initializing {
        crate::persistence::spawn_record_status(
            persistence.clone(),
            relay.session_id.clone(),
            SessionStatus::Errored,
            serde_json::json!({ "error": "Container disconnected during startup" }),
        );
    } else {
        crate::persistence::spawn_record_status(
            persistence.clone(),
            relay.session_id.clone(),
            SessionStatus::Stopped,
            Value::Null,
        );
    }
}

/// Send a raw NDJSON line to the container's writer task, if attached.
pub async fn send_to_container(relay: &Arc<Relay>, line: String) {
    let _ = try_send_to_container(relay, line).await;
}

/// Attempt to send a raw NDJSON line to the container's writer task.
/// Returns `false` if no container is attached or its writer task has
/// already gone away — the mpsc-send-failure-as-readiness-check used
/// throughout this crate in place of tracking ready-state explicitly
/// (`spec.md` §4.4 "fail-closed if the container socket is missing or not
/// OPEN").
pub async fn try_send_to_container(relay: &Arc<Relay>, line: String) -> bool {
    let inner = relay.inner.lock().await;
    match inner.container.as_ref() {
        Some(container) => container.tx.send(ContainerFrame::Text(line)).is_ok(),
        None => false,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "container_ingress_tests.rs"]
mod tests;
