// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The browser-facing wire envelope `{type, payload, timestamp}` and its
//! closed set of event kinds (`spec.md` §6). Modeled as a tagged variant
//! rather than a flat struct with a string `type` field so that adding a
//! kind without a matching call site is a compile error, per `spec.md`
//! §REDESIGN FLAGS ("typed event set instead of dynamic dispatch").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permissions::PendingPermissionSummary;
use crate::relay::{now_rfc3339, Capabilities};

/// The closed set of `type` values a browser socket can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStatus,
    SessionMessage,
    SessionStream,
    SessionPermissionRequest,
    SessionPermissionResolved,
    SessionControl,
    SessionToolProgress,
    SessionResult,
    SessionAuthStatus,
    SessionToolUseSummary,
    SessionRaw,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStatus => "session_status",
            Self::SessionMessage => "session_message",
            Self::SessionStream => "session_stream",
            Self::SessionPermissionRequest => "session_permission_request",
            Self::SessionPermissionResolved => "session_permission_resolved",
            Self::SessionControl => "session_control",
            Self::SessionToolProgress => "session_tool_progress",
            Self::SessionResult => "session_result",
            Self::SessionAuthStatus => "session_auth_status",
            Self::SessionToolUseSummary => "session_tool_use_summary",
            Self::SessionRaw => "session_raw",
        }
    }
}

/// A fully-formed outbound envelope, ready to serialize onto a browser
/// socket or to drop into the message buffer.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: EventKind,
    pub payload: Value,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload, timestamp: now_rfc3339() }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.kind.as_str(),
            "payload": self.payload,
            "timestamp": self.timestamp,
        })
    }

    /// Serialized NDJSON-ready text (no trailing newline — the writer task
    /// frames it as a single WebSocket text message, not a stream).
    pub fn to_text(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }

    /// A copy with `_buffered: true` stamped into the payload, for reconnect
    /// replay (`spec.md` §4.6, §4.3).
    pub fn mark_buffered(&self) -> Envelope {
        let mut payload = self.payload.clone();
        if let Value::Object(map) = &mut payload {
            map.insert("_buffered".to_string(), Value::Bool(true));
        }
        Envelope { kind: self.kind, payload, timestamp: self.timestamp.clone() }
    }
}

/// `session_status` payload. Reused both for lifecycle-transition broadcasts
/// (a subset of fields set) and for the immediate snapshot sent to a newly
/// subscribed browser (all fields set) — `spec.md` §4.3, §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusPayload {
    pub status: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_permissions: Option<Vec<PendingPermissionSummary>>,
}

/// `session_message` payload (`spec.md` §4.2, §4.4).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessagePayload {
    pub message_type: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// `session_permission_request` payload (`spec.md` §4.2).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPermissionRequestPayload {
    pub request_id: String,
    pub tool_name: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
}

/// `session_permission_resolved` payload (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPermissionResolvedPayload {
    pub request_id: String,
    pub behavior: String,
}

/// `session_result` payload (`spec.md` §4.2).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResultPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    pub result_type: String,
}

/// `session_control` payload (`spec.md` §4.2, `control_request` with
/// `subtype=hook_callback`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionControlPayload {
    pub subtype: String,
}

/// `session_raw` payload — the catch-all for any container `type` not in
/// the closed dispatch table (`spec.md` §4.2).
#[derive(Debug, Clone, Serialize)]
pub struct SessionRawPayload {
    pub message: Value,
}
