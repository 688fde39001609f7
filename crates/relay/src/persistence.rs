// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget persistence sink (`spec.md` §4, "Persistence Hook").
//!
//! The real store (Mongo, in the system this crate is modeled on) is an
//! external collaborator and out of scope. This module only pins down the
//! trait boundary the Relay calls through, plus a couple of stand-ins used
//! in tests and as the crate's default.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::relay::SessionStatus;

/// What kind of message is being persisted. Mirrors the message types the
/// Container/Browser Ingress paths produce (`spec.md` §4.2, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Assistant,
    User,
    System,
    PermissionRequest,
    PermissionResponse,
    ToolUse,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::System => "system",
            Self::PermissionRequest => "permission_request",
            Self::PermissionResponse => "permission_response",
            Self::ToolUse => "tool_use",
        }
    }
}

/// The three persistence operations the Relay drives. All are fire-and-forget
/// from the Relay's point of view: callers spawn the call and never await its
/// result on the ingress/egress hot path (`spec.md` §5).
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_status(&self, session_id: &str, status: SessionStatus, extra: Value);
    async fn record_message(
        &self,
        session_id: &str,
        kind: MessageKind,
        content: Value,
        metadata: Option<Value>,
    );
    async fn touch_activity(&self, session_id: &str);
}

/// Fire off a status persist without awaiting it on the caller's path
/// (`spec.md` §5 — "must not suspend the ingress path"). Mirrors the
/// teacher's `tokio::spawn(async move { ... })` idiom for detached,
/// best-effort side effects throughout `health.rs`/`bridge.rs`.
pub fn spawn_record_status(
    sink: Arc<dyn PersistenceSink>,
    session_id: String,
    status: SessionStatus,
    extra: Value,
) {
    tokio::spawn(async move { sink.record_status(&session_id, status, extra).await });
}

pub fn spawn_record_message(
    sink: Arc<dyn PersistenceSink>,
    session_id: String,
    kind: MessageKind,
    content: Value,
    metadata: Option<Value>,
) {
    tokio::spawn(async move { sink.record_message(&session_id, kind, content, metadata).await });
}

pub fn spawn_touch_activity(sink: Arc<dyn PersistenceSink>, session_id: String) {
    tokio::spawn(async move { sink.touch_activity(&session_id).await });
}

/// No-op sink. Default for tests and for deployments with no durable store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record_status(&self, _session_id: &str, _status: SessionStatus, _extra: Value) {}
    async fn record_message(
        &self,
        _session_id: &str,
        _kind: MessageKind,
        _content: Value,
        _metadata: Option<Value>,
    ) {
    }
    async fn touch_activity(&self, _session_id: &str) {}
}

/// Sink that persists by logging a structured record. Stands in for "some
/// durable store exists but is out of scope" when a project wants to see
/// the persisted stream without wiring up a real database.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl PersistenceSink for LoggingSink {
    async fn record_status(&self, session_id: &str, status: SessionStatus, extra: Value) {
        tracing::info!(session_id, status = status.as_str(), %extra, "session status persisted");
    }

    async fn record_message(
        &self,
        session_id: &str,
        kind: MessageKind,
        content: Value,
        metadata: Option<Value>,
    ) {
        tracing::info!(
            session_id,
            kind = kind.as_str(),
            %content,
            metadata = ?metadata,
            "message persisted"
        );
    }

    async fn touch_activity(&self, session_id: &str) {
        tracing::debug!(session_id, "activity touched");
    }
}
