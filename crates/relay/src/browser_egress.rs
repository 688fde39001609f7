// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrap/broadcast helpers shared by every path that fans an event out to a
//! relay's browser subscribers (`spec.md` §4.3). These are plain functions
//! over an already-locked `RelayInner` rather than methods that take their
//! own lock, since every call site already holds the relay's mutex as part
//! of a larger atomic transition (`spec.md` §5).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::envelope::{Envelope, EventKind, SessionStatusPayload};
use crate::registry::RelayRegistry;
use crate::relay::{BrowserFrame, Relay, RelayInner};

/// Send an envelope to every currently-attached browser socket, skipping any
/// whose writer task has already gone away (`spec.md` §4.3 — no error on a
/// dead/closing socket).
pub fn send_to_all(inner: &RelayInner, envelope: &Envelope) {
    let text = envelope.to_text();
    for handle in inner.browsers.values() {
        handle.send(BrowserFrame::Text(text.clone()));
    }
}

/// Broadcast an envelope to every browser and retain it in the message
/// buffer for reconnect replay. This is the path nearly every container and
/// browser event takes (`spec.md` §4.2, §4.4, §4.6).
pub fn broadcast(inner: &mut RelayInner, envelope: Envelope) {
    send_to_all(inner, &envelope);
    inner.message_buffer.push(envelope);
}

/// Send a close frame to every browser and drop them from the subscriber
/// map. Used on relay teardown (`spec.md` §4.1 `remove`).
pub fn close_all(inner: &mut RelayInner, code: u16, reason: &str) {
    for (_, handle) in inner.browsers.drain() {
        handle.send(BrowserFrame::Close { code, reason: reason.to_string() });
    }
}

/// Attach a browser socket to the relay and return its freshly allocated
/// client id (`spec.md` §4.3 `addBrowserToSession`). The caller is
/// responsible for sending the immediate `session_status` snapshot and any
/// buffered replay before handing control to the socket's read loop.
pub fn add_browser(
    inner: &mut RelayInner,
    tx: tokio::sync::mpsc::UnboundedSender<BrowserFrame>,
) -> u64 {
    let id = inner.next_browser_id();
    inner.browsers.insert(id, crate::relay::BrowserHandle { tx });
    id
}

pub fn remove_browser(inner: &mut RelayInner, client_id: u64) {
    inner.browsers.remove(&client_id);
}

/// Current status snapshot as sent to a newly subscribed browser and on
/// every lifecycle transition (`spec.md` §4.3, §4.7).
pub fn status_snapshot(inner: &RelayInner) -> SessionStatusPayload {
    SessionStatusPayload {
        status: inner.derived_status().as_str().to_string(),
        initialized: inner.initialized,
        capabilities: inner.capabilities.clone(),
        startup_phase: inner.startup_phase.map(|p| p.as_str().to_string()),
        startup_timestamp: inner.startup_timestamp,
        pending_permissions: Some(inner.pending_permissions.summaries()),
    }
}

pub fn status_envelope(inner: &RelayInner) -> Envelope {
    let payload = serde_json::to_value(status_snapshot(inner)).unwrap_or(Value::Null);
    Envelope::new(EventKind::SessionStatus, payload)
}

/// Subscribe a browser socket to a session (`spec.md` §4.3
/// `addBrowserToSession`). Returns `None` if no Relay exists for
/// `session_id` — the caller is responsible for closing the socket in that
/// case. On success, sends the immediate status snapshot and, if
/// `last_event_id` names a still-retained buffer entry, every envelope after
/// it with `_buffered:true` stamped on, before returning the relay and the
/// freshly allocated client id for later unsubscribe.
pub async fn add_browser_to_session(
    registry: &RelayRegistry,
    session_id: &str,
    tx: mpsc::UnboundedSender<BrowserFrame>,
    last_event_id: Option<&str>,
) -> Option<(Arc<Relay>, u64)> {
    let relay = registry.get(session_id).await?;
    let client_id = {
        let mut inner = relay.inner.lock().await;
        let client_id = add_browser(&mut inner, tx.clone());

        let snapshot = status_envelope(&inner);
        let _ = tx.send(BrowserFrame::Text(snapshot.to_text()));

        if let Some(after_id) = last_event_id {
            if inner.message_buffer.contains(after_id) {
                for entry in inner.message_buffer.get_after(after_id) {
                    let buffered = entry.data.mark_buffered();
                    let _ = tx.send(BrowserFrame::Text(buffered.to_text()));
                }
            }
        }
        client_id
    };
    Some((relay, client_id))
}
