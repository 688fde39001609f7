// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide table mapping session id to `Relay` (`spec.md` §4.1).
//! Grounded on `coopmux`'s `MuxState.sessions: RwLock<HashMap<String,
//! Arc<SessionEntry>>>` — the lock here guards only the table, never a
//! relay's internal state, so registry operations on distinct sessions never
//! contend with each other or with any relay's own mutex (`spec.md` §5).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::envelope::{Envelope, EventKind, SessionStatusPayload};
use crate::relay::{ContainerFrame, Relay, RelayOptions, SessionStatus};
use crate::{browser_egress, persistence::PersistenceSink};

#[derive(Default)]
pub struct RelayRegistry {
    relays: RwLock<HashMap<String, Arc<Relay>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing Relay for `session_id` if any; otherwise
    /// constructs one. Idempotent: two concurrent calls for the same id
    /// resolve to the same `Relay` (`spec.md` §4.1, §8).
    pub async fn get_or_create(
        &self,
        session_id: &str,
        user_id: &str,
        options: RelayOptions,
        buffer_capacity: usize,
    ) -> Arc<Relay> {
        if let Some(relay) = self.get(session_id).await {
            return relay;
        }
        let mut relays = self.relays.write().await;
        if let Some(relay) = relays.get(session_id) {
            return relay.clone();
        }
        let relay = Relay::new(session_id.to_string(), user_id.to_string(), options, buffer_capacity);
        relays.insert(session_id.to_string(), relay.clone());
        relay
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Relay>> {
        self.relays.read().await.get(session_id).cloned()
    }

    /// Snapshot of every currently registered Relay, for the startup
    /// watchdog to scan without holding the registry lock for the duration
    /// of the scan (`spec.md` §9).
    pub async fn snapshot(&self) -> Vec<Arc<Relay>> {
        self.relays.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.relays.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.relays.read().await.is_empty()
    }

    /// Closes the container socket with code 1000/"Relay removed", sends a
    /// terminal `session_status` (status=stopped) to every browser followed
    /// by a close, then drops the entry. Synchronous with respect to the
    /// caller: once this returns, no further events for the session are
    /// emitted (`spec.md` §4.1, §8).
    pub async fn remove(
        &self,
        session_id: &str,
        persistence: &dyn PersistenceSink,
    ) -> Option<Arc<Relay>> {
        let relay = { self.relays.write().await.remove(session_id)? };
        {
            let mut inner = relay.inner.lock().await;
            if let Some(container) = inner.container.take() {
                let _ = container.tx.send(ContainerFrame::Close {
                    code: 1000,
                    reason: "Relay removed".to_string(),
                });
            }
            let payload = SessionStatusPayload {
                status: SessionStatus::Stopped.as_str().to_string(),
                initialized: inner.initialized,
                capabilities: inner.capabilities.clone(),
                startup_phase: None,
                startup_timestamp: None,
                pending_permissions: None,
            };
            let payload_value = serde_json::to_value(payload).unwrap_or(Value::Null);
            let envelope = Envelope::new(EventKind::SessionStatus, payload_value);
            browser_egress::send_to_all(&inner, &envelope);
            browser_egress::close_all(&mut inner, 1000, "Relay removed");
        }
        persistence.record_status(session_id, SessionStatus::Stopped, Value::Null).await;
        Some(relay)
    }

    /// Test-only: removes all relays without the socket-teardown dance.
    pub async fn reset(&self) {
        self.relays.write().await.clear();
    }

    /// Remove a table entry without touching its sockets. Used by the
    /// startup watchdog, which performs its own teardown of the relay's
    /// internal state before dropping the table entry (`spec.md` §9).
    pub async fn drop_entry(&self, session_id: &str) -> Option<Arc<Relay>> {
        self.relays.write().await.remove(session_id)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
