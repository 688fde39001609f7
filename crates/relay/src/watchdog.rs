// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup-deadline enforcement, modeled as an external collaborator of the
//! Relay rather than a responsibility of the Relay itself (`spec.md` §9
//! Open Question: "there is an implementation-defined container-startup
//! deadline... the Relay itself does not enforce this timer"). Grounded on
//! `coopmux`'s `upstream::health::spawn_health_checker` — a periodic
//! `tokio::select!` scan that evicts entries past a failure threshold,
//! generalized here from "N consecutive failed health checks" to "stuck in
//! `initializing` longer than the configured deadline".

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser_egress;
use crate::persistence::PersistenceSink;
use crate::registry::RelayRegistry;
use crate::relay::{now_ms, SessionStatus, StartupPhase};

/// Spawn the watchdog task. Returns a handle the caller can await on
/// shutdown; the task itself exits when `shutdown` is cancelled.
pub fn spawn(
    registry: Arc<RelayRegistry>,
    persistence: Arc<dyn PersistenceSink>,
    scan_interval: Duration,
    startup_deadline: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(scan_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            scan_once(&registry, &persistence, startup_deadline).await;
        }
    })
}

async fn scan_once(
    registry: &Arc<RelayRegistry>,
    persistence: &Arc<dyn PersistenceSink>,
    startup_deadline: Duration,
) {
    let deadline_ms = startup_deadline.as_millis() as i64;
    for relay in registry.snapshot().await {
        let stuck = {
            let inner = relay.inner.lock().await;
            inner.startup_phase == Some(StartupPhase::Initializing)
                && inner.startup_timestamp.is_some_and(|started| now_ms() - started > deadline_ms)
        };
        if !stuck {
            continue;
        }

        {
            let mut inner = relay.inner.lock().await;
            // Re-check under lock: a late `system/init` may have arrived
            // since the snapshot above was taken.
            if inner.startup_phase != Some(StartupPhase::Initializing) {
                continue;
            }
            if let Some(container) = inner.container.take() {
                let _ = container.tx.send(crate::relay::ContainerFrame::Close {
                    code: 1000,
                    reason: "Startup deadline exceeded".to_string(),
                });
            }
            inner.startup_phase = Some(StartupPhase::Failed);
            inner.last_error = Some("Startup deadline exceeded".to_string());
            let envelope = browser_egress::status_envelope(&inner);
            browser_egress::broadcast(&mut inner, envelope);
            browser_egress::close_all(&mut inner, 1000, "Relay removed");
        }

        tracing::warn!(session_id = %relay.session_id, "startup deadline exceeded, evicting");
        persistence
            .record_status(
                &relay.session_id,
                SessionStatus::Errored,
                serde_json::json!({ "error": "Startup deadline exceeded" }),
            )
            .await;
        registry.drop_entry(&relay.session_id).await;
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
