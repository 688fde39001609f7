// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relayd: the session relay described in `spec.md` — multiplexes one
//! container-side NDJSON socket with N browser-side envelope sockets per
//! session, plus the thinnest possible HTTP/WS shim to reach it over the
//! wire (`spec.md` §1, `SPEC_FULL.md` §1 AMBIENT).

pub mod browser_egress;
pub mod browser_ingress;
pub mod buffer;
pub mod config;
pub mod container_ingress;
pub mod envelope;
pub mod error;
pub mod permissions;
pub mod persistence;
pub mod registry;
pub mod relay;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod watchdog;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::persistence::PersistenceSink;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the relay server until shutdown.
pub async fn run(config: RelayConfig, persistence: Arc<dyn PersistenceSink>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config.clone(), persistence.clone());

    let watchdog = watchdog::spawn(
        state.registry.clone(),
        persistence,
        config.watchdog_interval(),
        config.startup_deadline(),
        state.shutdown.clone(),
    );

    tracing::info!(%addr, "relayd listening");
    let router = build_router(state.clone());
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal(state.clone())).await?;

    state.shutdown.cancel();
    let _ = watchdog.await;
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    state.shutdown.cancelled().await;
}
