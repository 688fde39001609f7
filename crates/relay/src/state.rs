// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shared state handed to every axum handler via `State`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::persistence::PersistenceSink;
use crate::registry::RelayRegistry;

pub struct AppState {
    pub registry: Arc<RelayRegistry>,
    pub persistence: Arc<dyn PersistenceSink>,
    pub config: RelayConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: RelayConfig, persistence: Arc<dyn PersistenceSink>) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(RelayRegistry::new()),
            persistence,
            config,
            shutdown: CancellationToken::new(),
        })
    }
}
