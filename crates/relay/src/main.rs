// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::error;

use relayd::config::RelayConfig;
use relayd::persistence::{LoggingSink, NullSink, PersistenceSink};

#[tokio::main]
async fn main() {
    let config = RelayConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let persistence: Arc<dyn PersistenceSink> =
        if config.log_persistence { Arc::new(LoggingSink) } else { Arc::new(NullSink) };

    if let Err(e) = relayd::run(config, persistence).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
