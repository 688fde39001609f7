// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the relay service.
#[derive(Debug, Clone, clap::Parser)]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "RELAYD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8900, env = "RELAYD_PORT")]
    pub port: u16,

    /// Bearer token required on HTTP routes and WS query strings. If unset,
    /// auth is disabled (browser ownership checks still run in compat mode,
    /// see `spec.md` §4.4).
    #[arg(long, env = "RELAYD_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Message buffer capacity per relay (bounded FIFO for reconnect replay).
    #[arg(long, default_value_t = 256, env = "RELAYD_BUFFER_CAPACITY")]
    pub buffer_capacity: usize,

    /// How often the startup watchdog scans for stuck relays, in milliseconds.
    #[arg(long, default_value_t = 15_000, env = "RELAYD_WATCHDOG_INTERVAL_MS")]
    pub watchdog_interval_ms: u64,

    /// Startup deadline: a relay stuck in `initializing` longer than this is
    /// force-removed and marked errored by the watchdog, not by the Relay
    /// itself (`spec.md` §9, Open Question).
    #[arg(long, default_value_t = 180_000, env = "RELAYD_STARTUP_DEADLINE_MS")]
    pub startup_deadline_ms: u64,

    /// Persist via `LoggingSink` (structured `tracing` records) instead of
    /// the default no-op sink. Stands in for "a real store exists but is out
    /// of scope" (`spec.md` §1, §6 "Persistence hook (collaborator)").
    #[arg(long, default_value_t = false, env = "RELAYD_LOG_PERSISTENCE")]
    pub log_persistence: bool,
}

impl RelayConfig {
    pub fn watchdog_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn startup_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.startup_deadline_ms)
    }
}
