// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session aggregate (`spec.md` §3, §4). Holds the container socket,
//! the browser subscriber set, the permission store, and the message buffer
//! behind a single mutex so every mutation is atomic with respect to every
//! other mutation on the same relay (`spec.md` §5). Distinct relays never
//! share a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::buffer::MessageBuffer;
use crate::permissions::PermissionStore;

/// Session status, driven by the Relay as described in `spec.md` §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Active,
    Stopped,
    Errored,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        }
    }

    /// Terminal statuses — no subsequent events are expected for the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }
}

/// Startup phase, orthogonal to `SessionStatus` — `spec.md` §3/§4.7 models
/// this as `{initializing, failed, null}`; `null` is `Option::None` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    Initializing,
    Failed,
}

impl StartupPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Failed => "failed",
        }
    }
}

/// Working dir, model, tool list, MCP server list, permission mode, and agent
/// version reported by the container at `system/init` (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub cwd: String,
    pub model: String,
    pub tools: Vec<String>,
    pub mcp_servers: Vec<String>,
    pub permission_mode: String,
    pub claude_code_version: String,
}

/// Stats recorded from a container `result` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultStats {
    pub duration_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub result_type: String,
}

/// Optional startup hints, fixed at relay creation (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub initial_prompt: Option<String>,
    pub worker_context: Option<serde_json::Value>,
}

/// Outbound frame queued for the container socket's writer task.
#[derive(Debug, Clone)]
pub enum ContainerFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Outbound frame queued for a browser socket's writer task.
#[derive(Debug, Clone)]
pub enum BrowserFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// A currently-attached container socket. `generation` disambiguates a
/// disconnect callback from a socket that has since been replaced.
pub struct ContainerHandle {
    pub tx: mpsc::UnboundedSender<ContainerFrame>,
    pub generation: u64,
}

/// A currently-subscribed browser socket.
pub struct BrowserHandle {
    pub tx: mpsc::UnboundedSender<BrowserFrame>,
}

impl BrowserHandle {
    /// Send a frame if the socket is still open; silently skip otherwise
    /// (`spec.md` §4.3 — "skip sockets in any other state without error").
    pub fn send(&self, frame: BrowserFrame) {
        let _ = self.tx.send(frame);
    }
}

/// Every field the `spec.md` §5 concurrency contract requires to be mutated
/// atomically with respect to its siblings, gathered under one mutex.
pub struct RelayInner {
    pub container: Option<ContainerHandle>,
    pub browsers: HashMap<u64, BrowserHandle>,
    pub initialized: bool,
    pub capabilities: Option<Capabilities>,
    pub startup_phase: Option<StartupPhase>,
    pub startup_timestamp: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub pending_permissions: PermissionStore,
    pub message_buffer: MessageBuffer,
    pub result_stats: Option<ResultStats>,
    pub last_error: Option<String>,
    container_generation: u64,
    next_browser_id: u64,
}

impl RelayInner {
    fn new(buffer_capacity: usize) -> Self {
        Self {
            container: None,
            browsers: HashMap::new(),
            initialized: false,
            capabilities: None,
            startup_phase: None,
            startup_timestamp: None,
            last_activity_at: None,
            pending_permissions: PermissionStore::new(),
            message_buffer: MessageBuffer::new(buffer_capacity),
            result_stats: None,
            last_error: None,
            container_generation: 0,
            next_browser_id: 0,
        }
    }

    /// Status derived from `initialized`, `startup_phase`, and whether a
    /// container socket is attached (`spec.md` §4.3).
    pub fn derived_status(&self) -> SessionStatus {
        if self.initialized {
            if self.container.is_none() && self.startup_phase.is_none() {
                // Initialized, then the container went away without an
                // explicit error — disconnect handling has already recorded
                // `last_error`, distinguishing stopped from errored.
                if self.last_error.is_some() {
                    return SessionStatus::Errored;
                }
                return SessionStatus::Stopped;
            }
            return SessionStatus::Active;
        }
        match self.startup_phase {
            Some(StartupPhase::Failed) => SessionStatus::Errored,
            _ => SessionStatus::Starting,
        }
    }

    pub fn next_container_generation(&mut self) -> u64 {
        self.container_generation += 1;
        self.container_generation
    }

    pub fn next_browser_id(&mut self) -> u64 {
        self.next_browser_id += 1;
        self.next_browser_id
    }
}

/// The per-session aggregate described in `spec.md` §3.
pub struct Relay {
    pub session_id: String,
    pub user_id: String,
    pub options: RelayOptions,
    pub inner: Mutex<RelayInner>,
    /// Monotonic counter for correlating `tracing` spans; not part of the
    /// wire protocol.
    pub created_at_ms: i64,
    client_id_seq: AtomicU64,
}

impl Relay {
    pub fn new(
        session_id: String,
        user_id: String,
        options: RelayOptions,
        buffer_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            user_id,
            options,
            inner: Mutex::new(RelayInner::new(buffer_capacity)),
            created_at_ms: now_ms(),
            client_id_seq: AtomicU64::new(0),
        })
    }

    /// Allocate a browser client id unique within this relay's lifetime.
    /// Kept outside the mutex since it never needs to be consistent with the
    /// `browsers` map contents — only unique.
    pub fn next_client_id(&self) -> u64 {
        self.client_id_seq.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
