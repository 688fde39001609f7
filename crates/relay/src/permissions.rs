// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-relay map of outstanding tool-permission requests awaiting a user
//! decision (`spec.md` §4.5). Owned by its enclosing `Relay` and touched
//! only under that relay's single mutex.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A container `control_request` with `subtype="can_use_tool"`, stored
/// verbatim so the eventual response can echo the original `input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPermission {
    pub request_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
}

/// Summary shape sent to a newly-subscribed browser (`spec.md` §4.3).
#[derive(Debug, Clone, Serialize)]
pub struct PendingPermissionSummary {
    pub request_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
}

impl From<&PendingPermission> for PendingPermissionSummary {
    fn from(p: &PendingPermission) -> Self {
        Self {
            request_id: p.request_id.clone(),
            tool_name: p.tool_name.clone(),
            input: p.input.clone(),
            decision_reason: p.decision_reason.clone(),
        }
    }
}

/// Mapping from request-id to the verbatim container control-request. An id
/// appears at most once at any time; bounded only by the rate of outstanding
/// requests.
#[derive(Debug, Default)]
pub struct PermissionStore {
    pending: HashMap<String, PendingPermission>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PendingPermission) {
        self.pending.insert(entry.request_id.clone(), entry);
    }

    /// Atomic lookup-and-remove, as consumed by the permission-response path.
    pub fn take(&mut self, request_id: &str) -> Option<PendingPermission> {
        self.pending.remove(request_id)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn summaries(&self) -> Vec<PendingPermissionSummary> {
        self.pending.values().map(PendingPermissionSummary::from).collect()
    }
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
