use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::browser_egress::add_browser_to_session;
use crate::persistence::NullSink;
use crate::registry::RelayRegistry;
use crate::relay::{BrowserFrame, RelayOptions};

fn sink() -> Arc<dyn PersistenceSink> {
    Arc::new(NullSink)
}

#[test]
fn parse_ndjson_skips_malformed_lines() {
    let frame = "{\"type\":\"keep_alive\"}\nnot json\n{\"type\":\"auth_status\"}\n";
    let parsed = parse_ndjson(frame);
    assert_eq!(parsed.len(), 2);
}

#[test]
fn parse_ndjson_trims_and_drops_blank_lines() {
    let frame = "  {\"type\":\"keep_alive\"}  \n\n\n";
    let parsed = parse_ndjson(frame);
    assert_eq!(parsed.len(), 1);
}

#[tokio::test]
async fn attach_unknown_session_returns_none() {
    let registry = RelayRegistry::new();
    assert!(attach_container(&registry, "missing").await.is_none());
}

async fn next_browser_text(rx: &mut mpsc::UnboundedReceiver<BrowserFrame>) -> String {
    match rx.recv().await {
        Some(BrowserFrame::Text(text)) => text,
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn happy_path_assistant_message() {
    let registry = RelayRegistry::new();
    registry.get_or_create("s1", "u1", RelayOptions::default(), 16).await;

    let (btx, mut brx) = mpsc::unbounded_channel();
    add_browser_to_session(&registry, "s1", btx, None).await;
    let _snapshot = next_browser_text(&mut brx).await; // subscribe snapshot, status=starting

    let (relay, _generation, _rx) =
        attach_container(&registry, "s1").await.expect("relay exists");
    let _attach_starting = next_browser_text(&mut brx).await; // attach broadcast, status=starting

    let persistence = sink();
    dispatch_message(
        &relay,
        json!({
            "type": "system",
            "subtype": "init",
            "cwd": "/p",
            "session_id": "cc1",
            "model": "m",
            "tools": [],
            "mcp_servers": [],
            "permission_mode": "default",
            "claude_code_version": "1",
        }),
        &persistence,
    )
    .await;

    let status_text = next_browser_text(&mut brx).await;
    assert!(status_text.contains("\"status\":\"active\""));

    {
        let inner = relay.inner.lock().await;
        assert!(inner.initialized);
        assert!(inner.capabilities.is_some());
    }

    dispatch_message(&relay, json!({ "type": "assistant", "content": "Hi" }), &persistence).await;

    let message_text = next_browser_text(&mut brx).await;
    assert!(message_text.contains("session_message"));
    assert!(message_text.contains("\"messageType\":\"assistant\""));
    assert!(message_text.contains("Hi"));
}

#[tokio::test]
async fn initial_prompt_is_sent_once_after_init() {
    let registry = RelayRegistry::new();
    let options = RelayOptions { initial_prompt: Some("Build a REST API".to_string()), ..Default::default() };
    registry.get_or_create("s2", "u1", options, 16).await;
    let (relay, _generation, mut container_rx) =
        attach_container(&registry, "s2").await.expect("relay exists");

    let persistence = sink();
    dispatch_message(
        &relay,
        json!({
            "type": "system",
            "subtype": "init",
            "cwd": "/p",
            "session_id": "cc2",
            "model": "m",
            "tools": [],
            "mcp_servers": [],
            "permission_mode": "default",
            "claude_code_version": "1",
        }),
        &persistence,
    )
    .await;

    match container_rx.recv().await {
        Some(ContainerFrame::Text(line)) => {
            let parsed: Value = serde_json::from_str(&line).expect("valid json");
            assert_eq!(parsed["type"], "user");
            assert_eq!(parsed["message"]["role"], "user");
            assert_eq!(parsed["message"]["content"], "Build a REST API");
            assert_eq!(parsed["parent_tool_use_id"], Value::Null);
            assert_eq!(parsed["session_id"], "s2");
        }
        other => panic!("expected the initial prompt frame, got {other:?}"),
    }
}

#[tokio::test]
async fn startup_failure_marks_errored() {
    let registry = RelayRegistry::new();
    registry.get_or_create("s6", "u1", RelayOptions::default(), 16).await;

    let (btx, mut brx) = mpsc::unbounded_channel();
    add_browser_to_session(&registry, "s6", btx, None).await;
    let _snapshot = next_browser_text(&mut brx).await;

    let (relay, generation, _rx) =
        attach_container(&registry, "s6").await.expect("relay exists");
    let _attach_starting = next_browser_text(&mut brx).await;

    let persistence = sink();
    handle_disconnect(&relay, generation, &persistence).await;

    let status_text = next_browser_text(&mut brx).await;
    assert!(status_text.contains("\"status\":\"errored\""));
    assert!(status_text.contains("\"startupPhase\":\"failed\""));

    let inner = relay.inner.lock().await;
    assert!(inner.container.is_none());
}

#[tokio::test]
async fn stale_disconnect_generation_is_ignored() {
    let registry = RelayRegistry::new();
    registry.get_or_create("s7", "u1", RelayOptions::default(), 16).await;
    let (relay, stale_generation, _rx) =
        attach_container(&registry, "s7").await.expect("relay exists");
    let (_relay_again, _current_generation, _rx2) =
        attach_container(&registry, "s7").await.expect("relay exists");

    let persistence = sink();
    handle_disconnect(&relay, stale_generation, &persistence).await;

    let inner = relay.inner.lock().await;
    assert!(inner.container.is_some(), "stale disconnect must not clear the newer attachment");
}
