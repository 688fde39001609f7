use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;
use crate::persistence::NullSink;
use crate::registry::RelayRegistry;
use crate::relay::{ContainerFrame, ContainerHandle, RelayOptions};

fn sink() -> Arc<dyn PersistenceSink> {
    Arc::new(NullSink)
}

async fn relay_with_container(
    registry: &RelayRegistry,
    session_id: &str,
    user_id: &str,
) -> (Arc<Relay>, mpsc::UnboundedReceiver<ContainerFrame>) {
    let relay = registry.get_or_create(session_id, user_id, RelayOptions::default(), 16).await;
    let (tx, rx) = mpsc::unbounded_channel();
    {
        let mut inner = relay.inner.lock().await;
        let generation = inner.next_container_generation();
        inner.container = Some(ContainerHandle { tx, generation });
        inner.initialized = true;
    }
    (relay, rx)
}

#[tokio::test]
async fn user_message_is_forwarded_and_echoed() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s1", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_user_message","sessionId":"s1","content":"hello"}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    match container_rx.recv().await {
        Some(ContainerFrame::Text(line)) => {
            assert!(line.trim_end().ends_with('}'));
            let parsed: Value = serde_json::from_str(line.trim_end()).expect("valid json");
            assert_eq!(parsed["message"]["content"], "hello");
        }
        other => panic!("expected forwarded container frame, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_user_message_is_dropped() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s1", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_user_message","sessionId":"s1","content":""}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    assert!(container_rx.try_recv().is_err());
}

#[tokio::test]
async fn non_owner_is_rejected_silently() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s1", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_user_message","sessionId":"s1","content":"hello"}"#,
        Some("someone-else"),
        &persistence,
    )
    .await;

    assert!(container_rx.try_recv().is_err());
}

#[tokio::test]
async fn missing_user_id_is_compat_mode() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s1", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_user_message","sessionId":"s1","content":"hello"}"#,
        None,
        &persistence,
    )
    .await;

    assert!(container_rx.try_recv().is_ok());
}

#[tokio::test]
async fn malformed_json_is_ignored() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s1", "u1").await;
    let persistence = sink();

    handle_browser_message(&relay, "not json", Some("u1"), &persistence).await;

    assert!(container_rx.try_recv().is_err());
}

#[tokio::test]
async fn permission_round_trip_allow() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s2", "u1").await;
    {
        let mut inner = relay.inner.lock().await;
        inner.pending_permissions.insert(crate::permissions::PendingPermission {
            request_id: "r1".to_string(),
            tool_name: "Bash".to_string(),
            tool_use_id: None,
            input: serde_json::json!({ "command": "ls" }),
            decision_reason: Some("requires permission".to_string()),
        });
    }
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_permission_response","sessionId":"s2","requestId":"r1","behavior":"allow"}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    match container_rx.recv().await {
        Some(ContainerFrame::Text(line)) => {
            let parsed: Value = serde_json::from_str(line.trim_end()).expect("valid json");
            assert_eq!(parsed["response"]["response"]["behavior"], "allow");
            assert_eq!(parsed["response"]["response"]["updatedInput"]["command"], "ls");
            assert_eq!(parsed["response"]["request_id"], "r1");
        }
        other => panic!("expected control_response, got {other:?}"),
    }

    let inner = relay.inner.lock().await;
    assert!(!inner.pending_permissions.contains("r1"));
}

#[tokio::test]
async fn permission_response_for_unknown_request_is_ignored() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s2", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_permission_response","sessionId":"s2","requestId":"does-not-exist","behavior":"allow"}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    assert!(container_rx.try_recv().is_err());
}

#[tokio::test]
async fn interrupt_sends_synthetic_user_message_not_raw_interrupt() {
    let registry = RelayRegistry::new();
    let (relay, mut container_rx) = relay_with_container(&registry, "s3", "u1").await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_interrupt","sessionId":"s3"}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    match container_rx.recv().await {
        Some(ContainerFrame::Text(line)) => {
            let parsed: Value = serde_json::from_str(line.trim_end()).expect("valid json");
            assert_eq!(parsed["type"], "user");
            assert_ne!(parsed["type"], "interrupt");
        }
        other => panic!("expected synthesized user message, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_container_socket_fails_closed() {
    let registry = RelayRegistry::new();
    let relay = registry.get_or_create("s4", "u1", RelayOptions::default(), 16).await;
    let persistence = sink();

    handle_browser_message(
        &relay,
        r#"{"type":"session_user_message","sessionId":"s4","content":"hello"}"#,
        Some("u1"),
        &persistence,
    )
    .await;

    let inner = relay.inner.lock().await;
    assert!(inner.message_buffer.is_empty(), "no broadcast should occur without a container");
}
