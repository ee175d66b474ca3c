use std::time::Duration;

use skooly_protocol::ChatEvent;
use tokio::sync::mpsc;

use super::*;
use crate::testing::{ScriptedConnector, ScriptedIdentityEndpoint};

struct Harness {
	manager: Arc<ChannelManager>,
	endpoint: Arc<ScriptedIdentityEndpoint>,
	connector: Arc<ScriptedConnector>,
	events: mpsc::UnboundedReceiver<ChatEvent>,
}

fn harness(endpoint: ScriptedIdentityEndpoint, connector: ScriptedConnector) -> Harness {
	let endpoint = Arc::new(endpoint);
	let connector = Arc::new(connector);
	let (tx, events) = mpsc::unbounded_channel::<ChatEvent>();
	let manager = ChannelManager::new(
		Identity::new("42", "Jo", "jo@x.com"),
		CredentialProvider::new(endpoint.clone()),
		connector.clone(),
		Url::parse("ws://chat.test/chat/ws").unwrap(),
		Arc::new(tx),
	);
	Harness {
		manager,
		endpoint,
		connector,
		events,
	}
}

fn default_harness() -> Harness {
	harness(ScriptedIdentityEndpoint::with_token("tok-1"), ScriptedConnector::new())
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
	tokio::time::timeout(Duration::from_secs(2), events.recv())
		.await
		.expect("timed out waiting for event")
		.expect("event channel closed")
}

#[tokio::test]
async fn concurrent_opens_share_one_attempt() {
	let h = harness(ScriptedIdentityEndpoint::with_token("tok-1"), ScriptedConnector::gated());

	let release = async {
		h.connector.wait_for_attempts(1).await;
		assert_eq!(h.manager.state(), ChannelState::Opening);
		h.connector.release();
	};
	let (a, b, c, ()) = tokio::join!(h.manager.ensure_open(), h.manager.ensure_open(), h.manager.ensure_open(), release);

	let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
	assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
	assert_eq!(h.endpoint.request_count(), 1);
	assert_eq!(h.connector.attempt_count(), 1);
	assert_eq!(h.manager.state(), ChannelState::Open);
}

#[tokio::test]
async fn open_channel_is_reused() {
	let h = default_harness();

	let first = h.manager.ensure_open().await.unwrap();
	let second = h.manager.ensure_open().await.unwrap();

	assert_eq!(first.generation(), second.generation());
	assert_eq!(h.connector.attempt_count(), 1);
	assert_eq!(h.connector.last().token().as_deref(), Some("tok-1"));
	assert!(!first.endpoint().contains("tok-1"));
}

#[tokio::test]
async fn abandoned_caller_does_not_strand_others() {
	let h = harness(ScriptedIdentityEndpoint::with_token("tok-1"), ScriptedConnector::gated());

	let manager = h.manager.clone();
	let first = tokio::spawn(async move { manager.ensure_open().await });
	h.connector.wait_for_attempts(1).await;
	first.abort();

	h.connector.release();
	h.manager.ensure_open().await.unwrap();
	assert_eq!(h.connector.attempt_count(), 1);
}

#[tokio::test]
async fn sends_arrive_in_call_order() {
	let h = default_harness();
	h.manager.ensure_open().await.unwrap();

	for frame in ["a", "b", "c"] {
		h.manager.send(frame.to_string()).await.unwrap();
	}
	assert_eq!(h.connector.last().sent(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn send_without_open_channel_fails() {
	let h = default_harness();
	assert_eq!(h.manager.send("x".into()).await, Err(Error::ChannelNotOpen));
	assert_eq!(h.connector.attempt_count(), 0);
}

#[tokio::test]
async fn dead_transport_drops_to_closed_and_reconnects() {
	let h = default_harness();
	h.manager.ensure_open().await.unwrap();
	h.connector.last().kill();

	assert_eq!(h.manager.send("x".into()).await, Err(Error::ChannelNotOpen));
	assert_eq!(h.manager.state(), ChannelState::Closed);

	h.manager.ensure_open().await.unwrap();
	h.manager.send("y".into()).await.unwrap();
	assert_eq!(h.connector.attempt_count(), 2);
	assert_eq!(h.connector.last().sent(), vec!["y"]);
}

#[tokio::test]
async fn inbound_frames_reach_the_sink() {
	let mut h = default_harness();
	h.manager.ensure_open().await.unwrap();

	let connection = h.connector.last();
	connection.push_frame(r#"{"reply":"hello!"}"#);
	connection.push_malformed("binary frame is not UTF-8");

	assert_eq!(next_event(&mut h.events).await, ChatEvent::reply("hello!"));
	assert!(next_event(&mut h.events).await.is_error());
}

#[tokio::test]
async fn disconnect_reports_once_and_does_not_reconnect() {
	let mut h = default_harness();
	h.manager.ensure_open().await.unwrap();

	h.connector.last().push_close(Some(1001), "going away");

	assert_eq!(
		next_event(&mut h.events).await,
		ChatEvent::error("connection to the chat server was lost (close code 1001)")
	);
	assert_eq!(h.manager.state(), ChannelState::Closed);

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(h.events.try_recv().is_err());
	assert_eq!(h.connector.attempt_count(), 1);
}

#[tokio::test]
async fn reconnect_after_drop_reuses_the_credential() {
	let mut h = default_harness();
	let first = h.manager.ensure_open().await.unwrap();

	h.connector.last().push_close(Some(1000), "");
	next_event(&mut h.events).await;

	let second = h.manager.ensure_open().await.unwrap();
	assert!(second.generation() > first.generation());
	assert_eq!(h.endpoint.request_count(), 1);
	assert_eq!(h.connector.attempt_count(), 2);
	assert_eq!(h.connector.last().token().as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn auth_close_invalidates_the_credential() {
	let mut h = default_harness();
	h.manager.ensure_open().await.unwrap();

	h.connector.last().push_close(Some(4401), "token expired");
	next_event(&mut h.events).await;
	assert!(!h.manager.credentials().has_credential().await);

	h.manager.ensure_open().await.unwrap();
	assert_eq!(h.endpoint.request_count(), 2);
}

#[tokio::test]
async fn rejected_cached_credential_is_replaced_once() {
	let endpoint = ScriptedIdentityEndpoint::with_token("tok-2");
	endpoint.push_token("tok-1");
	let mut h = harness(endpoint, ScriptedConnector::new());

	h.manager.ensure_open().await.unwrap();
	h.connector.last().push_close(Some(1000), "");
	next_event(&mut h.events).await;

	h.connector.push_reject("handshake rejected with HTTP 401 Unauthorized", true);
	h.manager.ensure_open().await.unwrap();

	let tokens: Vec<_> = h.connector.connections().iter().map(|c| c.token()).collect();
	assert_eq!(tokens, vec![Some("tok-1".to_string()), Some("tok-2".to_string())]);
	assert_eq!(h.endpoint.request_count(), 2);
	assert_eq!(h.connector.attempt_count(), 3);
}

#[tokio::test]
async fn rejected_fresh_credential_fails_without_retry() {
	let h = default_harness();
	h.connector.push_reject("handshake rejected with HTTP 403 Forbidden", true);

	let err = h.manager.ensure_open().await.unwrap_err();
	assert!(err.is_auth_rejection());
	assert_eq!(h.connector.attempt_count(), 1);
	assert_eq!(h.endpoint.request_count(), 1);
	assert!(!h.manager.credentials().has_credential().await);
	assert_eq!(h.manager.state(), ChannelState::Closed);

	h.manager.ensure_open().await.unwrap();
	assert_eq!(h.endpoint.request_count(), 2);
}

#[tokio::test]
async fn network_failure_keeps_the_credential() {
	let h = default_harness();
	h.connector.push_reject("connection refused", false);

	let err = h.manager.ensure_open().await.unwrap_err();
	assert!(matches!(err, Error::ChannelOpenFailed { auth_rejected: false, .. }));
	assert!(h.manager.credentials().has_credential().await);

	h.manager.ensure_open().await.unwrap();
	assert_eq!(h.endpoint.request_count(), 1);
}

#[tokio::test]
async fn credential_failure_skips_the_handshake() {
	let endpoint = ScriptedIdentityEndpoint::with_token("tok-1");
	endpoint.push_response(500, "down");
	let h = harness(endpoint, ScriptedConnector::new());

	let err = h.manager.ensure_open().await.unwrap_err();
	assert!(matches!(err, Error::CredentialUnavailable { status: Some(500), .. }));
	assert_eq!(h.connector.attempt_count(), 0);
	assert_eq!(h.manager.state(), ChannelState::Closed);
}

#[tokio::test]
async fn close_is_idempotent() {
	let h = default_harness();
	h.manager.close().await;
	assert_eq!(h.manager.state(), ChannelState::Closed);

	h.manager.ensure_open().await.unwrap();
	h.manager.close().await;
	h.manager.close().await;

	assert_eq!(h.manager.state(), ChannelState::Closed);
	assert!(h.connector.last().is_closed_by_client());
	assert_eq!(h.manager.send("x".into()).await, Err(Error::ChannelNotOpen));
}

#[tokio::test]
async fn close_does_not_report_a_disconnect() {
	let mut h = default_harness();
	h.manager.ensure_open().await.unwrap();
	h.manager.close().await;

	h.connector.last().push_close(Some(1000), "");
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn close_while_opening_settles_every_waiter() {
	let h = harness(ScriptedIdentityEndpoint::with_token("tok-1"), ScriptedConnector::gated());

	let close = async {
		h.connector.wait_for_attempts(1).await;
		h.manager.close().await;
	};
	let (a, b, ()) = tokio::join!(h.manager.ensure_open(), h.manager.ensure_open(), close);

	for result in [a, b] {
		assert!(matches!(result, Err(Error::ChannelOpenFailed { auth_rejected: false, .. })));
	}
	assert_eq!(h.manager.state(), ChannelState::Closed);

	h.connector.release();
	h.manager.ensure_open().await.unwrap();
	assert_eq!(h.connector.attempt_count(), 2);
	assert_eq!(h.connector.connections().len(), 1);
}

#[tokio::test]
async fn shutdown_closes_the_transport() {
	let h = default_harness();
	h.manager.ensure_open().await.unwrap();

	h.manager.shutdown();
	assert_eq!(h.manager.state(), ChannelState::Closed);

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(h.connector.last().is_closed_by_client());
}
