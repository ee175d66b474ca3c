//! End-to-end tests against a loopback chat backend.
//!
//! The backend issues credentials on `POST /auth/token/public` and answers
//! every `{"text": ...}` frame on `/chat/ws` with an echo reply. A `bye`
//! message makes it close the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use skooly::{ChannelState, ChatConfig, ChatEvent, ChatSession, Identity};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct Backend {
	issued_token: String,
	accepted_token: String,
	token_requests: Mutex<Vec<Value>>,
	upgrades: Mutex<usize>,
}

async fn issue_token(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> impl IntoResponse {
	backend.token_requests.lock().push(body);
	Json(json!({ "isSuccess": true, "result": { "accessToken": backend.issued_token } }))
}

async fn chat_ws(
	State(backend): State<Arc<Backend>>,
	Query(params): Query<HashMap<String, String>>,
	ws: WebSocketUpgrade,
) -> impl IntoResponse {
	if params.get("token") != Some(&backend.accepted_token) {
		return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
	}
	*backend.upgrades.lock() += 1;
	ws.on_upgrade(echo).into_response()
}

async fn echo(mut socket: WebSocket) {
	while let Some(Ok(message)) = socket.recv().await {
		let Message::Text(frame) = message else { continue };
		let text = serde_json::from_str::<Value>(frame.as_str())
			.ok()
			.and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_owned))
			.unwrap_or_default();

		if text == "bye" {
			let _ = socket
				.send(Message::Close(Some(CloseFrame {
					code: 1000,
					reason: "bye".into(),
				})))
				.await;
			return;
		}

		let reply = json!({ "reply": format!("echo: {text}") }).to_string();
		if socket.send(Message::Text(reply.into())).await.is_err() {
			return;
		}
	}
}

async fn serve(issued_token: &str, accepted_token: &str) -> (SocketAddr, Arc<Backend>) {
	let backend = Arc::new(Backend {
		issued_token: issued_token.to_string(),
		accepted_token: accepted_token.to_string(),
		token_requests: Mutex::new(Vec::new()),
		upgrades: Mutex::new(0),
	});
	let app = Router::new()
		.route("/auth/token/public", post(issue_token))
		.route("/chat/ws", get(chat_ws))
		.with_state(backend.clone());

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	(addr, backend)
}

fn session(addr: SocketAddr) -> (ChatSession, mpsc::UnboundedReceiver<ChatEvent>) {
	let config = ChatConfig::new(&format!("http://{addr}/")).unwrap();
	let session = ChatSession::connect(config, Identity::new("42", "Jo", "jo@x.com")).unwrap();
	let (tx, rx) = mpsc::unbounded_channel();
	let _ = session.subscribe(move |event| {
		let _ = tx.send(event);
	});
	(session, rx)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for chat event")
		.expect("subscriber channel closed")
}

#[tokio::test]
async fn message_round_trip() {
	let (addr, backend) = serve("tok-1", "tok-1").await;
	let (session, mut events) = session(addr);

	session.send_message("hi").await;
	assert_eq!(next_event(&mut events).await, ChatEvent::reply("echo: hi"));

	session.send_message("again").await;
	assert_eq!(next_event(&mut events).await, ChatEvent::reply("echo: again"));

	assert_eq!(
		*backend.token_requests.lock(),
		vec![json!({ "id": "42", "name": "Jo", "contact": "jo@x.com" })]
	);
	assert_eq!(*backend.upgrades.lock(), 1);

	session.close().await;
	assert_eq!(session.state(), ChannelState::Closed);
}

#[tokio::test]
async fn rejected_credential_is_reported() {
	let (addr, backend) = serve("tok-stale", "tok-1").await;
	let (session, mut events) = session(addr);

	session.send_message("hi").await;

	match next_event(&mut events).await {
		ChatEvent::Error { message } => assert!(message.contains("401"), "{message}"),
		other => panic!("expected error, got {other:?}"),
	}
	assert_eq!(session.state(), ChannelState::Closed);
	assert_eq!(backend.token_requests.lock().len(), 1);
	assert_eq!(*backend.upgrades.lock(), 0);
}

#[tokio::test]
async fn server_close_is_reported_and_next_message_reconnects() {
	let (addr, backend) = serve("tok-1", "tok-1").await;
	let (session, mut events) = session(addr);

	session.send_message("bye").await;
	assert_eq!(
		next_event(&mut events).await,
		ChatEvent::error("connection to the chat server was lost (close code 1000)")
	);
	assert_eq!(session.state(), ChannelState::Closed);

	session.send_message("hello").await;
	assert_eq!(next_event(&mut events).await, ChatEvent::reply("echo: hello"));
	assert_eq!(*backend.upgrades.lock(), 2);
	assert_eq!(backend.token_requests.lock().len(), 1);
}
