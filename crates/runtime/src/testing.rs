//! Scripted test doubles for the identity endpoint and the duplex transport.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! downstream crates that want to drive a session without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use skooly_protocol::Identity;
use tokio::sync::{Semaphore, mpsc, watch};
use url::Url;

use crate::credential::{IdentityEndpoint, IdentityResponse};
use crate::error::{Error, Result};
use crate::transport::{CloseInfo, ConnectError, Connector, Transport, TransportEvent, TransportParts};

/// Answers identity requests from a queue, falling back to a fixed token.
pub struct ScriptedIdentityEndpoint {
	token: String,
	queued: Mutex<VecDeque<IdentityResponse>>,
	requests: Mutex<Vec<Identity>>,
}

impl ScriptedIdentityEndpoint {
	/// Issues `{"accesstoken": token}` for every request not otherwise scripted.
	pub fn with_token(token: &str) -> Self {
		Self {
			token: token.to_string(),
			queued: Mutex::new(VecDeque::new()),
			requests: Mutex::new(Vec::new()),
		}
	}

	/// Queues a response served before the default one.
	pub fn push_response(&self, status: u16, body: &str) {
		self.queued.lock().push_back(IdentityResponse {
			status,
			body: body.to_string(),
		});
	}

	/// Queues a successful response carrying `token`.
	pub fn push_token(&self, token: &str) {
		self.push_response(200, &serde_json::json!({ "accesstoken": token }).to_string());
	}

	pub fn request_count(&self) -> usize {
		self.requests.lock().len()
	}

	/// Identities seen so far, in request order.
	pub fn identities(&self) -> Vec<Identity> {
		self.requests.lock().clone()
	}
}

#[async_trait]
impl IdentityEndpoint for ScriptedIdentityEndpoint {
	async fn request(&self, identity: &Identity) -> Result<IdentityResponse> {
		self.requests.lock().push(identity.clone());
		let scripted = self.queued.lock().pop_front();
		Ok(scripted.unwrap_or_else(|| IdentityResponse {
			status: 200,
			body: serde_json::json!({ "accesstoken": self.token }).to_string(),
		}))
	}
}

/// One accepted connection, as seen from the server side.
pub struct MemoryConnection {
	url: Url,
	inbound: mpsc::UnboundedSender<TransportEvent>,
	sent: Mutex<Vec<String>>,
	alive: AtomicBool,
	closed: AtomicBool,
}

impl MemoryConnection {
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// The `token` query value the client connected with.
	pub fn token(&self) -> Option<String> {
		self.url.query_pairs().find(|(key, _)| key == "token").map(|(_, value)| value.into_owned())
	}

	/// Frames the client has written, in order.
	pub fn sent(&self) -> Vec<String> {
		self.sent.lock().clone()
	}

	/// Delivers an inbound text frame to the client.
	pub fn push_frame(&self, frame: &str) {
		let _ = self.inbound.send(TransportEvent::Frame(frame.to_string()));
	}

	pub fn push_malformed(&self, detail: &str) {
		let _ = self.inbound.send(TransportEvent::Malformed(detail.to_string()));
	}

	/// Closes the connection from the server side.
	pub fn push_close(&self, code: Option<u16>, reason: &str) {
		self.alive.store(false, Ordering::SeqCst);
		let _ = self.inbound.send(TransportEvent::Closed(CloseInfo {
			code,
			reason: reason.to_string(),
		}));
	}

	/// Breaks the write half without telling the reader, like a dead socket.
	pub fn kill(&self) {
		self.alive.store(false, Ordering::SeqCst);
	}

	/// True once the client has called [`Transport::close`].
	pub fn is_closed_by_client(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

struct MemoryTransport {
	connection: Arc<MemoryConnection>,
}

#[async_trait]
impl Transport for MemoryTransport {
	async fn send(&mut self, frame: String) -> Result<()> {
		if !self.connection.alive.load(Ordering::SeqCst) {
			return Err(Error::ChannelNotOpen);
		}
		self.connection.sent.lock().push(frame);
		Ok(())
	}

	async fn close(&mut self) {
		self.connection.alive.store(false, Ordering::SeqCst);
		self.connection.closed.store(true, Ordering::SeqCst);
	}
}

enum Outcome {
	Accept,
	Reject(ConnectError),
}

/// In-memory [`Connector`] with scripted handshake outcomes.
///
/// A gated connector parks every handshake until [`release`](Self::release)
/// is called, which lets tests pile up callers on an in-flight open.
pub struct ScriptedConnector {
	outcomes: Mutex<VecDeque<Outcome>>,
	gate: Option<Semaphore>,
	connections: Mutex<Vec<Arc<MemoryConnection>>>,
	attempts: AtomicUsize,
	attempts_tx: watch::Sender<usize>,
}

impl Default for ScriptedConnector {
	fn default() -> Self {
		Self::build(None)
	}
}

impl ScriptedConnector {
	/// Accepts every handshake immediately unless scripted otherwise.
	pub fn new() -> Self {
		Self::default()
	}

	/// Holds each handshake until a permit is released.
	pub fn gated() -> Self {
		Self::build(Some(Semaphore::new(0)))
	}

	fn build(gate: Option<Semaphore>) -> Self {
		Self {
			outcomes: Mutex::new(VecDeque::new()),
			gate,
			connections: Mutex::new(Vec::new()),
			attempts: AtomicUsize::new(0),
			attempts_tx: watch::channel(0).0,
		}
	}

	/// Lets one parked handshake proceed.
	pub fn release(&self) {
		if let Some(gate) = &self.gate {
			gate.add_permits(1);
		}
	}

	/// Fails the next handshake.
	pub fn push_reject(&self, reason: &str, auth_rejected: bool) {
		self.outcomes.lock().push_back(Outcome::Reject(ConnectError {
			reason: reason.to_string(),
			auth_rejected,
		}));
	}

	/// Number of handshakes started, including rejected ones.
	pub fn attempt_count(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}

	/// Waits until at least `count` handshakes have started.
	pub async fn wait_for_attempts(&self, count: usize) {
		let mut rx = self.attempts_tx.subscribe();
		let _ = rx.wait_for(|seen| *seen >= count).await;
	}

	/// Accepted connections, oldest first.
	pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
		self.connections.lock().clone()
	}

	/// Most recently accepted connection.
	///
	/// # Panics
	///
	/// Panics if nothing has connected yet.
	pub fn last(&self) -> Arc<MemoryConnection> {
		self.connections.lock().last().cloned().expect("no connection accepted yet")
	}
}

#[async_trait]
impl Connector for ScriptedConnector {
	async fn connect(&self, url: &Url) -> std::result::Result<TransportParts, ConnectError> {
		let seen = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
		self.attempts_tx.send_replace(seen);

		if let Some(gate) = &self.gate {
			if let Ok(permit) = gate.acquire().await {
				permit.forget();
			}
		}

		let outcome = self.outcomes.lock().pop_front().unwrap_or(Outcome::Accept);
		if let Outcome::Reject(err) = outcome {
			return Err(err);
		}

		let (inbound, message_rx) = mpsc::unbounded_channel();
		let connection = Arc::new(MemoryConnection {
			url: url.clone(),
			inbound,
			sent: Mutex::new(Vec::new()),
			alive: AtomicBool::new(true),
			closed: AtomicBool::new(false),
		});
		self.connections.lock().push(Arc::clone(&connection));

		Ok(TransportParts {
			sender: Box::new(MemoryTransport { connection }),
			message_rx,
		})
	}
}
