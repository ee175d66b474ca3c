//! Duplex Channel Manager - owns the single live connection of a session.
//!
//! # State machine
//!
//! ```text
//!            ensure_open               handshake ok
//! ┌────────┐ ──────────► ┌─────────┐ ─────────────► ┌──────┐
//! │ Closed │             │ Opening │                │ Open │
//! └────────┘ ◄────────── └─────────┘                └──────┘
//!   ▲   ▲   failure / close()                        │   │
//!   │   └──────────── peer or network dropped ───────┘   │ close()
//!   │                                                    ▼
//!   │                  transport closed           ┌─────────┐
//!   └──────────────────────────────────────────── │ Closing │
//!                                                 └─────────┘
//! ```
//!
//! # Single flight
//!
//! The open attempt runs on its own task. Every [`ChannelManager::ensure_open`]
//! caller, including the one that started the attempt, parks a oneshot in the
//! waiter list and is settled with the same outcome. Dropping a caller never
//! strands the others, and [`ChannelManager::close`] settles all of them.
//!
//! # Generations
//!
//! Each open attempt gets a new generation number. Late results from an
//! aborted attempt and close events from a replaced connection carry a stale
//! generation and are ignored.
//!
//! No reconnection happens in the background: after a drop the manager stays
//! `Closed` until the next `ensure_open`.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use parking_lot::Mutex;
use skooly_protocol::Identity;
use tokio::sync::{Mutex as TokioMutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{duplex_url, redact_token};
use crate::credential::{Credential, CredentialProvider, CredentialSource};
use crate::error::{Error, Result};
use crate::router::{self, EventSink};
use crate::transport::{CloseInfo, Connector, Transport, TransportEvent, TransportParts};

/// Lifecycle state of the session's duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Closed,
	Opening,
	Open,
	Closing,
}

/// A single open duplex connection.
pub struct Channel {
	generation: u64,
	url: Url,
	sender: TokioMutex<Box<dyn Transport>>,
}

impl Channel {
	fn new(generation: u64, url: Url, sender: Box<dyn Transport>) -> Self {
		Self {
			generation,
			url,
			sender: TokioMutex::new(sender),
		}
	}

	/// Sequence number of the open attempt that produced this channel.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Connected endpoint with the credential masked.
	pub fn endpoint(&self) -> String {
		redact_token(&self.url)
	}

	async fn close_transport(&self) {
		self.sender.lock().await.close().await;
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("generation", &self.generation)
			.field("endpoint", &self.endpoint())
			.finish()
	}
}

type OpenOutcome = Result<Arc<Channel>>;

struct Opened {
	channel: Arc<Channel>,
	message_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

struct Inner {
	state: ChannelState,
	generation: u64,
	current: Option<Arc<Channel>>,
	waiters: Vec<oneshot::Sender<OpenOutcome>>,
	attempt: Option<JoinHandle<()>>,
	pump: Option<JoinHandle<()>>,
}

/// Owns at most one non-closed [`Channel`] and drives its lifecycle.
pub struct ChannelManager {
	identity: Identity,
	credentials: CredentialProvider,
	connector: Arc<dyn Connector>,
	duplex_base: Url,
	sink: Arc<dyn EventSink>,
	inner: Mutex<Inner>,
}

impl ChannelManager {
	/// Creates a manager in the `Closed` state. Nothing is opened until the
	/// first [`ensure_open`](Self::ensure_open).
	pub fn new(
		identity: Identity,
		credentials: CredentialProvider,
		connector: Arc<dyn Connector>,
		duplex_base: Url,
		sink: Arc<dyn EventSink>,
	) -> Arc<Self> {
		Arc::new(Self {
			identity,
			credentials,
			connector,
			duplex_base,
			sink,
			inner: Mutex::new(Inner {
				state: ChannelState::Closed,
				generation: 0,
				current: None,
				waiters: Vec::new(),
				attempt: None,
				pump: None,
			}),
		})
	}

	pub fn state(&self) -> ChannelState {
		self.inner.lock().state
	}

	pub fn credentials(&self) -> &CredentialProvider {
		&self.credentials
	}

	/// Returns the open channel, opening one if needed.
	///
	/// Joins an attempt already in flight rather than starting a second one.
	/// Callers arriving while the channel is closing are served by a fresh
	/// attempt once the close completes.
	pub async fn ensure_open(self: &Arc<Self>) -> Result<Arc<Channel>> {
		let rx = {
			let mut inner = self.inner.lock();
			if let (ChannelState::Open, Some(channel)) = (inner.state, inner.current.as_ref()) {
				return Ok(Arc::clone(channel));
			}

			let (tx, rx) = oneshot::channel();
			inner.waiters.push(tx);
			let state = inner.state;
			match state {
				ChannelState::Opening => debug!(waiters = inner.waiters.len(), "joining in-flight channel open"),
				ChannelState::Closing => debug!("channel closing, open queued"),
				ChannelState::Closed | ChannelState::Open => self.start_attempt(&mut inner),
			}
			rx
		};

		rx.await.unwrap_or_else(|_| {
			Err(Error::ChannelOpenFailed {
				reason: "open attempt abandoned".to_string(),
				auth_rejected: false,
			})
		})
	}

	/// Sends one encoded frame on the open channel.
	///
	/// Fails with [`Error::ChannelNotOpen`] if there is no open channel or the
	/// transport turned out to be dead; in the latter case the manager drops to
	/// `Closed` so the next [`ensure_open`](Self::ensure_open) reconnects.
	pub async fn send(&self, frame: String) -> Result<()> {
		let channel = {
			let inner = self.inner.lock();
			match (inner.state, inner.current.as_ref()) {
				(ChannelState::Open, Some(channel)) => Arc::clone(channel),
				_ => return Err(Error::ChannelNotOpen),
			}
		};

		let result = channel.sender.lock().await.send(frame).await;
		if result.is_err() {
			self.mark_dead(channel.generation);
		}
		result
	}

	/// Closes the channel. A no-op when already closed or closing; an attempt
	/// in flight is aborted and its waiters are rejected.
	pub async fn close(self: &Arc<Self>) {
		let (channel, generation) = {
			let mut inner = self.inner.lock();
			let state = inner.state;
			match state {
				ChannelState::Closed | ChannelState::Closing => {
					debug!(?state, "close: nothing to do");
					return;
				}
				ChannelState::Opening => {
					let waiters = abort_opening(&mut inner);
					drop(inner);
					info!("channel open cancelled by close");
					settle(waiters, &closed_while_opening());
					return;
				}
				ChannelState::Open => {
					inner.state = ChannelState::Closing;
					inner.generation += 1;
					if let Some(pump) = inner.pump.take() {
						pump.abort();
					}
					(inner.current.take(), inner.generation)
				}
			}
		};

		// Finish on a separate task so a cancelled `close()` cannot leave the
		// manager stuck in `Closing`.
		let manager = Arc::clone(self);
		let task = tokio::spawn(async move {
			if let Some(channel) = channel {
				info!(generation = channel.generation, "closing duplex channel");
				channel.close_transport().await;
			}
			manager.finish_close(generation);
		});
		let _ = task.await;
	}

	/// Synchronous teardown for drop paths.
	///
	/// Aborts background tasks, rejects waiters, and closes the transport on
	/// the current tokio runtime if there is one.
	pub fn shutdown(&self) {
		let (channel, waiters) = {
			let mut inner = self.inner.lock();
			if let Some(pump) = inner.pump.take() {
				pump.abort();
			}
			let waiters = abort_opening(&mut inner);
			(inner.current.take(), waiters)
		};
		settle(waiters, &closed_while_opening());

		if let Some(channel) = channel {
			match tokio::runtime::Handle::try_current() {
				Ok(handle) => {
					handle.spawn(async move { channel.close_transport().await });
				}
				Err(_) => debug!("no runtime, dropping duplex channel without close handshake"),
			}
		}
	}

	fn start_attempt(self: &Arc<Self>, inner: &mut Inner) {
		inner.state = ChannelState::Opening;
		inner.generation += 1;
		let generation = inner.generation;
		debug!(generation, "opening duplex channel");

		let manager = Arc::clone(self);
		inner.attempt = Some(tokio::spawn(async move {
			let result = manager.open(generation).await;
			manager.finish_attempt(generation, result);
		}));
	}

	/// Obtains a credential and performs the handshake. A rejected cached
	/// credential is replaced and the handshake retried once.
	async fn open(&self, generation: u64) -> Result<Opened> {
		let (credential, source) = self.credentials.acquire(&self.identity).await?;

		let err = match self.connect(generation, &credential).await {
			Ok(opened) => return Ok(opened),
			Err(err) if err.is_auth_rejection() => err,
			Err(err) => return Err(err),
		};

		self.credentials.invalidate().await;
		if source != CredentialSource::Cached {
			return Err(err);
		}

		info!(generation, "cached credential rejected, requesting a fresh one");
		let (fresh, _) = self.credentials.acquire(&self.identity).await?;
		let result = self.connect(generation, &fresh).await;
		if matches!(&result, Err(e) if e.is_auth_rejection()) {
			self.credentials.invalidate().await;
		}
		result
	}

	async fn connect(&self, generation: u64, credential: &Credential) -> Result<Opened> {
		let url = duplex_url(&self.duplex_base, credential.token());
		let TransportParts { sender, message_rx } =
			self.connector.connect(&url).await.map_err(|e| Error::ChannelOpenFailed {
				reason: e.reason,
				auth_rejected: e.auth_rejected,
			})?;

		Ok(Opened {
			channel: Arc::new(Channel::new(generation, url, sender)),
			message_rx,
		})
	}

	fn finish_attempt(self: &Arc<Self>, generation: u64, result: Result<Opened>) {
		let mut inner = self.inner.lock();
		if inner.generation != generation || inner.state != ChannelState::Opening {
			drop(inner);
			if let Ok(opened) = result {
				debug!(generation, "discarding channel opened after close");
				tokio::spawn(async move { opened.channel.close_transport().await });
			}
			return;
		}

		inner.attempt = None;
		let waiters = std::mem::take(&mut inner.waiters);
		let outcome = match result {
			Ok(Opened { channel, message_rx }) => {
				info!(generation, endpoint = %channel.endpoint(), "duplex channel open");
				inner.state = ChannelState::Open;
				inner.current = Some(Arc::clone(&channel));
				inner.pump = Some(self.spawn_pump(generation, message_rx));
				Ok(channel)
			}
			Err(err) => {
				warn!(generation, error = %err, "duplex channel open failed");
				inner.state = ChannelState::Closed;
				Err(err)
			}
		};
		drop(inner);

		settle(waiters, &outcome);
	}

	/// Forwards inbound events to the sink until the connection ends.
	///
	/// Holds only a weak reference so an open channel does not keep a
	/// discarded manager alive.
	fn spawn_pump(self: &Arc<Self>, generation: u64, mut message_rx: mpsc::UnboundedReceiver<TransportEvent>) -> JoinHandle<()> {
		let manager = Arc::downgrade(self);
		let sink = Arc::clone(&self.sink);

		tokio::spawn(async move {
			let info = loop {
				match message_rx.recv().await {
					Some(event) => {
						if let Some(info) = router::route(sink.as_ref(), event) {
							break info;
						}
					}
					None => {
						break CloseInfo {
							code: None,
							reason: "transport reader stopped".to_string(),
						};
					}
				}
			};

			if let Some(manager) = manager.upgrade() {
				manager.handle_disconnect(generation, info).await;
			}
		})
	}

	/// Unsolicited close of the open channel: report it, do not reconnect.
	async fn handle_disconnect(&self, generation: u64, info: CloseInfo) {
		{
			let mut inner = self.inner.lock();
			if inner.generation != generation || inner.state != ChannelState::Open {
				return;
			}
			inner.state = ChannelState::Closed;
			inner.pump = None;
			inner.current = None;
		}

		warn!(generation, code = ?info.code, reason = %info.reason, "duplex channel dropped");
		if info.is_auth_rejection() {
			self.credentials.invalidate().await;
		}

		self.sink.emit(
			Error::Disconnected {
				code: info.code,
				reason: info.reason,
			}
			.to_event(),
		);
	}

	fn mark_dead(&self, generation: u64) {
		let mut inner = self.inner.lock();
		if inner.generation == generation && inner.state == ChannelState::Open {
			warn!(generation, "duplex channel no longer writable");
			inner.state = ChannelState::Closed;
			if let Some(pump) = inner.pump.take() {
				pump.abort();
			}
			inner.current = None;
		}
	}

	fn finish_close(self: &Arc<Self>, generation: u64) {
		let mut inner = self.inner.lock();
		if inner.generation != generation || inner.state != ChannelState::Closing {
			return;
		}
		inner.state = ChannelState::Closed;
		debug!(generation, "duplex channel closed");

		if !inner.waiters.is_empty() {
			self.start_attempt(&mut inner);
		}
	}
}

/// Moves to `Closed`, aborting any attempt in flight, and hands back its waiters.
fn abort_opening(inner: &mut Inner) -> Vec<oneshot::Sender<OpenOutcome>> {
	if let Some(attempt) = inner.attempt.take() {
		attempt.abort();
	}
	inner.generation += 1;
	inner.state = ChannelState::Closed;
	std::mem::take(&mut inner.waiters)
}

fn closed_while_opening() -> OpenOutcome {
	Err(Error::ChannelOpenFailed {
		reason: "closed while opening".to_string(),
		auth_rejected: false,
	})
}

fn settle(waiters: Vec<oneshot::Sender<OpenOutcome>>, outcome: &OpenOutcome) {
	for waiter in waiters {
		let _ = waiter.send(outcome.clone());
	}
}
