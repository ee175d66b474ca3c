//! Session Lifecycle Controller.

use std::sync::Arc;

use skooly_protocol::{ChatEvent, Identity, encode};
use skooly_runtime::{
	ChannelManager, ChannelState, ChatConfig, Connector, CredentialProvider, Error, EventSink, HttpIdentityEndpoint,
	IdentityEndpoint, Result, WebSocketConnector,
};
use tracing::{debug, warn};
use url::Url;

use crate::handlers::{Subscribers, Subscription};

/// One chat conversation for one identity.
///
/// Cheap to clone; clones share the channel and the subscriber list. Nothing
/// touches the network until the first message is sent. The channel is
/// torn down when the last clone is dropped.
///
/// ```ignore
/// let session = ChatSession::connect(ChatConfig::from_env()?, Identity::new("42", "Jo", ""))?;
/// session.subscribe(|event| println!("{event:?}"));
/// session.send_message("hi").await;
/// ```
#[derive(Clone)]
pub struct ChatSession {
	inner: Arc<SessionInner>,
}

struct SessionInner {
	identity: Identity,
	subscribers: Subscribers,
	channel: Arc<ChannelManager>,
}

impl Drop for SessionInner {
	fn drop(&mut self) {
		self.channel.shutdown();
	}
}

impl ChatSession {
	/// Creates a session talking HTTP and WebSocket to the configured backend.
	pub fn connect(config: ChatConfig, identity: Identity) -> Result<Self> {
		let endpoint = Arc::new(HttpIdentityEndpoint::new(config.identity_url().clone()));
		Self::with_parts(identity, endpoint, Arc::new(WebSocketConnector), config.duplex_base().clone())
	}

	/// Creates a session from explicit collaborators.
	///
	/// `duplex_base` is the duplex endpoint without a credential; the token is
	/// appended per connection.
	pub fn with_parts(
		identity: Identity,
		endpoint: Arc<dyn IdentityEndpoint>,
		connector: Arc<dyn Connector>,
		duplex_base: Url,
	) -> Result<Self> {
		if !identity.is_valid() {
			return Err(Error::InvalidIdentity);
		}

		let subscribers = Subscribers::new();
		let channel = ChannelManager::new(
			identity.clone(),
			CredentialProvider::new(endpoint),
			connector,
			duplex_base,
			Arc::new(subscribers.clone()),
		);
		debug!(id = %identity.id, "chat session created");

		Ok(Self {
			inner: Arc::new(SessionInner {
				identity,
				subscribers,
				channel,
			}),
		})
	}

	pub fn identity(&self) -> &Identity {
		&self.inner.identity
	}

	/// Current state of the underlying channel.
	pub fn state(&self) -> ChannelState {
		self.inner.channel.state()
	}

	/// Registers a handler for bot replies and errors.
	///
	/// Handlers are called in registration order from the task that produced
	/// the event and must not block.
	pub fn subscribe<F>(&self, handler: F) -> Subscription
	where
		F: Fn(ChatEvent) + Send + Sync + 'static,
	{
		self.inner.subscribers.subscribe(handler)
	}

	/// Sends `text`, opening the channel first if needed.
	///
	/// Blank text is ignored. Every failure is delivered to subscribers as a
	/// [`ChatEvent::Error`]; use [`try_send_message`](Self::try_send_message)
	/// to get it back instead.
	pub async fn send_message(&self, text: &str) {
		if text.trim().is_empty() {
			debug!("ignoring empty message");
			return;
		}

		if let Err(err) = self.try_send_message(text).await {
			self.inner.subscribers.emit(err.to_event());
		}
	}

	/// Like [`send_message`](Self::send_message) but returns the failure.
	///
	/// Surrounding whitespace is trimmed before sending. Blank text fails with
	/// [`Error::EmptyMessage`] without opening anything.
	pub async fn try_send_message(&self, text: &str) -> Result<()> {
		let frame = encode(text)?;

		let result = async {
			self.inner.channel.ensure_open().await?;
			self.inner.channel.send(frame).await
		}
		.await;

		if let Err(err) = &result {
			warn!(error = %err, "chat message not delivered");
		}
		result
	}

	/// Closes the channel. Subscribers stay registered and the next message
	/// opens a new channel.
	pub async fn close(&self) {
		self.inner.channel.close().await;
	}
}

impl std::fmt::Debug for ChatSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChatSession")
			.field("id", &self.inner.identity.id)
			.field("state", &self.state())
			.field("subscribers", &self.inner.subscribers.len())
			.finish()
	}
}
