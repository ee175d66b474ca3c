//! Duplex transport seam.
//!
//! A [`Connector`] performs the handshake and hands back [`TransportParts`]:
//! a [`Transport`] for outbound frames and a receiver of [`TransportEvent`]s
//! fed by a background reader. The channel manager only ever talks to these
//! traits; [`WebSocketConnector`] is the production implementation.

mod websocket;


use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

pub use websocket::WebSocketConnector;

use crate::error::Result;

/// Something the reader observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// A complete text frame.
	Frame(String),
	/// A frame that could not be turned into text.
	Malformed(String),
	/// The connection ended. Always the last event.
	Closed(CloseInfo),
}

/// Why a connection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
	/// WebSocket close code, if the peer sent one.
	pub code: Option<u16>,
	pub reason: String,
}

impl CloseInfo {
	/// Close codes the chat backend uses to refuse a credential.
	const AUTH_REJECTION_CODES: [u16; 3] = [1008, 4401, 4403];

	pub fn is_auth_rejection(&self) -> bool {
		self.code.is_some_and(|code| Self::AUTH_REJECTION_CODES.contains(&code))
	}
}

/// Outbound half of an open connection.
#[async_trait]
pub trait Transport: Send {
	/// Writes one frame. Fails with [`Error::ChannelNotOpen`] once the
	/// connection is gone.
	///
	/// [`Error::ChannelNotOpen`]: crate::Error::ChannelNotOpen
	async fn send(&mut self, frame: String) -> Result<()>;

	/// Closes the connection. Never fails; closing twice is harmless.
	async fn close(&mut self);
}

/// An open connection split into its outbound and inbound halves.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub message_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Handshake failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
	pub reason: String,
	/// The server refused the credential.
	pub auth_rejected: bool,
}

/// Opens duplex connections.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self, url: &Url) -> std::result::Result<TransportParts, ConnectError>;
}
