//! Error types for the chat runtime.

use skooly_protocol::ChatEvent;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat backend.
///
/// `Clone` so that a single failed open attempt can settle every caller that
/// joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// Identity has no member id.
	#[error("identity is missing a member id")]
	InvalidIdentity,

	/// Outbound message text was empty or whitespace only.
	#[error("message text is empty")]
	EmptyMessage,

	/// Base URL could not be used to derive the chat endpoints.
	#[error("invalid chat configuration: {0}")]
	Config(String),

	/// The identity endpoint failed or returned no usable token.
	#[error("credential unavailable{}: {body}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
	CredentialUnavailable {
		/// HTTP status, if the endpoint answered at all.
		status: Option<u16>,
		/// Response body or transport error text, for diagnostics.
		body: String,
	},

	/// The duplex handshake failed.
	#[error("channel open failed: {reason}")]
	ChannelOpenFailed {
		reason: String,
		/// The server refused the credential (HTTP 401/403 on upgrade).
		auth_rejected: bool,
	},

	/// A send was attempted on a channel that is no longer writable.
	#[error("channel is not open")]
	ChannelNotOpen,

	/// The server or network closed an open channel.
	#[error("connection to the chat server was lost{}", code.map(|c| format!(" (close code {c})")).unwrap_or_default())]
	Disconnected { code: Option<u16>, reason: String },

	/// An inbound frame could not be interpreted.
	#[error("malformed frame: {0}")]
	MalformedFrame(String),
}

impl Error {
	/// Returns true if this failure means the credential was refused.
	pub fn is_auth_rejection(&self) -> bool {
		matches!(self, Error::ChannelOpenFailed { auth_rejected: true, .. })
	}

	/// Converts this error into the event delivered to subscribers.
	pub fn to_event(&self) -> ChatEvent {
		ChatEvent::error(self.to_string())
	}
}

impl From<skooly_protocol::EncodeError> for Error {
	fn from(_: skooly_protocol::EncodeError) -> Self {
		Error::EmptyMessage
	}
}
