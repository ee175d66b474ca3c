//! Events delivered to subscribers and the transcript entries built from them.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Event delivered to chat subscribers.
///
/// This is the only shape subscribers ever observe: inbound frames, transport
/// failures and credential failures all arrive as one of these two variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
	/// Bot reply text.
	Reply { text: String },
	/// Something went wrong; `message` is a diagnostic, not user copy.
	Error { message: String },
}

impl ChatEvent {
	pub fn reply(text: impl Into<String>) -> Self {
		Self::Reply { text: text.into() }
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self::Error { message: message.into() }
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Self::Error { .. })
	}
}

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
	User,
	Bot,
}

/// One line of the chat transcript.
///
/// Transcripts are append-only and owned by the UI; the session core emits
/// [`ChatEvent`]s and keeps no history of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
	pub id: String,
	pub sender: Sender,
	pub text: String,
	pub timestamp: SystemTime,
}

impl ChatMessage {
	pub fn new(id: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			sender,
			text: text.into(),
			timestamp: SystemTime::now(),
		}
	}
}
