//! Frame codec for the duplex channel.
//!
//! Outbound there is exactly one shape, `{"text": "..."}`. Inbound frames are
//! loosely structured: the reply text may live under `reply`, `message` or
//! `text`. Decoding never fails; anything unrecognized becomes a
//! [`ChatEvent::Error`] so it still reaches the UI.

use serde_json::{Value, json};

use crate::event::ChatEvent;

/// Inbound keys checked for reply text, in preference order.
const REPLY_KEYS: [&str; 3] = ["reply", "message", "text"];

/// Maximum number of characters of a malformed payload echoed into an error event.
const MAX_ECHO_CHARS: usize = 200;

/// Outbound text was empty or whitespace only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message text is empty")]
pub struct EncodeError;

/// Encodes user text as a wire frame.
///
/// Leading and trailing whitespace is trimmed; blank input is rejected.
pub fn encode(text: &str) -> Result<String, EncodeError> {
	let text = text.trim();
	if text.is_empty() {
		return Err(EncodeError);
	}
	Ok(json!({ "text": text }).to_string())
}

/// Decodes an inbound wire frame into a [`ChatEvent`].
pub fn decode(frame: &str) -> ChatEvent {
	let value: Value = match serde_json::from_str(frame) {
		Ok(value) => value,
		Err(e) => {
			return ChatEvent::error(format!("malformed frame ({e}): {}", truncate(frame)));
		}
	};

	if let Value::Object(map) = &value {
		let reply = REPLY_KEYS
			.iter()
			.filter_map(|key| map.get(*key).and_then(Value::as_str))
			.find(|text| !text.is_empty());
		if let Some(text) = reply {
			return ChatEvent::reply(text);
		}
	}

	ChatEvent::error(format!("unrecognized frame: {value}"))
}

fn truncate(raw: &str) -> String {
	match raw.char_indices().nth(MAX_ECHO_CHARS) {
		Some((idx, _)) => format!("{}...", &raw[..idx]),
		None => raw.to_string(),
	}
}
