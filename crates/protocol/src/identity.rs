//! Identity supplied by the embedding UI.

use serde::{Deserialize, Serialize};

/// The signed-in user, as known to the embedding UI.
///
/// Fixed for the lifetime of a chat session. Only `id` is required to be
/// non-empty; see [`Identity::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Member id issued by the Skooly backend.
	pub id: String,
	/// Name shown to the chat backend. May be empty.
	pub display_name: String,
	/// Contact handle (username or email). May be empty.
	pub contact: String,
}

impl Identity {
	pub fn new(id: impl Into<String>, display_name: impl Into<String>, contact: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			display_name: display_name.into(),
			contact: contact.into(),
		}
	}

	/// Returns `true` if the id is non-empty after trimming.
	pub fn is_valid(&self) -> bool {
		!self.id.trim().is_empty()
	}

	/// Builds the body sent to the identity endpoint.
	pub fn to_token_request(&self) -> TokenRequest<'_> {
		TokenRequest {
			id: &self.id,
			name: &self.display_name,
			contact: &self.contact,
		}
	}
}

/// Body of `POST /auth/token/public`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenRequest<'a> {
	pub id: &'a str,
	pub name: &'a str,
	pub contact: &'a str,
}
