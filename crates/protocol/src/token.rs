//! Credential extraction from identity endpoint responses.
//!
//! The identity service does not commit to a response schema: the credential
//! has been seen as `accesstoken`, `accessToken` and nested under `data`. This
//! module contains that leniency in one place.

use serde_json::Value;

/// Returns the first string value whose key contains `token` (ASCII
/// case-insensitive).
///
/// Objects are scanned in document order and the search descends depth-first
/// into nested objects and arrays. Non-string values under token-like keys are
/// skipped, so `{"token": {"value": "x"}}` keeps searching inside the nested
/// object rather than matching it.
pub fn find_token(value: &Value) -> Option<&str> {
	match value {
		Value::Object(map) => {
			for (key, value) in map {
				if let Value::String(token) = value {
					if is_token_key(key) {
						return Some(token.as_str());
					}
				}
				if let Some(token) = find_token(value) {
					return Some(token);
				}
			}
			None
		}
		Value::Array(items) => items.iter().find_map(find_token),
		_ => None,
	}
}

fn is_token_key(key: &str) -> bool {
	key.to_ascii_lowercase().contains("token")
}
