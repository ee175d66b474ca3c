//! Credential Provider - exchanges an identity for a duplex access token.
//!
//! The provider caches at most one credential. A cached credential is returned
//! without touching the network; [`CredentialProvider::invalidate`] discards it
//! so the next call asks the identity endpoint again.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{Value, json};
use skooly_protocol::{Identity, find_token};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

/// Short-lived bearer token for opening duplex channels.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	token: String,
	issued_at: SystemTime,
}

impl Credential {
	pub fn new(token: impl Into<String>) -> Self {
		Self {
			token: token.into(),
			issued_at: SystemTime::now(),
		}
	}

	pub fn token(&self) -> &str {
		&self.token
	}

	pub fn issued_at(&self) -> SystemTime {
		self.issued_at
	}
}

impl std::fmt::Debug for Credential {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credential")
			.field("token", &"***")
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Where [`CredentialProvider::acquire`] got its credential from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
	Cached,
	Issued,
}

/// Raw answer from the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResponse {
	pub status: u16,
	pub body: String,
}

/// Transport for the identity endpoint.
///
/// Implementations only move bytes; status checks and token extraction live in
/// [`CredentialProvider`].
#[async_trait]
pub trait IdentityEndpoint: Send + Sync {
	async fn request(&self, identity: &Identity) -> Result<IdentityResponse>;
}

/// `POST {base}/auth/token/public` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityEndpoint {
	client: reqwest::Client,
	url: Url,
}

impl HttpIdentityEndpoint {
	pub fn new(url: Url) -> Self {
		Self::with_client(reqwest::Client::new(), url)
	}

	pub fn with_client(client: reqwest::Client, url: Url) -> Self {
		Self { client, url }
	}
}

#[async_trait]
impl IdentityEndpoint for HttpIdentityEndpoint {
	async fn request(&self, identity: &Identity) -> Result<IdentityResponse> {
		let body = identity.to_token_request();
		debug!(url = %self.url, id = body.id, name = body.name, "requesting chat credential");

		let response = self
			.client
			.post(self.url.clone())
			.json(&body)
			.send()
			.await
			.map_err(|e| Error::CredentialUnavailable {
				status: None,
				body: e.to_string(),
			})?;

		let status = response.status().as_u16();
		let body = response.text().await.map_err(|e| Error::CredentialUnavailable {
			status: Some(status),
			body: e.to_string(),
		})?;

		Ok(IdentityResponse { status, body })
	}
}

/// Caches the current credential and fetches a new one when needed.
pub struct CredentialProvider {
	endpoint: Arc<dyn IdentityEndpoint>,
	current: Mutex<Option<Credential>>,
}

impl CredentialProvider {
	pub fn new(endpoint: Arc<dyn IdentityEndpoint>) -> Self {
		Self {
			endpoint,
			current: Mutex::new(None),
		}
	}

	/// Returns the current credential, requesting one if none is cached.
	pub async fn get_credential(&self, identity: &Identity) -> Result<Credential> {
		self.acquire(identity).await.map(|(credential, _)| credential)
	}

	/// Like [`get_credential`](Self::get_credential), also reporting whether
	/// the credential came from the cache.
	///
	/// The cache lock is held across the request, so concurrent callers share
	/// one round trip.
	pub async fn acquire(&self, identity: &Identity) -> Result<(Credential, CredentialSource)> {
		if !identity.is_valid() {
			return Err(Error::InvalidIdentity);
		}

		let mut current = self.current.lock().await;
		if let Some(credential) = current.as_ref() {
			trace!("reusing cached chat credential");
			return Ok((credential.clone(), CredentialSource::Cached));
		}

		let response = self.endpoint.request(identity).await?;
		let credential = extract_credential(response).inspect_err(|e| {
			warn!(error = %e, "chat credential request failed");
		})?;
		info!("chat credential issued");

		*current = Some(credential.clone());
		Ok((credential, CredentialSource::Issued))
	}

	/// Discards the current credential.
	pub async fn invalidate(&self) {
		if self.current.lock().await.take().is_some() {
			debug!("chat credential invalidated");
		}
	}

	/// Returns true if a credential is cached.
	pub async fn has_credential(&self) -> bool {
		self.current.lock().await.is_some()
	}
}

/// Validates the status and pulls the first token-like string out of the body.
///
/// Bodies that are not JSON are scanned as `{"raw": body}`, which only matches
/// if some future schema calls that field a token; in practice it means the
/// body is reported back verbatim.
fn extract_credential(response: IdentityResponse) -> Result<Credential> {
	let IdentityResponse { status, body } = response;
	trace!(status, body = %body, "identity endpoint response");

	if !(200..300).contains(&status) {
		return Err(Error::CredentialUnavailable {
			status: Some(status),
			body,
		});
	}

	let value: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "raw": body }));
	match find_token(&value) {
		Some(token) if !token.is_empty() => Ok(Credential::new(token)),
		_ => Err(Error::CredentialUnavailable {
			status: Some(status),
			body,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedIdentityEndpoint;

	fn identity() -> Identity {
		Identity::new("42", "Jo", "jo@x.com")
	}

	fn ok(body: &str) -> IdentityResponse {
		IdentityResponse {
			status: 200,
			body: body.to_string(),
		}
	}

	#[test]
	fn extracts_flat_token() {
		let credential = extract_credential(ok(r#"{"accesstoken":"tok-1"}"#)).unwrap();
		assert_eq!(credential.token(), "tok-1");
	}

	#[test]
	fn extracts_nested_token() {
		let credential = extract_credential(ok(r#"{"isSuccess":true,"result":{"accessToken":"tok-2"}}"#)).unwrap();
		assert_eq!(credential.token(), "tok-2");
	}

	#[test]
	fn non_success_status_is_unavailable() {
		let err = extract_credential(IdentityResponse {
			status: 503,
			body: r#"{"accesstoken":"ignored"}"#.into(),
		})
		.unwrap_err();
		assert_eq!(
			err,
			Error::CredentialUnavailable {
				status: Some(503),
				body: r#"{"accesstoken":"ignored"}"#.into(),
			}
		);
	}

	#[test]
	fn body_without_token_is_unavailable() {
		let err = extract_credential(ok(r#"{"user":{"id":42}}"#)).unwrap_err();
		assert!(matches!(err, Error::CredentialUnavailable { status: Some(200), .. }));
	}

	#[test]
	fn non_json_body_is_unavailable_and_reported() {
		let err = extract_credential(ok("<html>gateway</html>")).unwrap_err();
		match err {
			Error::CredentialUnavailable { body, .. } => assert_eq!(body, "<html>gateway</html>"),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn empty_token_is_unavailable() {
		assert!(extract_credential(ok(r#"{"token":""}"#)).is_err());
	}

	#[test]
	fn debug_output_redacts_token() {
		let rendered = format!("{:?}", Credential::new("super-secret"));
		assert!(!rendered.contains("super-secret"));
	}

	#[tokio::test]
	async fn cached_credential_skips_the_endpoint() {
		let endpoint = Arc::new(ScriptedIdentityEndpoint::with_token("tok-1"));
		let provider = CredentialProvider::new(endpoint.clone());

		let (first, source) = provider.acquire(&identity()).await.unwrap();
		assert_eq!(source, CredentialSource::Issued);
		let (second, source) = provider.acquire(&identity()).await.unwrap();
		assert_eq!(source, CredentialSource::Cached);

		assert_eq!(first, second);
		assert_eq!(endpoint.request_count(), 1);
	}

	#[tokio::test]
	async fn invalidate_forces_a_new_request() {
		let endpoint = Arc::new(ScriptedIdentityEndpoint::with_token("tok-1"));
		let provider = CredentialProvider::new(endpoint.clone());

		provider.get_credential(&identity()).await.unwrap();
		provider.invalidate().await;
		assert!(!provider.has_credential().await);
		provider.get_credential(&identity()).await.unwrap();

		assert_eq!(endpoint.request_count(), 2);
	}

	#[tokio::test]
	async fn failures_are_not_cached() {
		let endpoint = Arc::new(ScriptedIdentityEndpoint::with_token("tok-2"));
		endpoint.push_response(500, "down");
		let provider = CredentialProvider::new(endpoint.clone());

		let err = provider.get_credential(&identity()).await.unwrap_err();
		assert!(matches!(err, Error::CredentialUnavailable { status: Some(500), .. }));

		let credential = provider.get_credential(&identity()).await.unwrap();
		assert_eq!(credential.token(), "tok-2");
		assert_eq!(endpoint.request_count(), 2);
	}

	#[tokio::test]
	async fn blank_identity_is_rejected_before_any_request() {
		let endpoint = Arc::new(ScriptedIdentityEndpoint::with_token("tok-1"));
		let provider = CredentialProvider::new(endpoint.clone());

		let err = provider.get_credential(&Identity::new(" ", "Jo", "")).await.unwrap_err();
		assert_eq!(err, Error::InvalidIdentity);
		assert_eq!(endpoint.request_count(), 0);
	}

	#[tokio::test]
	async fn sends_identity_fields() {
		let endpoint = Arc::new(ScriptedIdentityEndpoint::with_token("tok-1"));
		let provider = CredentialProvider::new(endpoint.clone());

		provider.get_credential(&identity()).await.unwrap();
		assert_eq!(endpoint.identities(), vec![identity()]);
	}
}
