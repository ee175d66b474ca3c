//! Chat backend configuration and endpoint derivation.

use url::Url;

use crate::error::{Error, Result};

/// Base URL used when neither a flag nor the environment provides one.
pub const DEFAULT_BASE_URL: &str = "https://nonelicited-curably-twanda.ngrok-free.dev";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "SKOOLY_CHAT_URL";

const IDENTITY_PATH: &str = "/auth/token/public";
const DUPLEX_PATH: &str = "/chat/ws";

/// Resolved chat backend endpoints.
///
/// Built from a single HTTP(S) base URL; the duplex endpoint swaps the scheme
/// for its WebSocket counterpart (`http` to `ws`, `https` to `wss`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
	base_url: String,
	identity_url: Url,
	duplex_url: Url,
}

impl ChatConfig {
	/// Validates and normalizes `base_url`. Trailing slashes are dropped.
	pub fn new(base_url: &str) -> Result<Self> {
		let base_url = base_url.trim().trim_end_matches('/').to_string();
		let parsed = Url::parse(&base_url).map_err(|e| Error::Config(format!("'{base_url}': {e}")))?;

		let duplex_scheme = match parsed.scheme() {
			"http" => "ws",
			"https" => "wss",
			other => {
				return Err(Error::Config(format!(
					"'{base_url}': scheme must be http or https, not {other}"
				)));
			}
		};
		if parsed.host_str().is_none_or(str::is_empty) {
			return Err(Error::Config(format!("'{base_url}': missing host")));
		}
		if parsed.query().is_some() || parsed.fragment().is_some() {
			return Err(Error::Config(format!(
				"'{base_url}': base URL must not carry a query or fragment"
			)));
		}

		let identity_url = join(&base_url, IDENTITY_PATH)?;
		let mut duplex_url = join(&base_url, DUPLEX_PATH)?;
		duplex_url
			.set_scheme(duplex_scheme)
			.map_err(|()| Error::Config(format!("'{base_url}': cannot derive {duplex_scheme} URL")))?;

		Ok(Self {
			base_url,
			identity_url,
			duplex_url,
		})
	}

	/// Resolves the base URL from an explicit value, then the environment
	/// value, then [`DEFAULT_BASE_URL`]. Blank values are skipped.
	pub fn resolve(explicit: Option<&str>, env: Option<&str>) -> Result<Self> {
		let base_url = [explicit, env]
			.into_iter()
			.flatten()
			.find(|value| !value.trim().is_empty())
			.unwrap_or(DEFAULT_BASE_URL);
		Self::new(base_url)
	}

	/// Reads [`BASE_URL_ENV`], falling back to [`DEFAULT_BASE_URL`].
	pub fn from_env() -> Result<Self> {
		let env = std::env::var(BASE_URL_ENV).ok();
		Self::resolve(None, env.as_deref())
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// `POST` target for credential issuance.
	pub fn identity_url(&self) -> &Url {
		&self.identity_url
	}

	/// Duplex endpoint without a credential attached.
	pub fn duplex_base(&self) -> &Url {
		&self.duplex_url
	}

	/// Duplex endpoint with `token` attached as a query parameter.
	pub fn duplex_url(&self, token: &str) -> Url {
		duplex_url(&self.duplex_url, token)
	}
}

/// Attaches a credential to a duplex endpoint. The token is percent-encoded.
pub fn duplex_url(base: &Url, token: &str) -> Url {
	let mut url = base.clone();
	url.query_pairs_mut().append_pair("token", token);
	url
}

/// Renders a URL with the `token` query value masked, for logs.
pub fn redact_token(url: &Url) -> String {
	if !url.query_pairs().any(|(key, _)| key == "token") {
		return url.to_string();
	}
	let mut redacted = url.clone();
	let pairs: Vec<(String, String)> = url
		.query_pairs()
		.map(|(key, value)| {
			let value = if key == "token" { "***".to_string() } else { value.into_owned() };
			(key.into_owned(), value)
		})
		.collect();
	redacted.query_pairs_mut().clear().extend_pairs(pairs);
	redacted.to_string()
}

fn join(base_url: &str, path: &str) -> Result<Url> {
	Url::parse(&format!("{base_url}{path}")).map_err(|e| Error::Config(format!("'{base_url}{path}': {e}")))
}
