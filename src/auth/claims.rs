//! Decoders for the identity payloads that accompany a token response.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{HomeAccountId, TokenSecret},
	error::ConfigError,
};

/// Subset of ID token claims the cache keys records by.
///
/// The signature is not verified; the token arrived over the same channel as the access token
/// and is only used to label cache records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
	/// Object id of the user in the issuing tenant.
	#[serde(default)]
	pub oid: Option<String>,
	/// Subject; the only stable id federation servers emit.
	#[serde(default)]
	pub sub: Option<String>,
	/// Issuing tenant.
	#[serde(default)]
	pub tid: Option<String>,
	/// Sign-in name.
	#[serde(default)]
	pub preferred_username: Option<String>,
	/// User principal name, emitted by federation servers instead of `preferred_username`.
	#[serde(default)]
	pub upn: Option<String>,
	/// Display name.
	#[serde(default)]
	pub name: Option<String>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		let payload = raw.split('.').nth(1).filter(|segment| !segment.is_empty()).ok_or_else(|| {
			ConfigError::InvalidIdToken { reason: "token has no payload segment".into() }
		})?;
		let bytes = decode_segment(payload)
			.map_err(|e| ConfigError::InvalidIdToken { reason: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| ConfigError::InvalidIdToken { reason: e.to_string() })
	}

	/// Object id when present, otherwise the subject.
	pub fn unique_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref()).filter(|id| !id.is_empty())
	}
}

/// `client_info` payload returned next to tokenized responses.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClientInfo {
	/// Stable user id.
	pub uid: String,
	/// Home tenant of the user.
	pub utid: String,
}
impl ClientInfo {
	/// Decodes the base64url JSON blob.
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		let bytes = decode_segment(raw)
			.map_err(|e| ConfigError::InvalidClientInfo { reason: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| ConfigError::InvalidClientInfo { reason: e.to_string() })
	}

	/// `{uid}.{utid}` account identifier.
	pub fn home_account_id(&self) -> Result<HomeAccountId, ConfigError> {
		Ok(HomeAccountId::from_parts(&self.uid, &self.utid)?)
	}
}

/// Incoming assertion of an on-behalf-of exchange.
///
/// Records minted from it are keyed by [`cache_key`](Self::cache_key): the base64url SHA-256 of
/// the assertion, or a caller-chosen key for long-running sessions whose assertion rotates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAssertion {
	assertion: TokenSecret,
	cache_key: String,
}
impl UserAssertion {
	/// Wraps a raw assertion and derives its hash.
	pub fn new(assertion: impl Into<String>) -> Self {
		let assertion = TokenSecret::new(assertion);
		let cache_key = assertion_hash(assertion.expose());

		Self { assertion, cache_key }
	}

	/// Replaces the derived hash with a long-running session key.
	pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
		self.cache_key = key.into();

		self
	}

	/// Key stored in `user_assertion_hash` of matching records.
	pub fn cache_key(&self) -> &str {
		&self.cache_key
	}

	/// The raw assertion.
	pub fn assertion(&self) -> &TokenSecret {
		&self.assertion
	}
}

fn assertion_hash(raw: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(raw.as_bytes()))
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
	URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}
