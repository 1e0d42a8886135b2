//! Completed token response handed to the cache by the request layer.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	authority::Authority,
};

const BEARER: &str = "Bearer";

/// Token endpoint response, already parsed by the caller.
#[derive(Clone, Debug)]
pub struct TokenResponse {
	/// Access token.
	pub access_token: TokenSecret,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Raw compact ID token.
	pub id_token: Option<TokenSecret>,
	/// Raw base64url client info.
	pub client_info: Option<String>,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Token type, `Bearer` unless a scheme such as proof-of-possession was negotiated.
	pub token_type: String,
	/// Lifetime of the access token.
	pub expires_in: Duration,
	/// Lifetime honored while the provider is unavailable.
	pub extended_expires_in: Option<Duration>,
	/// Family id when the client belongs to a family of client ids.
	pub family_id: Option<String>,
	/// Authority that actually issued the tokens, when it differs from the request's.
	pub authority: Option<Authority>,
}
impl TokenResponse {
	/// Creates a bearer response.
	pub fn new(access_token: impl Into<String>, scopes: ScopeSet, expires_in: Duration) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			id_token: None,
			client_info: None,
			scopes,
			token_type: BEARER.into(),
			expires_in,
			extended_expires_in: None,
			family_id: None,
			authority: None,
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches a raw ID token.
	pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches raw client info.
	pub fn with_client_info(mut self, client_info: impl Into<String>) -> Self {
		self.client_info = Some(client_info.into());

		self
	}

	/// Overrides the token type.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Sets the extended lifetime.
	pub fn with_extended_expires_in(mut self, extended: Duration) -> Self {
		self.extended_expires_in = Some(extended);

		self
	}

	/// Sets the family id.
	pub fn with_family_id(mut self, family_id: impl Into<String>) -> Self {
		self.family_id = Some(family_id.into());

		self
	}

	/// Records the authority that issued the tokens.
	pub fn with_authority(mut self, authority: Authority) -> Self {
		self.authority = Some(authority);

		self
	}

	/// True when the token type is `Bearer` in any case.
	pub fn is_bearer(&self) -> bool {
		self.token_type.eq_ignore_ascii_case(BEARER)
	}

	/// Family id, treating the empty string as absent.
	pub fn family(&self) -> Option<&str> {
		self.family_id.as_deref().filter(|id| !id.is_empty())
	}
}
