//! Request context passed to cache lookups and writes.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, UserAssertion},
	authority::Authority,
	cache::Account,
};

/// Which identity a request acts for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestKind {
	/// Signed-in user.
	User,
	/// The application itself; records carry no account.
	ClientCredentials,
	/// A service acting for the user behind the assertion.
	OnBehalfOf(UserAssertion),
}

/// Parameters of one cache operation.
#[derive(Clone, Debug)]
pub struct CacheRequest {
	/// Authority the request targets; lookups miss when it is unresolved.
	pub authority: Option<Authority>,
	/// Requested scopes.
	pub scopes: ScopeSet,
	/// Acting identity.
	pub kind: RequestKind,
	/// Account for user requests.
	pub account: Option<Account>,
	/// Proof-of-possession key binding the token must carry.
	pub key_id: Option<String>,
	/// Aborts pending notifications and discovery calls.
	pub cancellation: CancellationToken,
}
impl CacheRequest {
	/// User request against a resolved authority.
	pub fn new(authority: Authority, scopes: ScopeSet) -> Self {
		Self {
			authority: Some(authority),
			scopes,
			kind: RequestKind::User,
			account: None,
			key_id: None,
			cancellation: CancellationToken::new(),
		}
	}

	/// User request whose authority has not been resolved yet.
	pub fn unresolved(scopes: ScopeSet) -> Self {
		Self {
			authority: None,
			scopes,
			kind: RequestKind::User,
			account: None,
			key_id: None,
			cancellation: CancellationToken::new(),
		}
	}

	/// Acts as the application itself.
	pub fn client_credentials(mut self) -> Self {
		self.kind = RequestKind::ClientCredentials;

		self
	}

	/// Acts for the user behind `assertion`.
	pub fn on_behalf_of(mut self, assertion: UserAssertion) -> Self {
		self.kind = RequestKind::OnBehalfOf(assertion);

		self
	}

	/// Targets one account.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Requires a proof-of-possession key binding.
	pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
		self.key_id = Some(key_id.into());

		self
	}

	/// Uses a caller-owned cancellation signal.
	pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
		self.cancellation = cancellation;

		self
	}

	/// True for app-only requests.
	pub fn is_client_credentials(&self) -> bool {
		matches!(self.kind, RequestKind::ClientCredentials)
	}

	/// Assertion of an on-behalf-of request.
	pub fn user_assertion(&self) -> Option<&UserAssertion> {
		match &self.kind {
			RequestKind::OnBehalfOf(assertion) => Some(assertion),
			_ => None,
		}
	}

	/// Tenant records must belong to.
	///
	/// A specific authority tenant wins. A common tenant resolves to the account's home tenant on
	/// user requests and to nothing otherwise, which disables tenant filtering.
	pub fn tenant(&self) -> Option<String> {
		let authority = self.authority.as_ref()?;

		if let Some(tenant) = authority.specific_tenant() {
			return Some(tenant.to_string());
		}

		match (&self.kind, &self.account) {
			(RequestKind::User, Some(account)) if authority.is_common_tenant() =>
				account.home_tenant().map(str::to_owned),
			_ => None,
		}
	}

	/// Normalized key id; empty ids count as none.
	pub fn key_id(&self) -> Option<&str> {
		self.key_id.as_deref().filter(|id| !id.is_empty())
	}
}
