//! Values returned by cache lookups.

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRecord, HomeAccountId, IdTokenRecord, RefreshTokenRecord},
};

/// A signed-in identity as seen through the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
	/// `{uid}.{utid}` identifier; absent for users only known to the legacy store without client
	/// info.
	pub home_account_id: Option<HomeAccountId>,
	/// Sign-in name.
	pub username: String,
	/// Host the account was requested through.
	pub environment: String,
	/// One entry per tenant the user signed in to.
	pub tenant_profiles: Vec<TenantProfile>,
}
impl Account {
	/// Creates an account without tenant profiles.
	pub fn new(
		home_account_id: Option<HomeAccountId>,
		username: impl Into<String>,
		environment: impl Into<String>,
	) -> Self {
		Self {
			home_account_id,
			username: username.into(),
			environment: environment.into(),
			tenant_profiles: Vec::new(),
		}
	}

	/// Attaches tenant profiles.
	pub fn with_tenant_profiles(mut self, profiles: Vec<TenantProfile>) -> Self {
		self.tenant_profiles = profiles;

		self
	}

	/// Home account id as a plain string, empty when absent.
	pub fn home_account_key(&self) -> &str {
		self.home_account_id.as_deref().unwrap_or_default()
	}

	/// Tenant half of the home account id.
	pub fn home_tenant(&self) -> Option<&str> {
		self.home_account_id.as_ref().and_then(HomeAccountId::home_tenant)
	}
}

/// Presence of an account in one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantProfile {
	/// Tenant id.
	pub tenant_id: String,
	/// Object id of the user in that tenant, when the ID token carried one.
	pub object_id: Option<String>,
	/// True for the tenant the account lives in.
	pub is_home_tenant: bool,
}

/// Access token served from cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedAccessToken {
	/// Matched record.
	pub record: AccessTokenRecord,
	/// True when only the extended expiry kept the token usable.
	pub is_extended_lifetime: bool,
}

/// Records written by one `save_token_response` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedTokens {
	/// Access token, absent only when the write was skipped.
	pub access_token: Option<AccessTokenRecord>,
	/// Refresh token, when the response carried one.
	pub refresh_token: Option<RefreshTokenRecord>,
	/// ID token, when the response carried one.
	pub id_token: Option<IdTokenRecord>,
	/// Account derived from the ID token and client info.
	pub account: Option<Account>,
}

/// Family-of-client-ids membership as recorded in app metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FociMembership {
	/// Metadata names the requested family.
	Member,
	/// Metadata exists and names another family or none.
	NotMember,
	/// No metadata exists for any alias; membership was never observed.
	Unknown,
}
impl FociMembership {
	/// True for [`Self::Member`] and [`Self::Unknown`], the states in which a family refresh
	/// token is worth trying.
	pub fn may_use_family_token(self) -> bool {
		!matches!(self, FociMembership::NotMember)
	}
}
