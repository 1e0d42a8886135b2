//! Pure record filters applied by cache lookups.
//!
//! Filters run in a fixed order: identity (assertion hash, or tenant and home account), client,
//! scopes, environment aliases, key binding. Ambiguity and expiry are judged by the caller on
//! whatever survives.

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenRecord, ClientId, ScopeSet},
	discovery::InstanceMetadataEntry,
};

/// Tokens expiring within this window are treated as already expired.
pub const EXPIRY_BUFFER: Duration = Duration::minutes(5);
/// Expiries further out than this are treated as corrupt.
pub const MAX_PLAUSIBLE_LIFETIME: Duration = Duration::days(3650);

/// Identity constraints of an access token lookup.
#[derive(Clone, Debug)]
pub struct AccessTokenQuery<'a> {
	/// Client owning the cache.
	pub client_id: &'a ClientId,
	/// Required tenant; `None` skips tenant filtering.
	pub tenant: Option<&'a str>,
	/// Required home account id; `None` skips account filtering.
	pub home_account_id: Option<&'a str>,
	/// On-behalf-of hash; replaces the account filter when present.
	pub assertion_hash: Option<&'a str>,
	/// Requested scopes, reserved OIDC scopes already removed.
	pub scopes: &'a ScopeSet,
	/// Required key binding.
	pub key_id: Option<&'a str>,
}

/// Whether a matched access token may be served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Usability {
	/// Valid beyond the expiry buffer.
	Valid,
	/// Only the extended expiry keeps it usable.
	Extended,
	/// Expired or inside the buffer.
	Expired,
	/// Expiry is implausibly far away.
	Corrupt,
}

/// Drops records that belong to another identity or client, or lack a requested scope.
pub fn filter_by_identity(
	mut records: Vec<AccessTokenRecord>,
	query: &AccessTokenQuery,
) -> Vec<AccessTokenRecord> {
	records.retain(|record| query.client_id.matches(&record.client_id));

	match query.assertion_hash {
		Some(hash) => records.retain(|record| record.user_assertion_hash.as_deref() == Some(hash)),
		None => {
			records.retain(|record| record.user_assertion_hash.is_none());

			if let Some(home) = query.home_account_id {
				records.retain(|record| record.home_account_id.eq_ignore_ascii_case(home));
			}
		},
	}

	if let Some(tenant) = query.tenant {
		records.retain(|record| record.realm.eq_ignore_ascii_case(tenant));
	}

	records.retain(|record| record.scopes().is_superset_of(query.scopes));

	tracing::debug!(remaining = records.len(), "access tokens after identity and scope filters");

	records
}

/// Keeps records under the preferred cache host when any exist, otherwise records under any
/// alias.
pub fn filter_by_environment<T, F>(
	records: Vec<T>,
	metadata: &InstanceMetadataEntry,
	environment: F,
) -> Vec<T>
where
	F: Fn(&T) -> &str,
{
	if records.iter().any(|record| metadata.is_preferred_cache(environment(record))) {
		return records
			.into_iter()
			.filter(|record| metadata.is_preferred_cache(environment(record)))
			.collect();
	}

	records.into_iter().filter(|record| metadata.contains_alias(environment(record))).collect()
}

/// Keeps records whose key binding equals the requested one; unbound matches unbound only.
pub fn filter_by_key_id(mut records: Vec<AccessTokenRecord>, key_id: Option<&str>) -> Vec<AccessTokenRecord> {
	records.retain(|record| {
		let bound = record.key_id.as_deref().filter(|id| !id.is_empty());

		match (bound, key_id) {
			(None, None) => true,
			(Some(bound), Some(requested)) => bound == requested,
			_ => false,
		}
	});

	records
}

/// Judges a matched token at `now`.
pub fn usability(record: &AccessTokenRecord, now: OffsetDateTime, extended_enabled: bool) -> Usability {
	if record.expires_on > now + MAX_PLAUSIBLE_LIFETIME {
		return Usability::Corrupt;
	}
	if record.expires_on > now + EXPIRY_BUFFER {
		return Usability::Valid;
	}
	if extended_enabled
		&& record.extended_expires_on.is_some_and(|extended| extended > now + EXPIRY_BUFFER)
	{
		return Usability::Extended;
	}

	Usability::Expired
}

/// True when the token is still valid beyond the expiry buffer.
pub fn is_unexpired(record: &AccessTokenRecord, now: OffsetDateTime) -> bool {
	record.expires_on > now + EXPIRY_BUFFER
}
