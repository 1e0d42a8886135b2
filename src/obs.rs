//! Observability helpers for cache operations.
//!
//! Every engine operation runs inside an `identity_cache.operation` span carrying the
//! `operation` and `stage` fields. Enable the `metrics` feature to increment the
//! `identity_cache_operation_total` counter, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Cache operations observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOperation {
	/// Silent access token lookup.
	FindAccessToken,
	/// Refresh token lookup.
	FindRefreshToken,
	/// Token response write.
	SaveTokenResponse,
	/// Account removal.
	RemoveAccount,
	/// Account enumeration.
	GetAccounts,
	/// Family membership check.
	IsFociMember,
	/// Full cache wipe.
	Clear,
	/// Network instance discovery.
	InstanceDiscovery,
}
impl CacheOperation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOperation::FindAccessToken => "find_access_token",
			CacheOperation::FindRefreshToken => "find_refresh_token",
			CacheOperation::SaveTokenResponse => "save_token_response",
			CacheOperation::RemoveAccount => "remove_account",
			CacheOperation::GetAccounts => "get_accounts",
			CacheOperation::IsFociMember => "is_foci_member",
			CacheOperation::Clear => "clear",
			CacheOperation::InstanceDiscovery => "instance_discovery",
		}
	}
}
impl Display for CacheOperation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// Entry to an operation.
	Attempt,
	/// Lookup served from cache.
	Hit,
	/// Lookup found nothing usable.
	Miss,
	/// Non-lookup operation completed.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CacheOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Attempt => "attempt",
			CacheOutcome::Hit => "hit",
			CacheOutcome::Miss => "miss",
			CacheOutcome::Success => "success",
			CacheOutcome::Failure => "failure",
		}
	}
}
impl Display for CacheOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
