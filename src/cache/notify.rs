//! Persistence hooks invoked around every cache operation.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	cache::Account,
	codec::CacheSerializer,
};

/// Future returned by [`CacheNotification`] hooks.
pub type NotificationFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Caller-supplied persistence capability.
///
/// Hooks run while the cache lock is held. They may read or replace the cache state through
/// [`NotificationArgs::cache`], but must not call back into the token cache itself; doing so
/// fails with [`Error::ReentrantAccess`].
pub trait CacheNotification
where
	Self: Send + Sync,
{
	/// Runs after the lock is taken and before records are read.
	fn on_before_access<'a>(&'a self, _args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async { Ok(()) })
	}

	/// Runs before records are mutated.
	fn on_before_write<'a>(&'a self, _args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async { Ok(()) })
	}

	/// Runs before the lock is released, including after failures.
	fn on_after_access<'a>(&'a self, _args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async { Ok(()) })
	}
}

/// Hooks that do nothing; the cache stays process-local.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotification;
impl CacheNotification for NoopNotification {}

/// Context handed to every hook.
#[derive(Clone, Debug)]
pub struct NotificationArgs {
	/// Client owning the cache.
	pub client_id: ClientId,
	/// Account the operation concerns, when known.
	pub account: Option<Account>,
	/// True for operations that mutate the records.
	pub has_state_changed: bool,
	/// True for the application-token instance.
	pub is_application_cache: bool,
	/// True when a refresh token or an unexpired access token remains.
	pub has_tokens: bool,
	/// The caller's cancellation signal.
	pub cancellation: CancellationToken,
	/// Partition key for external stores.
	pub suggested_cache_key: Option<String>,
	/// Instant after which an external store may evict the blob; write path only.
	pub suggested_cache_expiry: Option<OffsetDateTime>,
	/// Import/export capability over the cache records.
	pub cache: CacheSerializer,
}
