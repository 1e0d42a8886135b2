//! Token cache engine.
//!
//! [`TokenCache`] owns the record accessor and serializes every operation behind one async lock.
//! Each operation is bracketed by the caller's [`CacheNotification`] hooks:
//! before-access, before-write (mutations only), the operation itself, then after-access, which
//! fires even when an earlier step failed so external storage never misses an unlock.
//!
//! Hooks run inside a task-local marker; a hook that calls back into the same cache gets
//! [`Error::ReentrantAccess`] instead of deadlocking on the lock it is already inside.

pub mod legacy;
pub mod matcher;
pub mod notify;
pub mod request;
pub mod response;

mod account;
mod lookup;
mod write;

pub use account::*;
pub use legacy::{LegacyCachePersistence, LegacyUser, MemoryLegacyPersistence};
pub use notify::*;
pub use request::*;
pub use response::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, RefreshTokenRecord},
	authority::AuthorityKind,
	codec::CacheSerializer,
	discovery::InstanceDiscoveryManager,
	obs::{self, CacheMetrics, CacheOperation, CacheOutcome, CacheSpan},
	store::{CacheAccessor, MemoryAccessor},
};

/// Future returned by [`CacheEngine`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
	static NOTIFYING_CACHE: u64;
}

/// Engine operations consumed by the request-orchestration layer.
///
/// [`TokenCache`] implements this by delegating to its inherent methods; the trait exists so the
/// orchestration layer can hold `Arc<dyn CacheEngine>` and tests can substitute fakes.
pub trait CacheEngine
where
	Self: Send + Sync,
{
	/// See [`TokenCache::find_access_token`].
	fn find_access_token<'a>(
		&'a self,
		request: &'a CacheRequest,
	) -> CacheFuture<'a, Option<CachedAccessToken>>;

	/// See [`TokenCache::find_refresh_token`].
	fn find_refresh_token<'a>(
		&'a self,
		request: &'a CacheRequest,
		family_id: Option<&'a str>,
	) -> CacheFuture<'a, Option<RefreshTokenRecord>>;

	/// See [`TokenCache::save_token_response`].
	fn save_token_response<'a>(
		&'a self,
		request: &'a CacheRequest,
		response: &'a TokenResponse,
	) -> CacheFuture<'a, SavedTokens>;

	/// See [`TokenCache::remove_account`].
	fn remove_account<'a>(
		&'a self,
		account: &'a Account,
		cancellation: &'a CancellationToken,
	) -> CacheFuture<'a, ()>;

	/// See [`TokenCache::get_accounts`].
	fn get_accounts<'a>(&'a self, request: &'a CacheRequest) -> CacheFuture<'a, Vec<Account>>;

	/// See [`TokenCache::is_foci_member`].
	fn is_foci_member<'a>(
		&'a self,
		request: &'a CacheRequest,
		family_id: &'a str,
	) -> CacheFuture<'a, FociMembership>;

	/// See [`TokenCache::clear`].
	fn clear<'a>(&'a self, cancellation: &'a CancellationToken) -> CacheFuture<'a, ()>;
}

/// Feature switches of one cache instance.
#[derive(Clone, Debug)]
pub struct CacheOptions {
	/// Share refresh tokens across a family of client ids.
	pub foci_enabled: bool,
	/// Serve tokens past their expiry while their extended expiry holds.
	pub extended_lifetime_enabled: bool,
	/// Mirror refresh tokens into the legacy store and fall back to it on lookup.
	pub legacy_cache_compatibility: bool,
	/// Marks the application-token instance.
	pub application_cache: bool,
}
impl CacheOptions {
	/// Toggles family refresh token sharing.
	pub fn with_foci(mut self, enabled: bool) -> Self {
		self.foci_enabled = enabled;

		self
	}

	/// Toggles extended-lifetime serving.
	pub fn with_extended_lifetime(mut self, enabled: bool) -> Self {
		self.extended_lifetime_enabled = enabled;

		self
	}

	/// Toggles the legacy store.
	pub fn with_legacy_cache_compatibility(mut self, enabled: bool) -> Self {
		self.legacy_cache_compatibility = enabled;

		self
	}

	/// Marks the instance as the application-token cache.
	pub fn with_application_cache(mut self, enabled: bool) -> Self {
		self.application_cache = enabled;

		self
	}
}
impl Default for CacheOptions {
	fn default() -> Self {
		Self {
			foci_enabled: true,
			extended_lifetime_enabled: false,
			legacy_cache_compatibility: true,
			application_cache: false,
		}
	}
}

/// Token cache for one client.
///
/// A typical application holds two instances, one for user tokens and one for application
/// tokens; they share the discovery manager and metrics but not the lock.
pub struct TokenCache {
	id: u64,
	client_id: ClientId,
	options: CacheOptions,
	accessor: Arc<dyn CacheAccessor>,
	legacy: Arc<dyn LegacyCachePersistence>,
	notification: Arc<dyn CacheNotification>,
	discovery: Arc<InstanceDiscoveryManager>,
	metrics: Arc<CacheMetrics>,
	serializer: CacheSerializer,
	lock: AsyncMutex<()>,
}
impl TokenCache {
	/// Starts a builder with in-memory defaults.
	pub fn builder(client_id: ClientId) -> TokenCacheBuilder {
		TokenCacheBuilder::new(client_id)
	}

	/// Client owning the cache.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	/// Active options.
	pub fn options(&self) -> &CacheOptions {
		&self.options
	}

	/// Import/export capability over this cache's records.
	pub fn serializer(&self) -> &CacheSerializer {
		&self.serializer
	}

	/// Shared metrics sink.
	pub fn metrics(&self) -> &Arc<CacheMetrics> {
		&self.metrics
	}

	/// Shared discovery manager.
	pub fn discovery(&self) -> &Arc<InstanceDiscoveryManager> {
		&self.discovery
	}

	/// True when a refresh token or an access token valid beyond the expiry buffer exists.
	///
	/// Reads without the lock.
	pub fn has_tokens(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		!self.accessor.refresh_tokens().is_empty()
			|| self.accessor.access_tokens().iter().any(|record| matcher::is_unexpired(record, now))
	}

	fn is_legacy_enabled(&self, request: &CacheRequest) -> bool {
		self.options.legacy_cache_compatibility
			&& !self.options.application_cache
			&& matches!(request.kind, RequestKind::User)
			&& request
				.authority
				.as_ref()
				.is_none_or(|authority| authority.kind() != AuthorityKind::B2c)
	}

	fn ensure_not_reentrant(&self) -> Result<()> {
		match NOTIFYING_CACHE.try_with(|id| *id == self.id) {
			Ok(true) => Err(Error::ReentrantAccess),
			_ => Ok(()),
		}
	}

	fn notification_args(&self, access: &Access) -> NotificationArgs {
		NotificationArgs {
			client_id: self.client_id.clone(),
			account: access.account.clone(),
			has_state_changed: access.write,
			is_application_cache: self.options.application_cache,
			has_tokens: self.has_tokens(),
			cancellation: access.cancellation.clone(),
			suggested_cache_key: access.suggested_cache_key.clone(),
			suggested_cache_expiry: None,
			cache: self.serializer.clone(),
		}
	}

	async fn notify(&self, hook: Hook, args: &NotificationArgs, cancellable: bool) -> Result<()> {
		let notification = self.notification.as_ref();
		let pending = match hook {
			Hook::BeforeAccess => notification.on_before_access(args),
			Hook::BeforeWrite => notification.on_before_write(args),
			Hook::AfterAccess => notification.on_after_access(args),
		};
		let scoped = NOTIFYING_CACHE.scope(self.id, pending);
		let result = if cancellable {
			tokio::select! {
				biased;
				_ = args.cancellation.cancelled() => Err(Error::Cancelled),
				result = scoped => result,
			}
		} else {
			scoped.await
		};

		if let Err(e) = &result {
			self.metrics.record_notification_failure();

			tracing::warn!(hook = hook.as_str(), error = %e, "cache notification failed");
		}

		result
	}

	/// Runs `body` under the lock between the notification hooks.
	async fn bracket<T, F, Fut>(&self, access: Access, body: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.ensure_not_reentrant()?;

		let _guard = tokio::select! {
			biased;
			_ = access.cancellation.cancelled() => return Err(Error::Cancelled),
			guard = self.lock.lock() => guard,
		};
		let args = self.notification_args(&access);
		let mut result = self.notify(Hook::BeforeAccess, &args, true).await;

		if result.is_ok() && access.write {
			result = self.notify(Hook::BeforeWrite, &args, true).await;
		}

		let result = match result {
			Ok(()) => body().await,
			Err(e) => Err(e),
		};
		let mut after_args = args;

		after_args.has_tokens = self.has_tokens();

		if access.write && result.is_ok() {
			after_args.suggested_cache_expiry = self.suggested_cache_expiry();
		}

		let after = self.notify(Hook::AfterAccess, &after_args, false).await;

		match (result, after) {
			(Err(e), _) => Err(e),
			(Ok(_), Err(e)) => Err(e),
			(Ok(value), Ok(())) => Ok(value),
		}
	}

	/// Latest access token expiry, offered only when no refresh token could outlive it.
	fn suggested_cache_expiry(&self) -> Option<OffsetDateTime> {
		if !self.accessor.refresh_tokens().is_empty() {
			return None;
		}

		let now = OffsetDateTime::now_utc();

		self.accessor
			.access_tokens()
			.into_iter()
			.map(|record| record.expires_on)
			.max()
			.filter(|expiry| *expiry > now + matcher::EXPIRY_BUFFER)
	}

	/// Wraps an operation in its span and outcome counters.
	async fn observe<T, Fut>(
		&self,
		operation: CacheOperation,
		fut: Fut,
		outcome: impl FnOnce(&T) -> CacheOutcome,
	) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let span = CacheSpan::new(operation, operation.as_str());

		obs::record_operation_outcome(operation, CacheOutcome::Attempt);

		let result = span.instrument(fut).await;

		match &result {
			Ok(value) => obs::record_operation_outcome(operation, outcome(value)),
			Err(_) => obs::record_operation_outcome(operation, CacheOutcome::Failure),
		}

		result
	}
}
impl CacheEngine for TokenCache {
	fn find_access_token<'a>(
		&'a self,
		request: &'a CacheRequest,
	) -> CacheFuture<'a, Option<CachedAccessToken>> {
		Box::pin(TokenCache::find_access_token(self, request))
	}

	fn find_refresh_token<'a>(
		&'a self,
		request: &'a CacheRequest,
		family_id: Option<&'a str>,
	) -> CacheFuture<'a, Option<RefreshTokenRecord>> {
		Box::pin(TokenCache::find_refresh_token(self, request, family_id))
	}

	fn save_token_response<'a>(
		&'a self,
		request: &'a CacheRequest,
		response: &'a TokenResponse,
	) -> CacheFuture<'a, SavedTokens> {
		Box::pin(TokenCache::save_token_response(self, request, response))
	}

	fn remove_account<'a>(
		&'a self,
		account: &'a Account,
		cancellation: &'a CancellationToken,
	) -> CacheFuture<'a, ()> {
		Box::pin(TokenCache::remove_account(self, account, cancellation))
	}

	fn get_accounts<'a>(&'a self, request: &'a CacheRequest) -> CacheFuture<'a, Vec<Account>> {
		Box::pin(TokenCache::get_accounts(self, request))
	}

	fn is_foci_member<'a>(
		&'a self,
		request: &'a CacheRequest,
		family_id: &'a str,
	) -> CacheFuture<'a, FociMembership> {
		Box::pin(TokenCache::is_foci_member(self, request, family_id))
	}

	fn clear<'a>(&'a self, cancellation: &'a CancellationToken) -> CacheFuture<'a, ()> {
		Box::pin(TokenCache::clear(self, cancellation))
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("client_id", &self.client_id)
			.field("options", &self.options)
			.field("discovery", &self.discovery)
			.finish_non_exhaustive()
	}
}

/// Builder for [`TokenCache`]; every collaborator defaults to an in-memory or no-op one.
pub struct TokenCacheBuilder {
	client_id: ClientId,
	options: CacheOptions,
	accessor: Option<Arc<dyn CacheAccessor>>,
	legacy: Option<Arc<dyn LegacyCachePersistence>>,
	notification: Option<Arc<dyn CacheNotification>>,
	discovery: Option<Arc<InstanceDiscoveryManager>>,
	metrics: Option<Arc<CacheMetrics>>,
}
impl TokenCacheBuilder {
	fn new(client_id: ClientId) -> Self {
		Self {
			client_id,
			options: CacheOptions::default(),
			accessor: None,
			legacy: None,
			notification: None,
			discovery: None,
			metrics: None,
		}
	}

	/// Replaces the options.
	pub fn with_options(mut self, options: CacheOptions) -> Self {
		self.options = options;

		self
	}

	/// Uses a custom record accessor.
	pub fn with_accessor(mut self, accessor: Arc<dyn CacheAccessor>) -> Self {
		self.accessor = Some(accessor);

		self
	}

	/// Uses a custom legacy persistence.
	pub fn with_legacy_persistence(mut self, legacy: Arc<dyn LegacyCachePersistence>) -> Self {
		self.legacy = Some(legacy);

		self
	}

	/// Installs persistence hooks.
	pub fn with_notification(mut self, notification: Arc<dyn CacheNotification>) -> Self {
		self.notification = Some(notification);

		self
	}

	/// Shares a discovery manager.
	pub fn with_discovery(mut self, discovery: Arc<InstanceDiscoveryManager>) -> Self {
		self.discovery = Some(discovery);

		self
	}

	/// Shares a metrics sink.
	pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
		self.metrics = Some(metrics);

		self
	}

	/// Builds the cache.
	pub fn build(self) -> TokenCache {
		let accessor = self.accessor.unwrap_or_else(|| Arc::new(MemoryAccessor::default()));
		let legacy = self.legacy.unwrap_or_else(|| Arc::new(MemoryLegacyPersistence::default()));
		let serializer = CacheSerializer::new(accessor.clone(), legacy.clone());

		TokenCache {
			id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
			client_id: self.client_id,
			options: self.options,
			accessor,
			legacy,
			notification: self.notification.unwrap_or_else(|| Arc::new(NoopNotification)),
			discovery: self.discovery.unwrap_or_default(),
			metrics: self.metrics.unwrap_or_default(),
			serializer,
			lock: AsyncMutex::new(()),
		}
	}
}
impl Debug for TokenCacheBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCacheBuilder")
			.field("client_id", &self.client_id)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Copy, Debug)]
enum Hook {
	BeforeAccess,
	BeforeWrite,
	AfterAccess,
}
impl Hook {
	const fn as_str(self) -> &'static str {
		match self {
			Hook::BeforeAccess => "before_access",
			Hook::BeforeWrite => "before_write",
			Hook::AfterAccess => "after_access",
		}
	}
}

/// What one bracketed operation tells the hooks.
#[derive(Debug)]
struct Access {
	write: bool,
	account: Option<Account>,
	suggested_cache_key: Option<String>,
	cancellation: CancellationToken,
}
impl Access {
	fn read(cancellation: &CancellationToken) -> Self {
		Self { write: false, account: None, suggested_cache_key: None, cancellation: cancellation.clone() }
	}

	fn write(cancellation: &CancellationToken) -> Self {
		Self { write: true, ..Self::read(cancellation) }
	}

	fn with_account(mut self, account: Option<Account>) -> Self {
		self.account = account;

		self
	}

	fn with_suggested_key(mut self, key: Option<String>) -> Self {
		self.suggested_cache_key = key;

		self
	}
}
