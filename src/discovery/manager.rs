//! Alias resolution with a bundled-catalog shortcut and a per-process metadata cache.

// self
use crate::{
	_prelude::*,
	authority::{Authority, AuthorityKind},
	discovery::{AliasCatalog, InstanceDiscoveryClient, InstanceDiscoveryResponse, InstanceMetadataEntry},
	error::DiscoveryError,
	obs::{self, CacheOperation, CacheOutcome, CacheSpan},
};

/// Instance discovery switches.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
	/// When `false`, every authority host is its own only alias and nothing is fetched.
	pub instance_discovery_enabled: bool,
	/// Payload in the network response shape used instead of the network.
	pub custom_metadata: Option<InstanceDiscoveryResponse>,
}
impl DiscoveryOptions {
	/// Toggles instance discovery.
	pub fn with_instance_discovery(mut self, enabled: bool) -> Self {
		self.instance_discovery_enabled = enabled;

		self
	}

	/// Supplies alias metadata up front.
	pub fn with_custom_metadata(mut self, metadata: InstanceDiscoveryResponse) -> Self {
		self.custom_metadata = Some(metadata);

		self
	}
}
impl Default for DiscoveryOptions {
	fn default() -> Self {
		Self { instance_discovery_enabled: true, custom_metadata: None }
	}
}

/// Resolves the alias set of an authority.
///
/// Network results are cached per alias for the lifetime of the manager and never invalidated.
/// Share one manager (behind `Arc`) between the user and application token caches so both see
/// the same metadata.
pub struct InstanceDiscoveryManager {
	options: DiscoveryOptions,
	client: Option<Arc<dyn InstanceDiscoveryClient>>,
	entries: RwLock<HashMap<String, InstanceMetadataEntry>>,
}
impl InstanceDiscoveryManager {
	/// Creates a manager without a network client; unknown hosts resolve to themselves.
	pub fn new(options: DiscoveryOptions) -> Self {
		Self { options, client: None, entries: RwLock::new(HashMap::new()) }
	}

	/// Attaches a network discovery client.
	pub fn with_client(mut self, client: Arc<dyn InstanceDiscoveryClient>) -> Self {
		self.client = Some(client);

		self
	}

	/// Attaches the default reqwest-backed client.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(self) -> Self {
		self.with_client(Arc::new(crate::discovery::ReqwestDiscoveryClient::default()))
	}

	/// Metadata cached for `host`, if any.
	pub fn cached(&self, host: &str) -> Option<InstanceMetadataEntry> {
		self.entries.read().get(&host.to_ascii_lowercase()).cloned()
	}

	/// Resolves aliases, avoiding the network when the catalog already covers the authority and
	/// every environment in `known_environments`.
	pub async fn get_metadata<I, S>(
		&self,
		authority: &Authority,
		known_environments: I,
		cancellation: &CancellationToken,
	) -> Result<InstanceMetadataEntry>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		if let Some(entry) = self.resolve_locally(authority) {
			return Ok(entry);
		}

		let catalog = AliasCatalog::bundled();

		if let Some(entry) = catalog.lookup(authority.host()) {
			let mut unknown = known_environments
				.into_iter()
				.filter(|environment| !catalog.contains(environment.as_ref()));

			match unknown.next() {
				None => {
					tracing::debug!(host = authority.host(), "aliases resolved from the bundled catalog");

					return Ok(entry.clone());
				},
				Some(environment) => tracing::debug!(
					host = authority.host(),
					environment = environment.as_ref(),
					"cached environment is not in the bundled catalog"
				),
			}
		}

		self.resolve_remotely(authority, cancellation).await
	}

	/// Resolves aliases definitively, skipping the catalog shortcut.
	///
	/// Used on the write path so the preferred cache host comes from the service whenever a
	/// client is attached.
	pub async fn get_metadata_full(
		&self,
		authority: &Authority,
		cancellation: &CancellationToken,
	) -> Result<InstanceMetadataEntry> {
		if let Some(entry) = self.resolve_locally(authority) {
			return Ok(entry);
		}

		self.resolve_remotely(authority, cancellation).await
	}

	fn resolve_locally(&self, authority: &Authority) -> Option<InstanceMetadataEntry> {
		if authority.kind() != AuthorityKind::Aad || !self.options.instance_discovery_enabled {
			return Some(InstanceMetadataEntry::self_entry(authority.host()));
		}
		if let Some(custom) = &self.options.custom_metadata {
			return Some(
				custom
					.entry_for(authority.host())
					.cloned()
					.unwrap_or_else(|| InstanceMetadataEntry::self_entry(authority.host())),
			);
		}

		self.cached(authority.host())
	}

	async fn resolve_remotely(
		&self,
		authority: &Authority,
		cancellation: &CancellationToken,
	) -> Result<InstanceMetadataEntry> {
		let host = authority.host();
		let Some(client) = &self.client else {
			return Ok(AliasCatalog::bundled().lookup(host).cloned().unwrap_or_else(|| {
				tracing::warn!(host, "unknown authority host; treating it as its own only alias");

				InstanceMetadataEntry::self_entry(host)
			}));
		};
		let span = CacheSpan::new(CacheOperation::InstanceDiscovery, "resolve_remotely");

		obs::record_operation_outcome(CacheOperation::InstanceDiscovery, CacheOutcome::Attempt);

		let result = span
			.instrument(async {
				let response = tokio::select! {
					biased;
					_ = cancellation.cancelled() => return Err(Error::Cancelled),
					response = client.discover(authority) => response?,
				};
				let metadata = response
					.metadata
					.ok_or_else(|| DiscoveryError::MissingMetadata { host: host.to_owned() })?;

				Ok(self.remember(host, metadata))
			})
			.await;
		let outcome = if result.is_ok() { CacheOutcome::Success } else { CacheOutcome::Failure };

		obs::record_operation_outcome(CacheOperation::InstanceDiscovery, outcome);

		result
	}

	fn remember(&self, host: &str, metadata: Vec<InstanceMetadataEntry>) -> InstanceMetadataEntry {
		let mut entries = self.entries.write();

		for entry in metadata {
			for alias in &entry.aliases {
				entries.insert(alias.to_ascii_lowercase(), entry.clone());
			}
		}

		entries
			.entry(host.to_ascii_lowercase())
			.or_insert_with_key(|host| InstanceMetadataEntry::self_entry(host))
			.clone()
	}
}
impl Debug for InstanceDiscoveryManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InstanceDiscoveryManager")
			.field("options", &self.options)
			.field("has_client", &self.client.is_some())
			.field("cached_hosts", &self.entries.read().len())
			.finish()
	}
}
impl Default for InstanceDiscoveryManager {
	fn default() -> Self {
		Self::new(DiscoveryOptions::default())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::discovery::DiscoveryFuture;

	#[derive(Default)]
	struct CountingClient {
		calls: AtomicUsize,
	}
	impl InstanceDiscoveryClient for CountingClient {
		fn discover<'a>(&'a self, _authority: &'a Authority) -> DiscoveryFuture<'a> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async {
				Ok(InstanceDiscoveryResponse {
					tenant_discovery_endpoint: None,
					metadata: Some(vec![InstanceMetadataEntry {
						preferred_network: "login.microsoftonline.com".into(),
						preferred_cache: "login.windows.net".into(),
						aliases: vec!["login.microsoftonline.com".into(), "login.windows.net".into()],
					}]),
				})
			})
		}
	}

	fn authority(raw: &str) -> Authority {
		Authority::parse(raw).expect("Authority fixture should parse.")
	}

	fn manager_with(client: Arc<CountingClient>) -> InstanceDiscoveryManager {
		InstanceDiscoveryManager::new(DiscoveryOptions::default()).with_client(client)
	}

	#[tokio::test]
	async fn catalog_shortcut_avoids_network() {
		let client = Arc::new(CountingClient::default());
		let manager = manager_with(client.clone());
		let entry = manager
			.get_metadata(
				&authority("https://login.microsoftonline.com/common/"),
				["login.windows.net", "sts.windows.net"],
				&CancellationToken::new(),
			)
			.await
			.expect("Catalog resolution should succeed.");

		assert_eq!(entry.preferred_cache, "login.windows.net");
		assert_eq!(client.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn unknown_environment_forces_network_once() {
		let client = Arc::new(CountingClient::default());
		let manager = manager_with(client.clone());
		let authority = authority("https://login.microsoftonline.com/common/");
		let cancel = CancellationToken::new();

		for _ in 0..2 {
			manager
				.get_metadata(&authority, ["login.contoso.net"], &cancel)
				.await
				.expect("Network resolution should succeed.");
		}

		assert_eq!(client.calls.load(Ordering::SeqCst), 1, "Second call must hit the cache.");
		assert!(manager.cached("LOGIN.WINDOWS.NET").is_some(), "Every alias is cached.");
	}

	#[tokio::test]
	async fn full_resolution_ignores_catalog_and_self_entries_unknown_hosts() {
		let client = Arc::new(CountingClient::default());
		let manager = manager_with(client.clone());
		let cancel = CancellationToken::new();
		let entry = manager
			.get_metadata_full(&authority("https://login.contoso.net/tenant/"), &cancel)
			.await
			.expect("Full resolution should succeed.");

		assert_eq!(client.calls.load(Ordering::SeqCst), 1);
		assert_eq!(entry, InstanceMetadataEntry::self_entry("login.contoso.net"));
	}

	#[tokio::test]
	async fn federation_and_disabled_discovery_resolve_locally() {
		let client = Arc::new(CountingClient::default());
		let cancel = CancellationToken::new();
		let manager = manager_with(client.clone());
		let adfs = manager
			.get_metadata_full(&authority("https://fs.contoso.com/adfs/"), &cancel)
			.await
			.expect("ADFS resolves without discovery.");

		assert_eq!(adfs.aliases, vec!["fs.contoso.com".to_string()]);

		let disabled = InstanceDiscoveryManager::new(
			DiscoveryOptions::default().with_instance_discovery(false),
		)
		.with_client(client.clone());
		let entry = disabled
			.get_metadata_full(&authority("https://login.microsoftonline.com/common/"), &cancel)
			.await
			.expect("Disabled discovery resolves locally.");

		assert_eq!(entry.aliases, vec!["login.microsoftonline.com".to_string()]);
		assert_eq!(client.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn cancellation_aborts_network_calls() {
		let manager = manager_with(Arc::new(CountingClient::default()));
		let cancel = CancellationToken::new();

		cancel.cancel();

		let err = manager
			.get_metadata_full(&authority("https://login.contoso.net/tenant/"), &cancel)
			.await
			.expect_err("Cancelled discovery must fail.");

		assert!(matches!(err, Error::Cancelled));
	}

	#[tokio::test]
	async fn offline_manager_uses_catalog_then_self_entry() {
		let manager = InstanceDiscoveryManager::default();
		let cancel = CancellationToken::new();
		let public = manager
			.get_metadata_full(&authority("https://login.microsoft.com/common/"), &cancel)
			.await
			.expect("Catalog fallback should succeed.");

		assert_eq!(public.preferred_cache, "login.windows.net");

		let unknown = manager
			.get_metadata(&authority("https://login.contoso.net/t/"), ["x"], &cancel)
			.await
			.expect("Self entry fallback should succeed.");

		assert_eq!(unknown.preferred_cache, "login.contoso.net");
	}
}
