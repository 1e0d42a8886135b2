//! Network instance discovery: the wire contract and the reqwest-backed client.

// self
use crate::{
	_prelude::*,
	authority::Authority,
	discovery::{AliasCatalog, InstanceMetadataEntry},
	error::DiscoveryError,
};

/// Host queried for authorities the bundled catalog does not know.
pub const DEFAULT_DISCOVERY_HOST: &str = "login.microsoftonline.com";

/// Future returned by [`InstanceDiscoveryClient::discover`].
pub type DiscoveryFuture<'a> =
	Pin<Box<dyn Future<Output = Result<InstanceDiscoveryResponse, DiscoveryError>> + 'a + Send>>;

/// Instance discovery payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDiscoveryResponse {
	/// OpenID configuration endpoint of the requested tenant.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tenant_discovery_endpoint: Option<String>,
	/// Alias sets known to the service.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Vec<InstanceMetadataEntry>>,
}
impl InstanceDiscoveryResponse {
	/// Parses a discovery payload, reporting the JSON path of any mismatch.
	pub fn from_slice(bytes: &[u8]) -> Result<Self, DiscoveryError> {
		let de = &mut serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(de).map_err(|source| DiscoveryError::Parse { source })
	}

	/// Entry whose aliases include `host`.
	pub fn entry_for(&self, host: &str) -> Option<&InstanceMetadataEntry> {
		self.metadata.as_deref().unwrap_or_default().iter().find(|entry| entry.contains_alias(host))
	}
}

/// Transport that can run a discovery call.
pub trait InstanceDiscoveryClient
where
	Self: Send + Sync,
{
	/// Fetches the alias sets related to `authority`.
	fn discover<'a>(&'a self, authority: &'a Authority) -> DiscoveryFuture<'a>;
}

/// Builds the discovery request URL.
///
/// `base` overrides the discovery host (tests, sovereign proxies); otherwise the authority host is
/// queried when it is a known cloud and [`DEFAULT_DISCOVERY_HOST`] when it is not.
pub fn discovery_url(base: Option<&Url>, authority: &Authority) -> Result<Url, DiscoveryError> {
	let base = match base {
		Some(base) => base.clone(),
		None => {
			let host = if AliasCatalog::bundled().contains(authority.host()) {
				authority.host()
			} else {
				DEFAULT_DISCOVERY_HOST
			};

			Url::parse(&format!("https://{host}/"))
				.map_err(|source| DiscoveryError::InvalidEndpoint { source })?
		},
	};
	let mut url = base
		.join("common/discovery/instance")
		.map_err(|source| DiscoveryError::InvalidEndpoint { source })?;

	url.query_pairs_mut()
		.append_pair("api-version", "1.1")
		.append_pair("authorization_endpoint", &authority.authorize_endpoint());

	Ok(url)
}

/// [`InstanceDiscoveryClient`] backed by `reqwest`.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestDiscoveryClient {
	client: ReqwestClient,
	endpoint: Option<Url>,
}
#[cfg(feature = "reqwest")]
impl ReqwestDiscoveryClient {
	/// Reuses a caller-configured client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, endpoint: None }
	}

	/// Sends discovery calls to `endpoint` instead of the cloud host.
	pub fn with_endpoint(mut self, endpoint: Url) -> Self {
		self.endpoint = Some(endpoint);

		self
	}
}
#[cfg(feature = "reqwest")]
impl InstanceDiscoveryClient for ReqwestDiscoveryClient {
	fn discover<'a>(&'a self, authority: &'a Authority) -> DiscoveryFuture<'a> {
		Box::pin(async move {
			let url = discovery_url(self.endpoint.as_ref(), authority)?;
			let response = self.client.get(url).send().await?;
			let status = response.status();

			if !status.is_success() {
				let body = response.text().await.ok();

				return Err(DiscoveryError::Status { status: status.as_u16(), body });
			}

			let bytes = response.bytes().await?;
			let parsed = InstanceDiscoveryResponse::from_slice(&bytes)?;

			tracing::debug!(
				host = authority.host(),
				status = %status,
				entries = parsed.metadata.as_ref().map_or(0, Vec::len),
				"instance discovery complete"
			);

			Ok(parsed)
		})
	}
}
