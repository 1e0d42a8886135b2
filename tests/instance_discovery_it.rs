#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use identity_cache::{
	cache::{Account, CacheRequest, TokenCache},
	discovery::{DiscoveryOptions, InstanceDiscoveryManager, ReqwestDiscoveryClient},
	error::{DiscoveryError, Error},
	url::Url,
};
// self
use common::*;

const CONTOSO: &str = "https://login.contoso.net/tenant-1/";

fn manager(server: &MockServer) -> Arc<InstanceDiscoveryManager> {
	let endpoint = Url::parse(&server.url("/")).expect("Mock server URL should parse.");

	Arc::new(
		InstanceDiscoveryManager::new(DiscoveryOptions::default())
			.with_client(Arc::new(ReqwestDiscoveryClient::default().with_endpoint(endpoint))),
	)
}

fn cache(discovery: Arc<InstanceDiscoveryManager>) -> TokenCache {
	TokenCache::builder(client_id(CLIENT_ID)).with_discovery(discovery).build()
}

#[tokio::test]
async fn discovered_aliases_drive_writes_and_lookups() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/common/discovery/instance")
				.query_param("api-version", "1.1")
				.query_param("authorization_endpoint", "https://login.contoso.net/tenant-1/oauth2/v2.0/authorize");
			then.status(200).header("content-type", "application/json").body(
				r#"{"tenant_discovery_endpoint":"https://login.contoso.net/tenant-1/v2.0/.well-known/openid-configuration","api-version":"1.1","metadata":[{"preferred_network":"login.contoso.net","preferred_cache":"login.contoso.com","aliases":["login.contoso.net","login.contoso.com"]}]}"#,
			);
		})
		.await;
	let discovery = manager(&server);
	let cache = cache(discovery.clone());
	let saved = cache
		.save_token_response(
			&CacheRequest::new(authority(CONTOSO), scopes(&["user.read"])),
			&user_response("at-1", &["user.read"]),
		)
		.await
		.expect("Token response should be cached.");

	assert_eq!(
		saved.access_token.as_ref().map(|record| record.environment.as_str()),
		Some("login.contoso.com"),
		"Records are written under the discovered preferred cache host."
	);

	let request = CacheRequest::new(authority("https://login.contoso.com/tenant-1/"), scopes(&["user.read"]))
		.with_account(saved.account.expect("User response should yield an account."));
	let found = cache.find_access_token(&request).await.expect("Lookup should succeed.");

	assert!(found.is_some(), "The alias resolves from the discovery cache.");
	assert!(discovery.cached("LOGIN.CONTOSO.NET").is_some());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn known_clouds_skip_the_network_on_lookups() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/common/discovery/instance");
			then.status(500);
		})
		.await;
	let cache = cache(manager(&server));
	let account = Account::new(Some(home_account_id()), USERNAME, "login.microsoftonline.com");
	let found = cache
		.find_access_token(&user_request(&["user.read"]).with_account(account))
		.await
		.expect("Empty cache lookup never needs discovery.");

	assert!(found.is_none());

	let accounts = cache
		.get_accounts(&user_request(&["user.read"]))
		.await
		.expect("Bundled catalog covers the public cloud.");

	assert!(accounts.is_empty());

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn discovery_failures_fail_the_write() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/common/discovery/instance");
			then.status(500).body("unavailable");
		})
		.await;
	let cache = cache(manager(&server));
	let err = cache
		.save_token_response(
			&CacheRequest::new(authority(CONTOSO), scopes(&["user.read"])),
			&user_response("at-1", &["user.read"]),
		)
		.await
		.expect_err("Discovery failure must surface.");

	match err {
		Error::Discovery(DiscoveryError::Status { status, body }) => {
			assert_eq!(status, 500);
			assert_eq!(body.as_deref(), Some("unavailable"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(!cache.has_tokens());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn payloads_without_metadata_are_rejected() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/common/discovery/instance");
			then.status(200).header("content-type", "application/json").body(r#"{"api-version":"1.1"}"#);
		})
		.await;

	let err = cache(manager(&server))
		.save_token_response(
			&CacheRequest::new(authority(CONTOSO), scopes(&["user.read"])),
			&user_response("at-1", &["user.read"]),
		)
		.await
		.expect_err("Missing metadata must surface.");

	assert!(
		matches!(err, Error::Discovery(DiscoveryError::MissingMetadata { ref host }) if host == "login.contoso.net"),
		"Unexpected error: {err:?}."
	);
}
