mod common;

// std
use std::{env, fs, process, sync::Arc};
// crates.io
use identity_cache::{
	CancellationToken,
	cache::{CacheOptions, TokenCache},
	codec::SerializableCache,
	error::{CacheError, Error},
	store::{CacheAccessor, FileCacheStore},
};
use serde_json::Value;
use time::OffsetDateTime;
// self
use common::*;

#[tokio::test]
async fn exported_json_restores_a_working_cache() {
	let (source, _) = cache_with(CacheOptions::default());
	let account = source
		.save_token_response(&user_request(&["user.read"]), &user_response("at-1", &["user.read"]))
		.await
		.expect("Token response should be cached.")
		.account
		.expect("User response should yield an account.");
	let blob = source.serializer().serialize_json().expect("Export should succeed.");
	let document: Value = serde_json::from_slice(&blob).expect("Export should be JSON.");

	for node in ["AccessToken", "RefreshToken", "IdToken", "Account", "AppMetadata"] {
		assert!(document.get(node).is_some(), "Node {node} should be present.");
	}

	let (target, accessor) = cache_with(CacheOptions::default());

	target.serializer().deserialize_json(&blob, true).expect("Import should succeed.");

	assert_eq!(accessor.refresh_tokens().len(), 1);

	let found = target
		.find_access_token(&user_request(&["user.read"]).with_account(account))
		.await
		.expect("Lookup should succeed.");

	assert!(found.is_some(), "Imported token should be served.");
}

#[tokio::test]
async fn unknown_nodes_survive_import_and_export() {
	let (cache, _) = cache_with(CacheOptions::default());

	cache
		.serializer()
		.deserialize_json(br#"{"AccessToken":{},"FutureNode":{"k":1}}"#, true)
		.expect("Import should succeed.");

	let exported: Value =
		serde_json::from_slice(&cache.serializer().serialize_json().expect("Export should succeed."))
			.expect("Export should be JSON.");

	assert_eq!(exported["FutureNode"]["k"], 1);

	cache.clear(&CancellationToken::new()).await.expect("Clear should succeed.");

	assert!(cache.serializer().unknown_nodes().is_empty(), "Clear drops retained nodes.");
}

#[tokio::test]
async fn dictionary_blobs_are_rejected_by_the_json_importer() {
	let (source, _) = cache_with(CacheOptions::default());

	source
		.save_token_response(&user_request(&["user.read"]), &user_response("at-1", &["user.read"]))
		.await
		.expect("Token response should be cached.");

	let dictionary = source.serializer().serialize_dictionary().expect("Export should succeed.");
	let (target, accessor) = cache_with(CacheOptions::default());
	let err = target
		.serializer()
		.deserialize_json(&dictionary, true)
		.expect_err("Dictionary layout is not the JSON layout.");

	assert!(matches!(err, Error::Cache(CacheError::WrongFormat { .. })), "Unexpected error: {err:?}.");

	target.serializer().deserialize_dictionary(&dictionary, true).expect("Dictionary import should succeed.");

	assert_eq!(accessor.access_tokens().len(), 1);
	assert_eq!(accessor.refresh_tokens().len(), 1);
}

#[tokio::test]
async fn merging_keeps_existing_records() {
	let (source, _) = cache_with(CacheOptions::default());

	source
		.save_token_response(&user_request(&["a.read"]), &user_response("at-a", &["a.read"]))
		.await
		.expect("Token response should be cached.");

	let blob = source.serializer().serialize_json().expect("Export should succeed.");
	let (target, accessor) = cache_with(CacheOptions::default());

	target
		.save_token_response(&user_request(&["b.read"]), &user_response("at-b", &["b.read"]))
		.await
		.expect("Token response should be cached.");
	target.serializer().deserialize_json(&blob, false).expect("Merge should succeed.");

	assert_eq!(accessor.access_tokens().len(), 2);

	target.serializer().deserialize_json(&blob, true).expect("Replace should succeed.");

	assert_eq!(accessor.access_tokens().len(), 1);
}

#[tokio::test]
async fn legacy_blobs_move_between_caches() {
	let (source, _) = cache_with(CacheOptions::default());

	source
		.save_token_response(&user_request(&["user.read"]), &user_response("at-1", &["user.read"]))
		.await
		.expect("Token response should be cached.");

	let blob = source.serializer().serialize_legacy().expect("Legacy export should succeed.");
	let (target, _) = cache_with(CacheOptions::default());

	target.serializer().deserialize_legacy(&blob, true).expect("Legacy import should succeed.");

	let accounts =
		target.get_accounts(&user_request(&["user.read"])).await.expect("Listing should succeed.");

	assert_eq!(accounts.len(), 1, "The legacy user is visible after import.");
	assert_eq!(accounts[0].username, USERNAME);
}

#[tokio::test]
async fn legacy_entries_carry_the_resolved_tenant() {
	let (cache, _) = cache_with(CacheOptions::default());

	cache
		.save_token_response(&user_request(&["user.read"]), &user_response("at-1", &["user.read"]))
		.await
		.expect("Token response should be cached.");

	let blob = cache.serializer().serialize_legacy().expect("Legacy export should succeed.");
	let entries: Value = serde_json::from_slice(&blob).expect("Legacy export should be JSON.");
	let authorities = entries
		.as_array()
		.expect("Legacy export should be an array.")
		.iter()
		.map(|entry| entry["key"]["authority"].as_str().unwrap_or_default().to_owned())
		.collect::<Vec<_>>();

	assert_eq!(authorities, [format!("https://login.windows.net/{UTID}/")]);
}

#[tokio::test]
async fn file_store_shares_state_between_instances() {
	let path = env::temp_dir().join("identity-cache-tests").join(format!(
		"shared_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos()
	));
	let build = || {
		TokenCache::builder(client_id(CLIENT_ID))
			.with_options(CacheOptions::default().with_legacy_cache_compatibility(false))
			.with_notification(Arc::new(FileCacheStore::new(&path)))
			.build()
	};
	let writer = build();
	let account = writer
		.save_token_response(&user_request(&["user.read"]), &user_response("at-1", &["user.read"]))
		.await
		.expect("Token response should be cached.")
		.account
		.expect("User response should yield an account.");
	let reader = build();
	let found = reader
		.find_access_token(&user_request(&["user.read"]).with_account(account))
		.await
		.expect("Lookup should succeed.")
		.expect("Token written by another instance should be served.");

	assert_eq!(found.record.secret.expose(), "at-1");

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary cache file {}: {e}", path.display())
	});
}
