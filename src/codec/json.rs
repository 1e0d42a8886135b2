//! Current JSON layout: five record nodes keyed by composite cache key.

// self
use crate::{
	_prelude::*,
	auth::{
		AccessTokenRecord, AccountRecord, AppMetadataRecord, CacheRecord, ExtraFields,
		IdTokenRecord, RefreshTokenRecord,
	},
	codec::{self, dictionary},
	error::CacheError,
	store::CacheAccessor,
};

const FORMAT: &str = "json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonDocument {
	#[serde(rename = "AccessToken", default)]
	access_tokens: BTreeMap<String, AccessTokenRecord>,
	#[serde(rename = "RefreshToken", default)]
	refresh_tokens: BTreeMap<String, RefreshTokenRecord>,
	#[serde(rename = "IdToken", default)]
	id_tokens: BTreeMap<String, IdTokenRecord>,
	#[serde(rename = "Account", default)]
	accounts: BTreeMap<String, AccountRecord>,
	#[serde(rename = "AppMetadata", default)]
	app_metadata: BTreeMap<String, AppMetadataRecord>,
	#[serde(flatten)]
	unknown: ExtraFields,
}
impl JsonDocument {
	fn has_records(&self) -> bool {
		!(self.access_tokens.is_empty()
			&& self.refresh_tokens.is_empty()
			&& self.id_tokens.is_empty()
			&& self.accounts.is_empty()
			&& self.app_metadata.is_empty())
	}
}

/// Encodes every partition plus the retained unknown nodes.
pub fn serialize(accessor: &dyn CacheAccessor, unknown: &ExtraFields) -> Result<Vec<u8>, CacheError> {
	fn keyed<T>(records: Vec<T>, key: impl Fn(&T) -> String) -> BTreeMap<String, T> {
		records.into_iter().map(|record| (key(&record), record)).collect()
	}

	let document = JsonDocument {
		access_tokens: keyed(accessor.access_tokens(), AccessTokenRecord::cache_key),
		refresh_tokens: keyed(accessor.refresh_tokens(), RefreshTokenRecord::cache_key),
		id_tokens: keyed(accessor.id_tokens(), IdTokenRecord::cache_key),
		accounts: keyed(accessor.accounts(), AccountRecord::cache_key),
		app_metadata: keyed(accessor.app_metadata(), AppMetadataRecord::cache_key),
		unknown: unknown.clone(),
	};

	codec::encode(FORMAT, &document)
}

/// Loads a blob into `accessor`.
///
/// A blank payload clears the records only when `clear_existing` is set. A payload made up only
/// of dictionary nodes is rejected as the wrong format.
pub fn deserialize(
	accessor: &dyn CacheAccessor,
	unknown: &mut ExtraFields,
	bytes: &[u8],
	clear_existing: bool,
) -> Result<(), CacheError> {
	if codec::is_blank(bytes) {
		if clear_existing {
			accessor.clear();
			unknown.clear();
		}

		return Ok(());
	}

	let document = codec::parse::<JsonDocument>(FORMAT, bytes)?;

	if !document.has_records()
		&& !document.unknown.is_empty()
		&& document.unknown.keys().all(|key| dictionary::NODES.contains(&key.as_str()))
	{
		return Err(CacheError::WrongFormat {
			format: FORMAT,
			reason: "payload only carries dictionary nodes".into(),
		});
	}
	if clear_existing {
		accessor.clear();
		unknown.clear();
	}

	let JsonDocument { access_tokens, refresh_tokens, id_tokens, accounts, app_metadata, unknown: nodes } =
		document;

	access_tokens.into_values().map(CacheRecord::from).for_each(|record| accessor.save(record));
	refresh_tokens.into_values().map(CacheRecord::from).for_each(|record| accessor.save(record));
	id_tokens.into_values().map(CacheRecord::from).for_each(|record| accessor.save(record));
	accounts.into_values().map(CacheRecord::from).for_each(|record| accessor.save(record));
	app_metadata.into_values().map(CacheRecord::from).for_each(|record| accessor.save(record));
	unknown.extend(nodes);

	Ok(())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		auth::{CredentialType, TokenSecret},
		store::MemoryAccessor,
	};

	fn refresh_token(home: &str) -> RefreshTokenRecord {
		RefreshTokenRecord {
			home_account_id: home.into(),
			environment: "login.windows.net".into(),
			client_id: "client-1".into(),
			secret: TokenSecret::new("rt"),
			credential_type: CredentialType::RefreshToken,
			family_id: None,
			user_assertion_hash: None,
			extra: Default::default(),
		}
	}

	#[test]
	fn nodes_are_keyed_by_composite_key() {
		let accessor = MemoryAccessor::default();

		accessor.save(refresh_token("uid.utid").into());
		accessor.save(
			AccessTokenRecord {
				home_account_id: "uid.utid".into(),
				environment: "login.windows.net".into(),
				client_id: "client-1".into(),
				secret: TokenSecret::new("at"),
				credential_type: CredentialType::AccessToken,
				realm: "utid".into(),
				target: "user.read".into(),
				cached_at: datetime!(2025-01-01 00:00 UTC),
				expires_on: datetime!(2025-01-01 01:00 UTC),
				extended_expires_on: None,
				key_id: None,
				token_type: None,
				user_assertion_hash: None,
				extra: Default::default(),
			}
			.into(),
		);

		let bytes = serialize(&accessor, &ExtraFields::new()).expect("Serialization should succeed.");
		let value: JsonValue = serde_json::from_slice(&bytes).expect("Output should be JSON.");

		assert_eq!(
			value["RefreshToken"]["uid.utid-login.windows.net-refreshtoken-client-1--"]["secret"],
			"rt"
		);
		assert_eq!(
			value["AccessToken"]["uid.utid-login.windows.net-accesstoken-client-1-utid-user.read"]
				["expires_on"],
			"1735693200"
		);
		assert_eq!(value["Account"], serde_json::json!({}));
	}

	#[test]
	fn merge_keeps_existing_records_and_clear_drops_them() {
		let accessor = MemoryAccessor::default();
		let mut unknown = ExtraFields::new();

		accessor.save(refresh_token("existing.home").into());

		let incoming = MemoryAccessor::default();

		incoming.save(refresh_token("incoming.home").into());

		let blob = serialize(&incoming, &ExtraFields::new()).expect("Serialization should succeed.");

		deserialize(&accessor, &mut unknown, &blob, false).expect("Merge should succeed.");

		assert_eq!(accessor.refresh_tokens().len(), 2);

		deserialize(&accessor, &mut unknown, &blob, true).expect("Replace should succeed.");

		assert_eq!(accessor.refresh_tokens().len(), 1);
	}

	#[test]
	fn blank_payloads_clear_only_on_request() {
		let accessor = MemoryAccessor::default();
		let mut unknown = ExtraFields::new();

		accessor.save(refresh_token("uid.utid").into());
		deserialize(&accessor, &mut unknown, b"", false).expect("Blank merge is a no-op.");

		assert_eq!(accessor.refresh_tokens().len(), 1);

		deserialize(&accessor, &mut unknown, b"  ", true).expect("Blank replace clears.");

		assert!(accessor.is_empty());
	}

	#[test]
	fn dictionary_payloads_are_rejected() {
		let accessor = MemoryAccessor::default();
		let err = deserialize(
			&accessor,
			&mut ExtraFields::new(),
			br#"{"access_tokens":[],"refresh_tokens":[]}"#,
			true,
		)
		.expect_err("Dictionary blob must not load as JSON.");

		assert!(matches!(err, CacheError::WrongFormat { format: "json", .. }));
	}

	#[test]
	fn malformed_records_are_surfaced() {
		let err = deserialize(
			&MemoryAccessor::default(),
			&mut ExtraFields::new(),
			br#"{"RefreshToken":{"k":{"environment":"e"}}}"#,
			true,
		)
		.expect_err("Record without a secret must be rejected.");

		assert!(matches!(err, CacheError::Malformed { format: "json", .. }));
	}
}
