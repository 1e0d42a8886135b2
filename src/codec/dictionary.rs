//! Flat dictionary layout: one array per partition of `{"Key", "Value"}` pairs whose value is the
//! record JSON as a string.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{
		AccessTokenRecord, AccountRecord, AppMetadataRecord, CacheRecord, IdTokenRecord,
		RefreshTokenRecord,
	},
	codec,
	error::CacheError,
	store::CacheAccessor,
};

/// Top-level node names of the dictionary layout.
pub const NODES: [&str; 5] = ["access_tokens", "refresh_tokens", "id_tokens", "accounts", "app_metadata"];

const FORMAT: &str = "dictionary";

#[derive(Debug, Serialize, Deserialize)]
struct DictionaryEntry {
	#[serde(rename = "Key")]
	key: String,
	#[serde(rename = "Value")]
	value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DictionaryDocument {
	#[serde(default)]
	access_tokens: Vec<DictionaryEntry>,
	#[serde(default)]
	refresh_tokens: Vec<DictionaryEntry>,
	#[serde(default)]
	id_tokens: Vec<DictionaryEntry>,
	#[serde(default)]
	accounts: Vec<DictionaryEntry>,
	#[serde(default)]
	app_metadata: Vec<DictionaryEntry>,
}

/// Encodes every partition.
pub fn serialize(accessor: &dyn CacheAccessor) -> Result<Vec<u8>, CacheError> {
	fn entries<T>(records: Vec<T>, key: impl Fn(&T) -> String) -> Result<Vec<DictionaryEntry>, CacheError>
	where
		T: Serialize,
	{
		let mut entries = records
			.iter()
			.map(|record| {
				let value = serde_json::to_string(record).map_err(|e| CacheError::Serialization {
					format: FORMAT,
					message: e.to_string(),
				})?;

				Ok(DictionaryEntry { key: key(record), value })
			})
			.collect::<Result<Vec<_>, CacheError>>()?;

		entries.sort_by(|a, b| a.key.cmp(&b.key));

		Ok(entries)
	}

	let document = DictionaryDocument {
		access_tokens: entries(accessor.access_tokens(), AccessTokenRecord::cache_key)?,
		refresh_tokens: entries(accessor.refresh_tokens(), RefreshTokenRecord::cache_key)?,
		id_tokens: entries(accessor.id_tokens(), IdTokenRecord::cache_key)?,
		accounts: entries(accessor.accounts(), AccountRecord::cache_key)?,
		app_metadata: entries(accessor.app_metadata(), AppMetadataRecord::cache_key)?,
	};

	codec::encode(FORMAT, &document)
}

/// Loads a blob into `accessor`, rejecting any top-level node outside [`NODES`].
///
/// Every entry is decoded before the accessor is touched, so a malformed blob leaves the records
/// unchanged.
pub fn deserialize(
	accessor: &dyn CacheAccessor,
	bytes: &[u8],
	clear_existing: bool,
) -> Result<(), CacheError> {
	if codec::is_blank(bytes) {
		if clear_existing {
			accessor.clear();
		}

		return Ok(());
	}

	let root = codec::parse::<BTreeMap<String, JsonValue>>(FORMAT, bytes)?;

	if let Some(node) = root.keys().find(|key| !NODES.contains(&key.as_str())) {
		return Err(CacheError::WrongFormat {
			format: FORMAT,
			reason: format!("unexpected top-level node `{node}`"),
		});
	}

	let document = codec::parse::<DictionaryDocument>(FORMAT, bytes)?;
	let mut records = Vec::new();

	decode_into::<AccessTokenRecord>(&document.access_tokens, &mut records)?;
	decode_into::<RefreshTokenRecord>(&document.refresh_tokens, &mut records)?;
	decode_into::<IdTokenRecord>(&document.id_tokens, &mut records)?;
	decode_into::<AccountRecord>(&document.accounts, &mut records)?;
	decode_into::<AppMetadataRecord>(&document.app_metadata, &mut records)?;

	if clear_existing {
		accessor.clear();
	}

	records.into_iter().for_each(|record| accessor.save(record));

	Ok(())
}

fn decode_into<T>(entries: &[DictionaryEntry], records: &mut Vec<CacheRecord>) -> Result<(), CacheError>
where
	T: DeserializeOwned + Into<CacheRecord>,
{
	for entry in entries {
		records.push(codec::parse::<T>(FORMAT, entry.value.as_bytes())?.into());
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{CredentialType, TokenSecret},
		store::MemoryAccessor,
	};

	fn app_metadata(client: &str) -> AppMetadataRecord {
		AppMetadataRecord {
			client_id: client.into(),
			environment: "login.windows.net".into(),
			family_id: Some("1".into()),
			extra: Default::default(),
		}
	}

	#[test]
	fn entries_carry_record_json_as_strings() {
		let accessor = MemoryAccessor::default();

		accessor.save(app_metadata("client-1").into());

		let bytes = serialize(&accessor).expect("Serialization should succeed.");
		let value: JsonValue = serde_json::from_slice(&bytes).expect("Output should be JSON.");
		let entry = &value["app_metadata"][0];

		assert_eq!(entry["Key"], "appmetadata-login.windows.net-client-1");

		let inner: JsonValue = serde_json::from_str(
			entry["Value"].as_str().expect("Dictionary values should be strings."),
		)
		.expect("Dictionary value should hold record JSON.");

		assert_eq!(inner["family_id"], "1");
		assert_eq!(value["access_tokens"], serde_json::json!([]));
	}

	#[test]
	fn json_layout_is_rejected() {
		let err = deserialize(&MemoryAccessor::default(), br#"{"AccessToken":{}}"#, true)
			.expect_err("JSON layout must not load as a dictionary.");

		assert!(matches!(err, CacheError::WrongFormat { format: "dictionary", .. }));
	}

	#[test]
	fn malformed_values_leave_records_untouched() {
		let accessor = MemoryAccessor::default();

		accessor.save(app_metadata("client-1").into());

		let err = deserialize(
			&accessor,
			br#"{"refresh_tokens":[{"Key":"k","Value":"{\"environment\":1}"}]}"#,
			true,
		)
		.expect_err("Malformed value must be rejected.");

		assert!(matches!(err, CacheError::Malformed { format: "dictionary", .. }));
		assert_eq!(accessor.app_metadata().len(), 1);
	}

	#[test]
	fn records_load_under_recomputed_keys() {
		let accessor = MemoryAccessor::default();
		let record = RefreshTokenRecord {
			home_account_id: "uid.utid".into(),
			environment: "login.windows.net".into(),
			client_id: "client-1".into(),
			secret: TokenSecret::new("rt"),
			credential_type: CredentialType::RefreshToken,
			family_id: None,
			user_assertion_hash: None,
			extra: Default::default(),
		};
		let payload = serde_json::json!({
			"refresh_tokens": [{
				"Key": "stale-key",
				"Value": serde_json::to_string(&record).expect("Record should encode."),
			}],
		});

		deserialize(&accessor, payload.to_string().as_bytes(), false)
			.expect("Dictionary blob should load.");

		assert_eq!(accessor.refresh_tokens(), vec![record]);
	}
}
