//! Cache blob codecs: the current JSON layout, the flat dictionary layout, and the
//! refresh-token-only legacy layout.
//!
//! [`CacheSerializer`] is the capability handed to persistence hooks. It shares the record
//! accessor and legacy persistence with the engine, so a hook can export the current state or
//! replace it with an externally stored blob.

pub mod dictionary;
pub mod json;
pub mod legacy;

pub use legacy::{LegacyDictionary, LegacySubjectType, LegacyTokenKey, LegacyTokenValue, LegacyUserInfo};

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::ExtraFields,
	cache::LegacyCachePersistence,
	error::CacheError,
	store::CacheAccessor,
};

/// Import/export contract over a token cache's records.
pub trait SerializableCache
where
	Self: Send + Sync,
{
	/// Encodes the records in the current JSON layout.
	fn serialize_json(&self) -> Result<Vec<u8>>;

	/// Loads a current JSON blob, replacing existing records when `clear_existing` is set and
	/// merging over them otherwise.
	fn deserialize_json(&self, bytes: &[u8], clear_existing: bool) -> Result<()>;

	/// Encodes the records in the flat dictionary layout.
	fn serialize_dictionary(&self) -> Result<Vec<u8>>;

	/// Loads a dictionary blob with the same clearing semantics as [`Self::deserialize_json`].
	fn deserialize_dictionary(&self, bytes: &[u8], clear_existing: bool) -> Result<()>;

	/// Exports the legacy refresh-token store.
	fn serialize_legacy(&self) -> Result<Vec<u8>>;

	/// Imports a legacy refresh-token blob into the legacy store.
	fn deserialize_legacy(&self, bytes: &[u8], clear_existing: bool) -> Result<()>;
}

/// [`SerializableCache`] over a record accessor and a legacy persistence.
///
/// Top-level JSON nodes this version does not understand are kept and written back on the next
/// export. Clones share the accessor, the legacy store, and the retained nodes.
#[derive(Clone)]
pub struct CacheSerializer {
	accessor: Arc<dyn CacheAccessor>,
	legacy: Arc<dyn LegacyCachePersistence>,
	unknown_nodes: Arc<Mutex<ExtraFields>>,
}
impl CacheSerializer {
	/// Binds the codecs to a record accessor and legacy persistence.
	pub fn new(accessor: Arc<dyn CacheAccessor>, legacy: Arc<dyn LegacyCachePersistence>) -> Self {
		Self { accessor, legacy, unknown_nodes: Default::default() }
	}

	/// Top-level JSON nodes retained from the last import.
	pub fn unknown_nodes(&self) -> ExtraFields {
		self.unknown_nodes.lock().clone()
	}

	pub(crate) fn clear_unknown_nodes(&self) {
		self.unknown_nodes.lock().clear();
	}
}
impl SerializableCache for CacheSerializer {
	fn serialize_json(&self) -> Result<Vec<u8>> {
		Ok(json::serialize(self.accessor.as_ref(), &self.unknown_nodes.lock())?)
	}

	fn deserialize_json(&self, bytes: &[u8], clear_existing: bool) -> Result<()> {
		Ok(json::deserialize(
			self.accessor.as_ref(),
			&mut self.unknown_nodes.lock(),
			bytes,
			clear_existing,
		)?)
	}

	fn serialize_dictionary(&self) -> Result<Vec<u8>> {
		Ok(dictionary::serialize(self.accessor.as_ref())?)
	}

	fn deserialize_dictionary(&self, bytes: &[u8], clear_existing: bool) -> Result<()> {
		Ok(dictionary::deserialize(self.accessor.as_ref(), bytes, clear_existing)?)
	}

	fn serialize_legacy(&self) -> Result<Vec<u8>> {
		let stored = legacy::decode(&self.legacy.load_cache()?)?;

		Ok(legacy::encode(&stored)?)
	}

	fn deserialize_legacy(&self, bytes: &[u8], clear_existing: bool) -> Result<()> {
		let incoming = legacy::decode(bytes)?;
		let merged = if clear_existing {
			incoming
		} else {
			let mut stored = legacy::decode(&self.legacy.load_cache()?)?;

			stored.extend(incoming);

			stored
		};

		self.legacy.write_cache(legacy::encode(&merged)?)?;

		Ok(())
	}
}
impl Debug for CacheSerializer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheSerializer")
			.field("unknown_nodes", &self.unknown_nodes.lock().len())
			.finish_non_exhaustive()
	}
}

pub(crate) fn is_blank(bytes: &[u8]) -> bool {
	bytes.iter().all(u8::is_ascii_whitespace)
}

pub(crate) fn parse<T>(format: &'static str, bytes: &[u8]) -> Result<T, CacheError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(de).map_err(|source| CacheError::Malformed { format, source })
}

pub(crate) fn encode<T>(format: &'static str, value: &T) -> Result<Vec<u8>, CacheError>
where
	T: ?Sized + Serialize,
{
	serde_json::to_vec(value)
		.map_err(|e| CacheError::Serialization { format, message: e.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{cache::MemoryLegacyPersistence, store::MemoryAccessor};

	fn serializer() -> CacheSerializer {
		CacheSerializer::new(
			Arc::new(MemoryAccessor::default()),
			Arc::new(MemoryLegacyPersistence::default()),
		)
	}

	#[test]
	fn unknown_top_level_nodes_survive_export() {
		let serializer = serializer();

		serializer
			.deserialize_json(br#"{"AccessToken":{},"FutureNode":{"k":[1,2]}}"#, true)
			.expect("Blob with an unknown node should load.");

		let exported = serializer.serialize_json().expect("Export should succeed.");
		let value: JsonValue =
			serde_json::from_slice(&exported).expect("Export should be valid JSON.");

		assert_eq!(value["FutureNode"], serde_json::json!({ "k": [1, 2] }));
		assert!(value["RefreshToken"].is_object(), "Known nodes are always written.");
	}

	#[test]
	fn legacy_import_merges_unless_clearing() {
		let serializer = serializer();
		let first = br#"[{"key":{"authority":"https://login.windows.net/common/","resource":"r1","client_id":"c","subject_type":"User","unique_id":"u","displayable_id":"d"},"value":{"refresh_token":"rt1"}}]"#;
		let second = br#"[{"key":{"authority":"https://login.windows.net/common/","resource":"r2","client_id":"c","subject_type":"User","unique_id":"u","displayable_id":"d"},"value":{"refresh_token":"rt2"}}]"#;

		serializer.deserialize_legacy(first, true).expect("First import should succeed.");
		serializer.deserialize_legacy(second, false).expect("Merge import should succeed.");

		let merged = legacy::decode(&serializer.serialize_legacy().expect("Export should succeed."))
			.expect("Export should decode.");

		assert_eq!(merged.len(), 2);

		serializer.deserialize_legacy(second, true).expect("Clearing import should succeed.");

		let replaced = legacy::decode(&serializer.serialize_legacy().expect("Export should succeed."))
			.expect("Export should decode.");

		assert_eq!(replaced.len(), 1);
	}
}
