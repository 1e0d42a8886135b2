//! Thread-safe in-memory [`CacheAccessor`] used by default.

// self
use crate::{
	_prelude::*,
	auth::{
		AccessTokenRecord, AccountRecord, AppMetadataRecord, CacheRecord, IdTokenRecord,
		RecordKind, RefreshTokenRecord,
	},
	store::CacheAccessor,
};

#[derive(Debug, Default)]
struct Partitions {
	access_tokens: HashMap<String, AccessTokenRecord>,
	refresh_tokens: HashMap<String, RefreshTokenRecord>,
	id_tokens: HashMap<String, IdTokenRecord>,
	accounts: HashMap<String, AccountRecord>,
	app_metadata: HashMap<String, AppMetadataRecord>,
}

/// Process-local partitions keyed by composite cache key.
///
/// Clones share the same partitions.
#[derive(Clone, Debug, Default)]
pub struct MemoryAccessor(Arc<RwLock<Partitions>>);
impl MemoryAccessor {
	fn snapshot<T>(map: &HashMap<String, T>) -> Vec<T>
	where
		T: Clone,
	{
		map.values().cloned().collect()
	}
}
impl CacheAccessor for MemoryAccessor {
	fn save(&self, record: CacheRecord) {
		let key = record.cache_key();
		let mut guard = self.0.write();

		match record {
			CacheRecord::AccessToken(record) => {
				guard.access_tokens.insert(key, record);
			},
			CacheRecord::RefreshToken(record) => {
				guard.refresh_tokens.insert(key, record);
			},
			CacheRecord::IdToken(record) => {
				guard.id_tokens.insert(key, record);
			},
			CacheRecord::Account(record) => {
				guard.accounts.insert(key, record);
			},
			CacheRecord::AppMetadata(record) => {
				guard.app_metadata.insert(key, record);
			},
		}
	}

	fn delete(&self, kind: RecordKind, key: &str) {
		let mut guard = self.0.write();
		let removed = match kind {
			RecordKind::AccessToken => guard.access_tokens.remove(key).is_some(),
			RecordKind::RefreshToken => guard.refresh_tokens.remove(key).is_some(),
			RecordKind::IdToken => guard.id_tokens.remove(key).is_some(),
			RecordKind::Account => guard.accounts.remove(key).is_some(),
			RecordKind::AppMetadata => guard.app_metadata.remove(key).is_some(),
		};

		if !removed {
			tracing::debug!(kind = kind.as_str(), "delete skipped; no record under key");
		}
	}

	fn clear(&self) {
		*self.0.write() = Partitions::default();
	}

	fn access_tokens(&self) -> Vec<AccessTokenRecord> {
		Self::snapshot(&self.0.read().access_tokens)
	}

	fn refresh_tokens(&self) -> Vec<RefreshTokenRecord> {
		Self::snapshot(&self.0.read().refresh_tokens)
	}

	fn id_tokens(&self) -> Vec<IdTokenRecord> {
		Self::snapshot(&self.0.read().id_tokens)
	}

	fn accounts(&self) -> Vec<AccountRecord> {
		Self::snapshot(&self.0.read().accounts)
	}

	fn app_metadata(&self) -> Vec<AppMetadataRecord> {
		Self::snapshot(&self.0.read().app_metadata)
	}
}
