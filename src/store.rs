//! Record storage contracts and the built-in accessor and file persistence hook.

pub mod file;
pub mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryAccessor;

// self
use crate::{
	_prelude::*,
	auth::{
		AccessTokenRecord, AccountRecord, AppMetadataRecord, CacheRecord, IdTokenRecord,
		RecordKind, RefreshTokenRecord,
	},
};

/// Partitioned record storage owned by one token cache.
///
/// Each partition is keyed by the record's composite cache key; saving a record under an existing
/// key replaces it. Mutations are visible to the next read immediately. There is no cross-partition
/// transaction; the engine orchestrates multi-record writes under its own lock.
pub trait CacheAccessor
where
	Self: Send + Sync,
{
	/// Inserts or replaces a record.
	fn save(&self, record: CacheRecord);

	/// Removes the record stored under `key` in the `kind` partition, if any.
	fn delete(&self, kind: RecordKind, key: &str);

	/// Empties every partition.
	fn clear(&self);

	/// Snapshot of the access token partition.
	fn access_tokens(&self) -> Vec<AccessTokenRecord>;

	/// Snapshot of the refresh token partition.
	fn refresh_tokens(&self) -> Vec<RefreshTokenRecord>;

	/// Snapshot of the ID token partition.
	fn id_tokens(&self) -> Vec<IdTokenRecord>;

	/// Snapshot of the account partition.
	fn accounts(&self) -> Vec<AccountRecord>;

	/// Snapshot of the app metadata partition.
	fn app_metadata(&self) -> Vec<AppMetadataRecord>;

	/// Removes a record by value.
	fn delete_record(&self, record: &CacheRecord) {
		self.delete(record.kind(), &record.cache_key());
	}

	/// True when every partition is empty.
	fn is_empty(&self) -> bool {
		self.access_tokens().is_empty()
			&& self.refresh_tokens().is_empty()
			&& self.id_tokens().is_empty()
			&& self.accounts().is_empty()
			&& self.app_metadata().is_empty()
	}
}

/// Failures raised by external storage behind a persistence hook.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Encoding or decoding of the persisted blob failed.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The storage backend failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
