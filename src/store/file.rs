//! File-backed persistence hook for single-process deployments and CLIs.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	cache::{CacheNotification, NotificationArgs, NotificationFuture},
	codec::SerializableCache,
	store::StoreError,
};

/// Loads the JSON cache blob from disk before each operation and writes it back after every
/// mutation.
#[derive(Clone, Debug)]
pub struct FileCacheStore {
	path: PathBuf,
}
impl FileCacheStore {
	/// Persists to `path`; parent directories are created on first write.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Location of the blob.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
		if !self.path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", self.path.display()),
		})?;

		Ok(Some(bytes).filter(|bytes| !bytes.is_empty()))
	}

	fn ensure_parent_exists(&self) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create cache directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, bytes: &[u8]) -> Result<(), StoreError> {
		self.ensure_parent_exists()?;

		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(bytes).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CacheNotification for FileCacheStore {
	fn on_before_access<'a>(&'a self, args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async move {
			if let Some(bytes) = self.load()? {
				args.cache.deserialize_json(&bytes, true)?;

				tracing::debug!(path = %self.path.display(), "cache loaded from disk");
			}

			Ok(())
		})
	}

	fn on_after_access<'a>(&'a self, args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async move {
			if !args.has_state_changed {
				return Ok(());
			}

			let bytes = args.cache.serialize_json()?;

			self.persist(&bytes)?;

			tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "cache written to disk");

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{
		auth::{ClientId, CredentialType, RefreshTokenRecord, TokenSecret},
		cache::MemoryLegacyPersistence,
		codec::CacheSerializer,
		store::{CacheAccessor, MemoryAccessor},
	};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"identity_cache_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join("identity-cache-tests").join(unique)
	}

	fn args(accessor: Arc<MemoryAccessor>, changed: bool) -> NotificationArgs {
		NotificationArgs {
			client_id: ClientId::new("client-a").expect("Client fixture should be valid."),
			account: None,
			has_state_changed: changed,
			is_application_cache: false,
			has_tokens: true,
			cancellation: CancellationToken::new(),
			suggested_cache_key: None,
			suggested_cache_expiry: None,
			cache: CacheSerializer::new(accessor, Arc::new(MemoryLegacyPersistence::default())),
		}
	}

	#[tokio::test]
	async fn writes_after_mutation_and_reloads_before_access() {
		let path = temp_path();
		let store = FileCacheStore::new(&path);
		let writer = Arc::new(MemoryAccessor::default());

		writer.save(
			RefreshTokenRecord {
				home_account_id: "uid.utid".into(),
				environment: "login.windows.net".into(),
				client_id: "client-a".into(),
				secret: TokenSecret::new("rt"),
				credential_type: CredentialType::RefreshToken,
				family_id: None,
				user_assertion_hash: None,
				extra: Default::default(),
			}
			.into(),
		);
		store
			.on_after_access(&args(writer.clone(), false))
			.await
			.expect("Read-only access should not persist.");

		assert!(!path.exists(), "Unchanged state must not be written.");

		store
			.on_after_access(&args(writer, true))
			.await
			.expect("Mutation should persist the cache.");

		let reader = Arc::new(MemoryAccessor::default());

		store
			.on_before_access(&args(reader.clone(), false))
			.await
			.expect("Stored blob should load.");

		assert_eq!(reader.refresh_tokens().len(), 1);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary cache file {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn missing_file_loads_nothing() {
		let store = FileCacheStore::new(temp_path());
		let accessor = Arc::new(MemoryAccessor::default());

		store
			.on_before_access(&args(accessor.clone(), false))
			.await
			.expect("Missing file is an empty cache.");

		assert!(accessor.is_empty());
	}
}
