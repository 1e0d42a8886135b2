//! Interop store shared with older client libraries that only persisted refresh tokens.
//!
//! Reads and writes here never fail the calling operation: every failure is logged and treated
//! as an empty store.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, CredentialType, IdTokenClaims, RefreshTokenRecord},
	cache::Account,
	codec::legacy::{self, LegacyDictionary, LegacySubjectType, LegacyTokenKey, LegacyTokenValue, LegacyUserInfo},
	discovery::InstanceMetadataEntry,
	store::StoreError,
};

/// Byte-blob storage of the legacy refresh-token store.
pub trait LegacyCachePersistence
where
	Self: Send + Sync,
{
	/// Returns the stored blob; empty when nothing was stored.
	fn load_cache(&self) -> Result<Vec<u8>, StoreError>;

	/// Replaces the stored blob.
	fn write_cache(&self, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// In-process [`LegacyCachePersistence`]; clones share the blob.
#[derive(Clone, Debug, Default)]
pub struct MemoryLegacyPersistence(Arc<Mutex<Vec<u8>>>);
impl LegacyCachePersistence for MemoryLegacyPersistence {
	fn load_cache(&self) -> Result<Vec<u8>, StoreError> {
		Ok(self.0.lock().clone())
	}

	fn write_cache(&self, bytes: Vec<u8>) -> Result<(), StoreError> {
		*self.0.lock() = bytes;

		Ok(())
	}
}

/// A user found in the legacy store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyUser {
	/// Host of the entry's authority.
	pub environment: String,
	/// Raw client info, when the entry carried one.
	pub client_info: Option<String>,
	/// Unique id and sign-in name.
	pub info: LegacyUserInfo,
}

pub(crate) fn load(persistence: &dyn LegacyCachePersistence) -> LegacyDictionary {
	let bytes = match persistence.load_cache() {
		Ok(bytes) => bytes,
		Err(e) => {
			tracing::warn!(error = %e, "failed to load the legacy cache");

			return LegacyDictionary::new();
		},
	};

	legacy::decode(&bytes).unwrap_or_else(|e| {
		tracing::warn!(error = %e, "legacy cache is unreadable; treating it as empty");

		LegacyDictionary::new()
	})
}

fn store(persistence: &dyn LegacyCachePersistence, dictionary: &LegacyDictionary) {
	let written = legacy::encode(dictionary)
		.map_err(Error::from)
		.and_then(|bytes| persistence.write_cache(bytes).map_err(Error::from));

	if let Err(e) = written {
		tracing::warn!(error = %e, "failed to write the legacy cache");
	}
}

/// Mirrors a freshly issued refresh token into the legacy store.
pub(crate) fn write_refresh_token(
	persistence: &dyn LegacyCachePersistence,
	record: &RefreshTokenRecord,
	raw_client_info: &str,
	claims: &IdTokenClaims,
	authority: &str,
	resource: &str,
) {
	let Some(unique_id) = claims.unique_id() else {
		tracing::warn!("id token has no unique id; legacy cache left untouched");

		return;
	};
	let displayable_id = claims.preferred_username.as_deref().unwrap_or_default();
	let mut dictionary = load(persistence);
	let key = LegacyTokenKey::new(
		authority,
		resource,
		&record.client_id,
		LegacySubjectType::User,
		unique_id,
		displayable_id,
	);
	let value = LegacyTokenValue {
		refresh_token: record.secret.clone(),
		raw_client_info: Some(raw_client_info.to_owned()),
		resource_in_response: Some(resource.to_owned()),
		user_info: Some(LegacyUserInfo {
			unique_id: Some(unique_id.to_owned()),
			displayable_id: Some(displayable_id.to_owned()),
		}),
		extra: Default::default(),
	};

	dictionary.insert(key, value);
	store(persistence, &dictionary);
}

/// Every user the legacy store knows for `client_id`, one per identity.
pub(crate) fn get_all_users(persistence: &dyn LegacyCachePersistence, client_id: &ClientId) -> Vec<LegacyUser> {
	let mut users = Vec::<LegacyUser>::new();

	for (key, value) in load(persistence) {
		if !client_id.matches(&key.client_id) {
			continue;
		}

		let Some(environment) = key.environment() else {
			continue;
		};
		let info = value.user_info.clone().unwrap_or_default();
		let user = LegacyUser { environment, client_info: value.raw_client_info.clone(), info };

		if !users.contains(&user) {
			users.push(user);
		}
	}

	users
}

/// Removes every entry of `client_id` that belongs to the user.
///
/// Entries match on sign-in name or, when they carry client info, on the home account id.
pub(crate) fn remove_user(
	persistence: &dyn LegacyCachePersistence,
	client_id: &ClientId,
	displayable_id: &str,
	home_account_id: Option<&str>,
) {
	let mut dictionary = load(persistence);
	let before = dictionary.len();

	dictionary.retain(|key, value| {
		if !client_id.matches(&key.client_id) {
			return true;
		}

		let by_name = !displayable_id.is_empty() && key.displayable_id.eq_ignore_ascii_case(displayable_id);
		let by_home = home_account_id.is_some_and(|home| {
			value
				.client_info()
				.and_then(|info| info.home_account_id().ok())
				.is_some_and(|id| id.matches(home))
		});

		!(by_name || by_home)
	});

	if dictionary.len() != before {
		tracing::debug!(removed = before - dictionary.len(), "removed legacy cache entries");
		store(persistence, &dictionary);
	}
}

/// Finds a legacy refresh token for `account` and adapts it to a current record.
///
/// Candidates are narrowed by home account id, then sign-in name, then object id; a narrowing
/// step that would leave nothing is skipped. Entries under the preferred cache host win.
pub(crate) fn get_refresh_token(
	persistence: &dyn LegacyCachePersistence,
	client_id: &ClientId,
	metadata: &InstanceMetadataEntry,
	account: &Account,
) -> Option<RefreshTokenRecord> {
	let mut candidates = load(persistence)
		.into_iter()
		.filter(|(key, _)| client_id.matches(&key.client_id))
		.filter(|(key, _)| key.environment().is_some_and(|env| metadata.contains_alias(&env)))
		.collect::<Vec<_>>();

	if let Some(home) = account.home_account_id.as_ref() {
		narrow(&mut candidates, |_, value| {
			value
				.client_info()
				.and_then(|info| info.home_account_id().ok())
				.is_some_and(|id| id.matches(home))
		});
	}
	if !account.username.is_empty() {
		narrow(&mut candidates, |key, _| key.displayable_id.eq_ignore_ascii_case(&account.username));
	}
	if let Some(object_id) = account.tenant_profiles.iter().find_map(|profile| profile.object_id.as_deref()) {
		narrow(&mut candidates, |key, _| key.unique_id.eq_ignore_ascii_case(object_id));
	}

	if candidates.is_empty() {
		return None;
	}

	let position = candidates
		.iter()
		.position(|(key, _)| key.environment().is_some_and(|env| metadata.is_preferred_cache(&env)))
		.unwrap_or(0);
	let (key, value) = candidates.swap_remove(position);

	tracing::debug!("refresh token served from the legacy cache");

	Some(RefreshTokenRecord {
		home_account_id: account.home_account_key().to_owned(),
		environment: key.environment().unwrap_or_default(),
		client_id: client_id.to_string(),
		secret: value.refresh_token,
		credential_type: CredentialType::RefreshToken,
		family_id: None,
		user_assertion_hash: None,
		extra: Default::default(),
	})
}

/// Drops every legacy entry.
pub(crate) fn clear(persistence: &dyn LegacyCachePersistence) {
	store(persistence, &LegacyDictionary::new());
}

fn narrow<F>(candidates: &mut Vec<(LegacyTokenKey, LegacyTokenValue)>, keep: F)
where
	F: Fn(&LegacyTokenKey, &LegacyTokenValue) -> bool,
{
	if candidates.iter().any(|(key, value)| keep(key, value)) {
		candidates.retain(|(key, value)| keep(key, value));
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;
	use crate::auth::{HomeAccountId, TokenSecret};

	const AUTHORITY: &str = "https://login.windows.net/common/";

	fn client() -> ClientId {
		ClientId::new("client-1").expect("Client fixture should be valid.")
	}

	fn client_info(uid: &str, utid: &str) -> String {
		URL_SAFE_NO_PAD.encode(format!(r#"{{"uid":"{uid}","utid":"{utid}"}}"#))
	}

	fn refresh_token(secret: &str) -> RefreshTokenRecord {
		RefreshTokenRecord {
			home_account_id: "uid.utid".into(),
			environment: "login.windows.net".into(),
			client_id: "client-1".into(),
			secret: TokenSecret::new(secret),
			credential_type: CredentialType::RefreshToken,
			family_id: None,
			user_assertion_hash: None,
			extra: Default::default(),
		}
	}

	fn claims(oid: &str, username: &str) -> IdTokenClaims {
		IdTokenClaims {
			oid: Some(oid.into()),
			preferred_username: Some(username.into()),
			..Default::default()
		}
	}

	fn account(home: &str, username: &str) -> Account {
		Account::new(
			Some(HomeAccountId::new(home).expect("Home id fixture should be valid.")),
			username,
			"login.microsoftonline.com",
		)
	}

	fn public_cloud() -> InstanceMetadataEntry {
		crate::discovery::AliasCatalog::bundled()
			.lookup("login.windows.net")
			.cloned()
			.expect("Public cloud should be bundled.")
	}

	#[test]
	fn written_tokens_are_found_by_home_account() {
		let persistence = MemoryLegacyPersistence::default();

		write_refresh_token(
			&persistence,
			&refresh_token("rt-1"),
			&client_info("uid", "utid"),
			&claims("oid-1", "one@contoso.com"),
			AUTHORITY,
			"user.read",
		);
		write_refresh_token(
			&persistence,
			&refresh_token("rt-2"),
			&client_info("other", "utid"),
			&claims("oid-2", "two@contoso.com"),
			AUTHORITY,
			"user.read",
		);

		let found = get_refresh_token(&persistence, &client(), &public_cloud(), &account("uid.utid", ""))
			.expect("Legacy refresh token should be found.");

		assert_eq!(found.secret.expose(), "rt-1");
		assert_eq!(found.home_account_id, "uid.utid");
		assert_eq!(found.environment, "login.windows.net");
	}

	#[test]
	fn users_split_by_client_info_and_removal_matches_either() {
		let persistence = MemoryLegacyPersistence::default();

		write_refresh_token(
			&persistence,
			&refresh_token("rt-1"),
			&client_info("uid", "utid"),
			&claims("oid-1", "one@contoso.com"),
			AUTHORITY,
			"r",
		);

		let users = get_all_users(&persistence, &client());

		assert_eq!(users.len(), 1);
		assert_eq!(users[0].environment, "login.windows.net");
		assert_eq!(users[0].info.displayable_id.as_deref(), Some("one@contoso.com"));

		remove_user(&persistence, &client(), "", Some("uid.utid"));

		assert!(get_all_users(&persistence, &client()).is_empty());
	}

	#[test]
	fn unreadable_store_is_treated_as_empty() {
		let persistence = MemoryLegacyPersistence::default();

		persistence.write_cache(b"not json".to_vec()).expect("Memory write should succeed.");

		assert!(get_all_users(&persistence, &client()).is_empty());
		assert!(
			get_refresh_token(&persistence, &client(), &public_cloud(), &account("uid.utid", "x"))
				.is_none()
		);
	}
}
