//! Refresh-token-only legacy layout shared with older client libraries.
//!
//! Only refresh tokens and the user identity they belong to are stored. Access and ID tokens
//! never enter this layout.

// self
use crate::{
	_prelude::*,
	auth::{ClientInfo, ExtraFields, TokenSecret},
	codec,
	error::CacheError,
};

const FORMAT: &str = "legacy";

/// Decoded legacy store, ordered by key.
pub type LegacyDictionary = BTreeMap<LegacyTokenKey, LegacyTokenValue>;

/// Who a legacy entry was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LegacySubjectType {
	/// Signed-in user.
	User,
	/// The client itself.
	Client,
	/// User scoped to one client.
	UserPlusClient,
}

/// Lookup key of a legacy entry; text fields are stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegacyTokenKey {
	/// Authority URL the token was issued by.
	pub authority: String,
	/// Resource the token was issued for.
	#[serde(default)]
	pub resource: String,
	/// Client the token was issued to.
	pub client_id: String,
	/// Subject kind.
	pub subject_type: LegacySubjectType,
	/// Unique user id (object id or subject).
	#[serde(default)]
	pub unique_id: String,
	/// Sign-in name.
	#[serde(default)]
	pub displayable_id: String,
}
impl LegacyTokenKey {
	/// Builds a key, lowercasing every text field.
	pub fn new(
		authority: &str,
		resource: &str,
		client_id: &str,
		subject_type: LegacySubjectType,
		unique_id: &str,
		displayable_id: &str,
	) -> Self {
		Self {
			authority: authority.to_lowercase(),
			resource: resource.to_lowercase(),
			client_id: client_id.to_lowercase(),
			subject_type,
			unique_id: unique_id.to_lowercase(),
			displayable_id: displayable_id.to_lowercase(),
		}
	}

	/// Host of [`Self::authority`], if it is a URL.
	pub fn environment(&self) -> Option<String> {
		Url::parse(&self.authority).ok().and_then(|url| url.host_str().map(str::to_owned))
	}

	fn normalized(self) -> Self {
		Self::new(
			&self.authority,
			&self.resource,
			&self.client_id,
			self.subject_type,
			&self.unique_id,
			&self.displayable_id,
		)
	}
}

/// User identity recorded next to a legacy refresh token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyUserInfo {
	/// Unique user id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unique_id: Option<String>,
	/// Sign-in name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub displayable_id: Option<String>,
}

/// Payload of a legacy entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTokenValue {
	/// Refresh token.
	pub refresh_token: TokenSecret,
	/// Raw base64url client info, when the provider returned one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raw_client_info: Option<String>,
	/// Resource echoed by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_in_response: Option<String>,
	/// Identity of the token owner.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_info: Option<LegacyUserInfo>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl LegacyTokenValue {
	/// Decoded client info; `None` when absent or unreadable.
	pub fn client_info(&self) -> Option<ClientInfo> {
		self.raw_client_info.as_deref().and_then(|raw| ClientInfo::parse(raw).ok())
	}
}

#[derive(Serialize)]
struct EntryRef<'a> {
	key: &'a LegacyTokenKey,
	value: &'a LegacyTokenValue,
}

#[derive(Deserialize)]
struct Entry {
	key: LegacyTokenKey,
	value: LegacyTokenValue,
}

/// Encodes entries as a JSON array ordered by key.
pub fn encode(dictionary: &LegacyDictionary) -> Result<Vec<u8>, CacheError> {
	let entries = dictionary.iter().map(|(key, value)| EntryRef { key, value }).collect::<Vec<_>>();

	codec::encode(FORMAT, &entries)
}

/// Decodes a legacy blob; a blank blob is an empty store.
pub fn decode(bytes: &[u8]) -> Result<LegacyDictionary, CacheError> {
	if codec::is_blank(bytes) {
		return Ok(LegacyDictionary::new());
	}

	let entries = codec::parse::<Vec<Entry>>(FORMAT, bytes)?;

	Ok(entries.into_iter().map(|entry| (entry.key.normalized(), entry.value)).collect())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn value(secret: &str) -> LegacyTokenValue {
		LegacyTokenValue {
			refresh_token: TokenSecret::new(secret),
			raw_client_info: None,
			resource_in_response: None,
			user_info: Some(LegacyUserInfo {
				unique_id: Some("oid".into()),
				displayable_id: Some("user@contoso.com".into()),
			}),
			extra: Default::default(),
		}
	}

	#[test]
	fn keys_are_lowercased_and_ordered() {
		let mut dictionary = LegacyDictionary::new();

		dictionary.insert(
			LegacyTokenKey::new("https://login.windows.net/b/", "", "Client", LegacySubjectType::User, "OID", "User@Contoso.com"),
			value("rt-b"),
		);
		dictionary.insert(
			LegacyTokenKey::new("https://login.windows.net/a/", "", "Client", LegacySubjectType::User, "OID", "User@Contoso.com"),
			value("rt-a"),
		);

		let bytes = encode(&dictionary).expect("Legacy store should encode.");
		let array: JsonValue = serde_json::from_slice(&bytes).expect("Output should be JSON.");

		assert_eq!(array[0]["key"]["authority"], "https://login.windows.net/a/");
		assert_eq!(array[0]["key"]["displayable_id"], "user@contoso.com");
		assert_eq!(array[1]["value"]["refresh_token"], "rt-b");
	}

	#[test]
	fn decoded_keys_are_normalized() {
		let decoded = decode(
			br#"[{"key":{"authority":"HTTPS://Login.Windows.net/common/","client_id":"C","subject_type":"Client"},"value":{"refresh_token":"rt","future":true}}]"#,
		)
		.expect("Legacy blob should decode.");
		let (key, value) = decoded.iter().next().expect("One entry should decode.");

		assert_eq!(key.client_id, "c");
		assert_eq!(key.environment().as_deref(), Some("login.windows.net"));
		assert_eq!(value.extra.get("future"), Some(&JsonValue::Bool(true)));
	}

	#[test]
	fn non_array_blobs_are_malformed() {
		assert!(matches!(decode(b"{}"), Err(CacheError::Malformed { format: "legacy", .. })));
		assert!(decode(b"").expect("Blank blob is an empty store.").is_empty());
	}
}
