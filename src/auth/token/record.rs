//! Cache record kinds, their wire shape, and composite storage keys.

// self
use crate::{
	_prelude::*,
	auth::{IdTokenClaims, ScopeSet, TokenSecret},
};

/// Fields a record carried that this version does not model; written back untouched.
pub type ExtraFields = BTreeMap<String, JsonValue>;

/// `authority_type` of accounts issued by tenanted cloud authorities.
pub const AUTHORITY_TYPE_MSSTS: &str = "MSSTS";
/// `authority_type` of accounts issued by federation servers.
pub const AUTHORITY_TYPE_ADFS: &str = "ADFS";

const BEARER: &str = "bearer";

/// `credential_type` discriminator written into every credential record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
	/// Bearer access token.
	AccessToken,
	/// Access token bound to a non-bearer scheme such as proof-of-possession.
	#[serde(rename = "AccessToken_With_AuthScheme")]
	AccessTokenWithAuthScheme,
	/// Refresh token.
	RefreshToken,
	/// ID token.
	IdToken,
}
impl CredentialType {
	/// Lowercase segment used inside cache keys.
	pub const fn key_segment(self) -> &'static str {
		match self {
			CredentialType::AccessToken => "accesstoken",
			CredentialType::AccessTokenWithAuthScheme => "accesstoken_with_authscheme",
			CredentialType::RefreshToken => "refreshtoken",
			CredentialType::IdToken => "idtoken",
		}
	}
}

/// The five record partitions of a token cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
	/// [`AccessTokenRecord`] partition.
	AccessToken,
	/// [`RefreshTokenRecord`] partition.
	RefreshToken,
	/// [`IdTokenRecord`] partition.
	IdToken,
	/// [`AccountRecord`] partition.
	Account,
	/// [`AppMetadataRecord`] partition.
	AppMetadata,
}
impl RecordKind {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RecordKind::AccessToken => "access_token",
			RecordKind::RefreshToken => "refresh_token",
			RecordKind::IdToken => "id_token",
			RecordKind::Account => "account",
			RecordKind::AppMetadata => "app_metadata",
		}
	}
}
impl Display for RecordKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Cached access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
	/// Owning account; empty for app-only tokens.
	#[serde(default)]
	pub home_account_id: String,
	/// Issuing host (the preferred cache alias at write time).
	pub environment: String,
	/// Client the token was issued to.
	pub client_id: String,
	/// Token value.
	pub secret: TokenSecret,
	/// Record discriminator.
	pub credential_type: CredentialType,
	/// Tenant the token is scoped to; empty for federation servers.
	#[serde(default)]
	pub realm: String,
	/// Space-delimited granted scopes.
	#[serde(default)]
	pub target: String,
	/// Write instant.
	#[serde(with = "unix_seconds")]
	pub cached_at: OffsetDateTime,
	/// Hard expiry.
	#[serde(with = "unix_seconds")]
	pub expires_on: OffsetDateTime,
	/// Expiry honored while the provider is unavailable, if extended lifetime is enabled.
	#[serde(default, skip_serializing_if = "Option::is_none", with = "unix_seconds::option")]
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Proof-of-possession key binding.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_id: Option<String>,
	/// Token type when not a plain bearer token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// On-behalf-of correlation key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_assertion_hash: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl AccessTokenRecord {
	/// Granted scopes.
	pub fn scopes(&self) -> ScopeSet {
		ScopeSet::from_target(&self.target)
	}

	/// True unless the record carries a non-bearer token type.
	pub fn is_bearer(&self) -> bool {
		self.token_type.as_deref().is_none_or(|kind| kind.eq_ignore_ascii_case(BEARER))
	}

	/// `{home}-{env}-{credential}-{client}-{realm}-{target}[-{token_type}][-{key_id}]`, lowercased.
	pub fn cache_key(&self) -> String {
		let mut key = join_key(&[
			&self.home_account_id,
			&self.environment,
			self.credential_type.key_segment(),
			&self.client_id,
			&self.realm,
			&self.target,
		]);

		if let Some(kind) = self.token_type.as_deref().filter(|_| !self.is_bearer()) {
			key.push('-');
			key.push_str(&kind.to_ascii_lowercase());
		}
		if let Some(key_id) = self.key_id.as_deref().filter(|id| !id.is_empty()) {
			key.push('-');
			key.push_str(&key_id.to_ascii_lowercase());
		}

		key
	}
}

/// Cached refresh token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
	/// Owning account.
	#[serde(default)]
	pub home_account_id: String,
	/// Issuing host.
	pub environment: String,
	/// Client the token was issued to.
	pub client_id: String,
	/// Token value.
	pub secret: TokenSecret,
	/// Record discriminator.
	pub credential_type: CredentialType,
	/// Family id when the token is shared across a client family.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
	/// On-behalf-of correlation key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_assertion_hash: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl RefreshTokenRecord {
	/// Family id, treating the empty string as absent.
	pub fn family(&self) -> Option<&str> {
		self.family_id.as_deref().filter(|id| !id.is_empty())
	}

	/// True for family refresh tokens.
	pub fn is_family_token(&self) -> bool {
		self.family().is_some()
	}

	/// `{home}-{env}-refreshtoken-{family_or_client}--`, lowercased.
	pub fn cache_key(&self) -> String {
		let owner = self.family().unwrap_or(&self.client_id);

		join_key(&[
			&self.home_account_id,
			&self.environment,
			self.credential_type.key_segment(),
			owner,
			"",
			"",
		])
	}
}

/// Cached ID token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenRecord {
	/// Owning account.
	#[serde(default)]
	pub home_account_id: String,
	/// Issuing host.
	pub environment: String,
	/// Client the token was issued to.
	pub client_id: String,
	/// Raw compact JWT.
	pub secret: TokenSecret,
	/// Record discriminator.
	pub credential_type: CredentialType,
	/// Tenant the token was issued in.
	#[serde(default)]
	pub realm: String,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl IdTokenRecord {
	/// Decoded claims; `None` if the stored token is not a readable JWT.
	pub fn claims(&self) -> Option<IdTokenClaims> {
		IdTokenClaims::parse(self.secret.expose()).ok()
	}

	/// `{home}-{env}-idtoken-{client}-{realm}-`, lowercased.
	pub fn cache_key(&self) -> String {
		join_key(&[
			&self.home_account_id,
			&self.environment,
			self.credential_type.key_segment(),
			&self.client_id,
			&self.realm,
			"",
		])
	}
}

/// Durable account summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
	/// `{uid}.{utid}` or an opaque federation subject.
	pub home_account_id: String,
	/// Issuing host.
	pub environment: String,
	/// Tenant of the sign-in that produced this record.
	#[serde(default)]
	pub realm: String,
	/// Object id in `realm`.
	#[serde(default)]
	pub local_account_id: String,
	/// Sign-in name.
	#[serde(default)]
	pub username: String,
	/// [`AUTHORITY_TYPE_MSSTS`] or [`AUTHORITY_TYPE_ADFS`].
	pub authority_type: String,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Raw client info the account was derived from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_info: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl AccountRecord {
	/// `{home}-{env}-{realm}`, lowercased.
	pub fn cache_key(&self) -> String {
		join_key(&[&self.home_account_id, &self.environment, &self.realm])
	}
}

/// Family membership of a client in one environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadataRecord {
	/// Client the metadata describes.
	pub client_id: String,
	/// Environment the membership was observed in.
	pub environment: String,
	/// Family id reported by the provider; absent when the client is not in a family.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
	/// Unmodeled fields.
	#[serde(flatten)]
	pub extra: ExtraFields,
}
impl AppMetadataRecord {
	/// `appmetadata-{env}-{client}`, lowercased.
	pub fn cache_key(&self) -> String {
		join_key(&["appmetadata", &self.environment, &self.client_id])
	}
}

/// Any one cache record, used by kind-agnostic store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheRecord {
	/// Access token.
	AccessToken(AccessTokenRecord),
	/// Refresh token.
	RefreshToken(RefreshTokenRecord),
	/// ID token.
	IdToken(IdTokenRecord),
	/// Account.
	Account(AccountRecord),
	/// App metadata.
	AppMetadata(AppMetadataRecord),
}
impl CacheRecord {
	/// Partition the record belongs to.
	pub fn kind(&self) -> RecordKind {
		match self {
			CacheRecord::AccessToken(_) => RecordKind::AccessToken,
			CacheRecord::RefreshToken(_) => RecordKind::RefreshToken,
			CacheRecord::IdToken(_) => RecordKind::IdToken,
			CacheRecord::Account(_) => RecordKind::Account,
			CacheRecord::AppMetadata(_) => RecordKind::AppMetadata,
		}
	}

	/// Storage key within the record's partition.
	pub fn cache_key(&self) -> String {
		match self {
			CacheRecord::AccessToken(record) => record.cache_key(),
			CacheRecord::RefreshToken(record) => record.cache_key(),
			CacheRecord::IdToken(record) => record.cache_key(),
			CacheRecord::Account(record) => record.cache_key(),
			CacheRecord::AppMetadata(record) => record.cache_key(),
		}
	}
}
impl From<AccessTokenRecord> for CacheRecord {
	fn from(record: AccessTokenRecord) -> Self {
		Self::AccessToken(record)
	}
}
impl From<RefreshTokenRecord> for CacheRecord {
	fn from(record: RefreshTokenRecord) -> Self {
		Self::RefreshToken(record)
	}
}
impl From<IdTokenRecord> for CacheRecord {
	fn from(record: IdTokenRecord) -> Self {
		Self::IdToken(record)
	}
}
impl From<AccountRecord> for CacheRecord {
	fn from(record: AccountRecord) -> Self {
		Self::Account(record)
	}
}
impl From<AppMetadataRecord> for CacheRecord {
	fn from(record: AppMetadataRecord) -> Self {
		Self::AppMetadata(record)
	}
}

/// Drops sub-second precision so an instant survives the unix-seconds wire format unchanged.
pub fn whole_seconds(instant: OffsetDateTime) -> OffsetDateTime {
	instant - Duration::nanoseconds(i64::from(instant.nanosecond()))
}

fn join_key(parts: &[&str]) -> String {
	parts.join("-").to_ascii_lowercase()
}

mod unix_seconds {
	// crates.io
	use serde::{
		Deserializer, Serializer,
		de::{Error as DeError, Visitor},
	};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(instant: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(&instant.unix_timestamp())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_any(UnixSecondsVisitor)
	}

	struct UnixSecondsVisitor;
	impl Visitor<'_> for UnixSecondsVisitor {
		type Value = OffsetDateTime;

		fn expecting(&self, f: &mut Formatter) -> FmtResult {
			f.write_str("unix seconds as a decimal string or integer")
		}

		fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
		where
			E: DeError,
		{
			OffsetDateTime::from_unix_timestamp(v).map_err(E::custom)
		}

		fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
		where
			E: DeError,
		{
			self.visit_i64(i64::try_from(v).map_err(E::custom)?)
		}

		fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
		where
			E: DeError,
		{
			self.visit_i64(v.trim().parse::<i64>().map_err(E::custom)?)
		}
	}

	pub mod option {
		// crates.io
		use serde::{Deserializer, Serializer};
		// self
		use crate::_prelude::*;

		struct Seconds(OffsetDateTime);
		impl<'de> Deserialize<'de> for Seconds {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: Deserializer<'de>,
			{
				super::deserialize(deserializer).map(Seconds)
			}
		}

		pub fn serialize<S>(instant: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			match instant {
				Some(instant) => super::serialize(instant, serializer),
				None => serializer.serialize_none(),
			}
		}

		pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
		where
			D: Deserializer<'de>,
		{
			Ok(<Option<Seconds>>::deserialize(deserializer)?.map(|seconds| seconds.0))
		}
	}
}
