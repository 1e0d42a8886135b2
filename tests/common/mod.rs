#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use identity_cache::{
	auth::{ClientId, HomeAccountId, ScopeSet},
	authority::Authority,
	cache::{
		CacheNotification, CacheOptions, CacheRequest, NotificationArgs, NotificationFuture,
		TokenCache, TokenResponse,
	},
	error::{Error, Result},
	store::MemoryAccessor,
};
use parking_lot::Mutex;
use time::Duration;

pub const CLIENT_ID: &str = "client-a";
pub const UID: &str = "uid-1";
pub const UTID: &str = "tenant-home";
pub const USERNAME: &str = "ada@contoso.com";
pub const COMMON: &str = "https://login.microsoftonline.com/common/";

pub fn client_id(raw: &str) -> ClientId {
	ClientId::new(raw).expect("Client id fixture should be valid.")
}

pub fn authority(raw: &str) -> Authority {
	Authority::parse(raw).expect("Authority fixture should parse.")
}

pub fn scopes(raw: &[&str]) -> ScopeSet {
	ScopeSet::new(raw.iter().copied()).expect("Scope fixture should be valid.")
}

pub fn home_account_id() -> HomeAccountId {
	HomeAccountId::from_parts(UID, UTID).expect("Home account fixture should be valid.")
}

fn encode(json: &str) -> String {
	URL_SAFE_NO_PAD.encode(json.as_bytes())
}

/// Unsigned compact ID token carrying the given claims.
pub fn id_token(oid: &str, tid: &str, username: &str) -> String {
	let payload = format!(
		"{{\"oid\":\"{oid}\",\"sub\":\"sub-{oid}\",\"tid\":\"{tid}\",\"preferred_username\":\"{username}\",\"name\":\"Ada\"}}"
	);

	format!("{}.{}.sig", encode("{\"alg\":\"none\"}"), encode(&payload))
}

pub fn client_info(uid: &str, utid: &str) -> String {
	encode(&format!("{{\"uid\":\"{uid}\",\"utid\":\"{utid}\"}}"))
}

/// Full user response for the fixture identity.
pub fn user_response(access_token: &str, granted: &[&str]) -> TokenResponse {
	TokenResponse::new(access_token, scopes(granted), Duration::hours(1))
		.with_refresh_token(format!("rt-{access_token}"))
		.with_id_token(id_token("oid-1", UTID, USERNAME))
		.with_client_info(client_info(UID, UTID))
}

pub fn user_request(granted: &[&str]) -> CacheRequest {
	CacheRequest::new(authority(COMMON), scopes(granted))
}

pub fn cache_with(options: CacheOptions) -> (TokenCache, MemoryAccessor) {
	let accessor = MemoryAccessor::default();
	let cache = TokenCache::builder(client_id(CLIENT_ID))
		.with_options(options)
		.with_accessor(Arc::new(accessor.clone()))
		.build();

	(cache, accessor)
}

/// Records hook invocations and optionally fails one of them.
#[derive(Default)]
pub struct RecordingNotification {
	pub events: Mutex<Vec<String>>,
	pub fail_on: Option<&'static str>,
	pub suggested_keys: Mutex<Vec<Option<String>>>,
}
impl RecordingNotification {
	pub fn failing_on(hook: &'static str) -> Self {
		Self { fail_on: Some(hook), ..Default::default() }
	}

	pub fn events(&self) -> Vec<String> {
		self.events.lock().clone()
	}

	fn record(&self, hook: &'static str, args: &NotificationArgs) -> Result<()> {
		self.events.lock().push(hook.to_owned());
		self.suggested_keys.lock().push(args.suggested_cache_key.clone());

		if self.fail_on == Some(hook) {
			return Err(Error::notification(std::io::Error::other(format!("{hook} failed"))));
		}

		Ok(())
	}
}
impl CacheNotification for RecordingNotification {
	fn on_before_access<'a>(&'a self, args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async move { self.record("before_access", args) })
	}

	fn on_before_write<'a>(&'a self, args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async move { self.record("before_write", args) })
	}

	fn on_after_access<'a>(&'a self, args: &'a NotificationArgs) -> NotificationFuture<'a> {
		Box::pin(async move { self.record("after_access", args) })
	}
}
