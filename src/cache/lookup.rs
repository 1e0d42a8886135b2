//! Read-only cache operations.

// self
use crate::{
	_prelude::*,
	auth::{AccountRecord, ClientInfo, HomeAccountId, RefreshTokenRecord},
	authority::Authority,
	cache::{
		Access, Account, CacheRequest, CachedAccessToken, FociMembership, TenantProfile, TokenCache,
		legacy,
		matcher::{self, AccessTokenQuery, Usability},
	},
	discovery::InstanceMetadataEntry,
	obs::{CacheOperation, CacheOutcome},
};

impl TokenCache {
	/// Finds an access token that satisfies `request` without a network call.
	///
	/// Returns `Ok(None)` on a miss, including when the authority is unresolved or the matched
	/// token has expired. Fails with [`Error::MultipleTokensMatched`] when more than one record
	/// survives every filter.
	pub async fn find_access_token(&self, request: &CacheRequest) -> Result<Option<CachedAccessToken>> {
		const OPERATION: CacheOperation = CacheOperation::FindAccessToken;

		let Some(authority) = request.authority.as_ref() else {
			tracing::warn!("authority is unresolved; skipping the access token lookup");
			self.metrics.record_miss();

			return Ok(None);
		};
		let result = self
			.observe(
				OPERATION,
				self.bracket(Access::read(&request.cancellation), || {
					self.match_access_token(request, authority)
				}),
				|found: &Option<CachedAccessToken>| {
					if found.is_some() { CacheOutcome::Hit } else { CacheOutcome::Miss }
				},
			)
			.await;

		if let Ok(found) = &result {
			match found {
				Some(token) => self.metrics.record_hit(token.is_extended_lifetime),
				None => self.metrics.record_miss(),
			}
		}

		result
	}

	async fn match_access_token(
		&self,
		request: &CacheRequest,
		authority: &Authority,
	) -> Result<Option<CachedAccessToken>> {
		let records = self.accessor.access_tokens();

		if records.is_empty() {
			tracing::debug!("no access tokens in cache");

			return Ok(None);
		}

		let tenant = request.tenant();
		let home_account_id = match (request.user_assertion(), request.is_client_credentials()) {
			(Some(_), _) | (None, true) => None,
			(None, false) => match request.account.as_ref() {
				Some(account) => Some(account.home_account_key()),
				None => {
					tracing::warn!("user request carries no account; skipping the access token lookup");

					return Ok(None);
				},
			},
		};
		let scopes = request.scopes.without_reserved();
		let query = AccessTokenQuery {
			client_id: &self.client_id,
			tenant: tenant.as_deref(),
			home_account_id,
			assertion_hash: request.user_assertion().map(|assertion| assertion.cache_key()),
			scopes: &scopes,
			key_id: request.key_id(),
		};
		let records = matcher::filter_by_identity(records, &query);

		if records.is_empty() {
			return Ok(None);
		}

		let environments = distinct(records.iter().map(|record| record.environment.as_str()));
		let metadata =
			self.discovery.get_metadata(authority, &environments, &request.cancellation).await?;
		let records =
			matcher::filter_by_environment(records, &metadata, |record| record.environment.as_str());
		let mut records = matcher::filter_by_key_id(records, query.key_id);

		if records.len() > 1 {
			tracing::error!(count = records.len(), "multiple cached access tokens match the request");

			return Err(Error::MultipleTokensMatched { count: records.len() });
		}

		let Some(record) = records.pop() else {
			return Ok(None);
		};

		match matcher::usability(&record, OffsetDateTime::now_utc(), self.options.extended_lifetime_enabled) {
			Usability::Valid => Ok(Some(CachedAccessToken { record, is_extended_lifetime: false })),
			Usability::Extended => {
				tracing::debug!("serving an access token on its extended lifetime");

				Ok(Some(CachedAccessToken { record, is_extended_lifetime: true }))
			},
			Usability::Expired => {
				tracing::debug!("matched access token is expired");

				Ok(None)
			},
			Usability::Corrupt => {
				tracing::warn!(expires_on = %record.expires_on, "access token expiry is implausible; ignoring it");

				Ok(None)
			},
		}
	}

	/// Finds a refresh token for `request`.
	///
	/// With a `family_id`, a family refresh token is tried first unless app metadata says the
	/// client left the family; the client's own refresh token and then the legacy store follow.
	/// Unlike access tokens, several matches are not an error: the first one wins.
	pub async fn find_refresh_token(
		&self,
		request: &CacheRequest,
		family_id: Option<&str>,
	) -> Result<Option<RefreshTokenRecord>> {
		let Some(authority) = request.authority.as_ref() else {
			tracing::warn!("authority is unresolved; skipping the refresh token lookup");

			return Ok(None);
		};

		self.observe(
			CacheOperation::FindRefreshToken,
			self.bracket(Access::read(&request.cancellation), || async move {
				let family_id = family_id.filter(|id| !id.is_empty());

				if let Some(family_id) = family_id {
					let membership = self.foci_membership(authority, family_id, request).await?;

					if membership.may_use_family_token() {
						if let Some(found) =
							self.match_refresh_token(request, authority, Some(family_id)).await?
						{
							return Ok(Some(found));
						}
					} else {
						tracing::debug!(family_id, "client left the family; skipping the family refresh token");
					}
				}

				self.match_refresh_token(request, authority, None).await
			}),
			|found: &Option<RefreshTokenRecord>| {
				if found.is_some() { CacheOutcome::Hit } else { CacheOutcome::Miss }
			},
		)
		.await
	}

	async fn match_refresh_token(
		&self,
		request: &CacheRequest,
		authority: &Authority,
		family_id: Option<&str>,
	) -> Result<Option<RefreshTokenRecord>> {
		let mut records = self.accessor.refresh_tokens();

		match (request.user_assertion(), request.account.as_ref()) {
			(Some(assertion), _) => records
				.retain(|record| record.user_assertion_hash.as_deref() == Some(assertion.cache_key())),
			(None, Some(account)) => records.retain(|record| {
				record.user_assertion_hash.is_none()
					&& record.home_account_id.eq_ignore_ascii_case(account.home_account_key())
			}),
			(None, None) => {
				tracing::warn!("refresh token lookup carries neither an account nor an assertion");

				return Ok(None);
			},
		}

		records.retain(|record| record.family().unwrap_or_default() == family_id.unwrap_or_default());

		if family_id.is_none() {
			records.retain(|record| self.client_id.matches(&record.client_id));
		}

		let environments = distinct(records.iter().map(|record| record.environment.as_str()));
		let metadata =
			self.discovery.get_metadata(authority, &environments, &request.cancellation).await?;
		let found =
			matcher::filter_by_environment(records, &metadata, |record| record.environment.as_str())
				.into_iter()
				.next();

		if found.is_some() || family_id.is_some() || !self.is_legacy_enabled(request) {
			return Ok(found);
		}

		Ok(request
			.account
			.as_ref()
			.and_then(|account| legacy::get_refresh_token(self.legacy.as_ref(), &self.client_id, &metadata, account)))
	}

	/// Lists the accounts that hold a refresh token for this client, merged with users known to
	/// the legacy store. A request account narrows the result to its home account id.
	pub async fn get_accounts(&self, request: &CacheRequest) -> Result<Vec<Account>> {
		let Some(authority) = request.authority.as_ref() else {
			tracing::warn!("authority is unresolved; no accounts to list");

			return Ok(Vec::new());
		};

		self.observe(
			CacheOperation::GetAccounts,
			self.bracket(Access::read(&request.cancellation), || self.collect_accounts(request, authority)),
			|_: &Vec<Account>| CacheOutcome::Success,
		)
		.await
	}

	async fn collect_accounts(&self, request: &CacheRequest, authority: &Authority) -> Result<Vec<Account>> {
		let mut refresh_tokens = self.accessor.refresh_tokens();
		let accounts = self.accessor.accounts();

		if !self.options.foci_enabled {
			refresh_tokens.retain(|record| self.client_id.matches(&record.client_id));
		}

		let legacy_users = if self.is_legacy_enabled(request) {
			legacy::get_all_users(self.legacy.as_ref(), &self.client_id)
		} else {
			Vec::new()
		};
		let environments = distinct(
			accounts
				.iter()
				.map(|record| record.environment.as_str())
				.chain(refresh_tokens.iter().map(|record| record.environment.as_str()))
				.chain(legacy_users.iter().map(|user| user.environment.as_str())),
		);
		let metadata =
			self.discovery.get_metadata(authority, &environments, &request.cancellation).await?;
		let host = authority.host();
		let mut by_home = BTreeMap::<String, Account>::new();

		for token in refresh_tokens.iter().filter(|record| metadata.contains_alias(&record.environment)) {
			let owner = accounts.iter().find(|record| {
				metadata.contains_alias(&record.environment)
					&& record.home_account_id.eq_ignore_ascii_case(&token.home_account_id)
			});

			if let Some(record) = owner {
				by_home
					.entry(record.home_account_id.to_ascii_lowercase())
					.or_insert_with(|| self.account_from_record(record, host, &metadata));
			}
		}
		for user in legacy_users.iter().filter(|user| metadata.contains_alias(&user.environment)) {
			let home = user
				.client_info
				.as_deref()
				.and_then(|raw| ClientInfo::parse(raw).ok())
				.and_then(|info| info.home_account_id().ok());

			if let Some(home) = home {
				by_home.entry(home.to_ascii_lowercase()).or_insert_with(|| {
					Account::new(Some(home.clone()), user.info.displayable_id.clone().unwrap_or_default(), host)
				});
			}
		}

		let mut found = by_home.into_values().collect::<Vec<_>>();

		for user in legacy_users.iter().filter(|user| {
			user.client_info.is_none() && metadata.contains_alias(&user.environment)
		}) {
			let Some(username) = user.info.displayable_id.as_deref().filter(|name| !name.is_empty()) else {
				continue;
			};

			if !found.iter().any(|account| account.username.eq_ignore_ascii_case(username)) {
				found.push(Account::new(None, username, host));
			}
		}

		if let Some(home) = request.account.as_ref().and_then(|account| account.home_account_id.as_ref()) {
			found.retain(|account| account.home_account_id.as_ref().is_some_and(|id| id.matches(home)));
		}

		tracing::debug!(accounts = found.len(), "accounts collected");

		Ok(found)
	}

	fn account_from_record(
		&self,
		record: &AccountRecord,
		host: &str,
		metadata: &InstanceMetadataEntry,
	) -> Account {
		let home = HomeAccountId::new(&record.home_account_id).ok();
		let home_tenant = home.as_ref().and_then(HomeAccountId::home_tenant).map(str::to_owned);
		let profiles = self
			.accessor
			.id_tokens()
			.into_iter()
			.filter(|token| {
				token.home_account_id.eq_ignore_ascii_case(&record.home_account_id)
					&& metadata.contains_alias(&token.environment)
					&& self.client_id.matches(&token.client_id)
			})
			.map(|token| TenantProfile {
				is_home_tenant: home_tenant
					.as_deref()
					.is_some_and(|tenant| tenant.eq_ignore_ascii_case(&token.realm)),
				object_id: token.claims().and_then(|claims| claims.oid),
				tenant_id: token.realm,
			})
			.collect();

		Account::new(home, record.username.clone(), host).with_tenant_profiles(profiles)
	}

	/// Reports whether app metadata places this client in `family_id`.
	pub async fn is_foci_member(&self, request: &CacheRequest, family_id: &str) -> Result<FociMembership> {
		let Some(authority) = request.authority.as_ref() else {
			tracing::warn!("authority is unresolved; family membership is unknown");

			return Ok(FociMembership::Unknown);
		};

		self.observe(
			CacheOperation::IsFociMember,
			self.bracket(Access::read(&request.cancellation), || {
				self.foci_membership(authority, family_id, request)
			}),
			|_: &FociMembership| CacheOutcome::Success,
		)
		.await
	}

	async fn foci_membership(
		&self,
		authority: &Authority,
		family_id: &str,
		request: &CacheRequest,
	) -> Result<FociMembership> {
		let records = self.accessor.app_metadata();
		let environments = distinct(records.iter().map(|record| record.environment.as_str()));
		let metadata =
			self.discovery.get_metadata(authority, &environments, &request.cancellation).await?;
		let mut own = records.into_iter().filter(|record| {
			self.client_id.matches(&record.client_id) && metadata.contains_alias(&record.environment)
		});
		let membership = match own.next() {
			None => FociMembership::Unknown,
			Some(record) if record.family_id.as_deref().unwrap_or_default() == family_id =>
				FociMembership::Member,
			Some(_) => FociMembership::NotMember,
		};

		tracing::debug!(family_id, membership = ?membership, "family membership resolved");

		Ok(membership)
	}
}

fn distinct<'a>(environments: impl Iterator<Item = &'a str>) -> Vec<String> {
	environments
		.map(str::to_ascii_lowercase)
		.collect::<BTreeSet<_>>()
		.into_iter()
		.collect()
}
