//! Mutating cache operations.

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::{
		AUTHORITY_TYPE_ADFS, AUTHORITY_TYPE_MSSTS, AccessTokenRecord, AccountRecord,
		AppMetadataRecord, CacheRecord, ClientInfo, CredentialType, HomeAccountId, IdTokenClaims,
		IdTokenRecord, RecordKind, RefreshTokenRecord, TenantId, whole_seconds,
	},
	authority::{Authority, AuthorityKind},
	cache::{
		Access, Account, CacheRequest, SavedTokens, TenantProfile, TokenCache, TokenResponse, legacy,
	},
	discovery::InstanceMetadataEntry,
	obs::{CacheOperation, CacheOutcome},
};

impl TokenCache {
	/// Stores the records minted by a token response.
	///
	/// Access tokens of the same identity whose scopes intersect the new grant are evicted first,
	/// so at most one token per scope survives. An ID token yields an account record, a family id
	/// yields app metadata, and user refresh tokens are mirrored into the legacy store.
	pub async fn save_token_response(
		&self,
		request: &CacheRequest,
		response: &TokenResponse,
	) -> Result<SavedTokens> {
		let Some(authority) = response.authority.as_ref().or(request.authority.as_ref()) else {
			tracing::warn!("authority is unresolved; token response not cached");

			return Ok(SavedTokens::default());
		};
		let claims = response
			.id_token
			.as_ref()
			.map(|token| IdTokenClaims::parse(token.expose()))
			.transpose()?;
		let client_info = response.client_info.as_deref().map(ClientInfo::parse).transpose()?;
		let identity = Identity::resolve(request, authority, claims.as_ref(), client_info.as_ref())?;
		let suggested_key = if self.options.application_cache {
			format!("{}_{}_AppTokenCache", self.client_id, identity.tenant)
		} else if let Some(assertion) = request.user_assertion() {
			assertion.cache_key().to_owned()
		} else {
			identity.home_account_id.clone()
		};
		let metadata = self.discovery.get_metadata_full(authority, &request.cancellation).await?;
		let account = identity.account(&metadata.preferred_network, claims.as_ref());
		let access = Access::write(&request.cancellation)
			.with_account(account)
			.with_suggested_key(Some(suggested_key));

		self.observe(
			CacheOperation::SaveTokenResponse,
			self.bracket(access, || async move {
				Ok(self.write_records(request, response, authority, &metadata, &identity, claims.as_ref()))
			}),
			|_: &SavedTokens| CacheOutcome::Success,
		)
		.await
	}

	fn write_records(
		&self,
		request: &CacheRequest,
		response: &TokenResponse,
		authority: &Authority,
		metadata: &InstanceMetadataEntry,
		identity: &Identity,
		claims: Option<&IdTokenClaims>,
	) -> SavedTokens {
		let environment = metadata.preferred_cache.to_ascii_lowercase();
		let now = whole_seconds(OffsetDateTime::now_utc());
		let assertion_hash = request.user_assertion().map(|assertion| assertion.cache_key().to_owned());
		let access_token = AccessTokenRecord {
			home_account_id: identity.home_account_id.clone(),
			environment: environment.clone(),
			client_id: self.client_id.to_string(),
			secret: response.access_token.clone(),
			credential_type: if response.is_bearer() {
				CredentialType::AccessToken
			} else {
				CredentialType::AccessTokenWithAuthScheme
			},
			realm: identity.tenant.clone(),
			target: response.scopes.normalized(),
			cached_at: now,
			expires_on: expiry_after(now, response.expires_in),
			extended_expires_on: response.extended_expires_in.map(|extended| expiry_after(now, extended)),
			key_id: request.key_id().map(str::to_owned),
			token_type: (!response.is_bearer()).then(|| response.token_type.clone()),
			user_assertion_hash: assertion_hash.clone(),
			extra: Default::default(),
		};
		let evicted = self.evict_intersecting(&access_token, metadata, request.is_client_credentials());

		self.accessor.save(access_token.clone().into());

		let mut saved = SavedTokens { access_token: Some(access_token), ..Default::default() };

		if let (Some(raw), Some(claims)) = (response.id_token.as_ref(), claims)
			&& !identity.home_account_id.is_empty()
		{
			let id_token = IdTokenRecord {
				home_account_id: identity.home_account_id.clone(),
				environment: environment.clone(),
				client_id: self.client_id.to_string(),
				secret: raw.clone(),
				credential_type: CredentialType::IdToken,
				realm: identity.tenant.clone(),
				extra: Default::default(),
			};
			let account = AccountRecord {
				home_account_id: identity.home_account_id.clone(),
				environment: environment.clone(),
				realm: identity.tenant.clone(),
				local_account_id: claims.unique_id().unwrap_or_default().to_owned(),
				username: identity.username.clone(),
				authority_type: if authority.kind() == AuthorityKind::Adfs {
					AUTHORITY_TYPE_ADFS
				} else {
					AUTHORITY_TYPE_MSSTS
				}
				.to_owned(),
				name: claims.name.clone(),
				client_info: response.client_info.clone(),
				extra: Default::default(),
			};

			self.accessor.save(id_token.clone().into());
			self.accessor.save(account.into());

			saved.id_token = Some(id_token);
			saved.account = identity.account(&metadata.preferred_network, Some(claims));
		}

		if let Some(secret) = response.refresh_token.as_ref() {
			let family_id = response.family().filter(|_| self.options.foci_enabled).map(str::to_owned);
			let refresh_token = RefreshTokenRecord {
				home_account_id: identity.home_account_id.clone(),
				environment: environment.clone(),
				client_id: self.client_id.to_string(),
				secret: secret.clone(),
				credential_type: CredentialType::RefreshToken,
				family_id,
				user_assertion_hash: assertion_hash,
				extra: Default::default(),
			};

			self.accessor.save(refresh_token.clone().into());

			if self.is_legacy_enabled(request)
				&& !refresh_token.is_family_token()
				&& let (Some(raw_client_info), Some(claims)) = (response.client_info.as_deref(), claims)
			{
				let legacy_authority = TenantId::new(&identity.tenant)
					.map(|tenant| authority.with_tenant(&tenant))
					.unwrap_or_else(|_| authority.clone());

				legacy::write_refresh_token(
					self.legacy.as_ref(),
					&refresh_token,
					raw_client_info,
					claims,
					&legacy_authority.with_host(&environment).canonical(),
					&response.scopes.normalized(),
				);
			}

			saved.refresh_token = Some(refresh_token);
		}

		if self.options.foci_enabled && !request.is_client_credentials() {
			self.accessor.save(
				AppMetadataRecord {
					client_id: self.client_id.to_string(),
					environment,
					family_id: response.family().map(str::to_owned),
					extra: Default::default(),
				}
				.into(),
			);
		}

		self.metrics.record_save(evicted);

		tracing::debug!(
			evicted,
			refresh_token = saved.refresh_token.is_some(),
			id_token = saved.id_token.is_some(),
			"token response cached"
		);

		saved
	}

	/// Deletes access tokens of the same identity whose scopes intersect `incoming`.
	fn evict_intersecting(
		&self,
		incoming: &AccessTokenRecord,
		metadata: &InstanceMetadataEntry,
		client_credentials: bool,
	) -> usize {
		let scopes = incoming.scopes();
		let stale = self.accessor.access_tokens().into_iter().filter(|record| {
			self.client_id.matches(&record.client_id)
				&& metadata.contains_alias(&record.environment)
				&& record.realm.eq_ignore_ascii_case(&incoming.realm)
				&& record.key_id.as_deref().filter(|id| !id.is_empty())
					== incoming.key_id.as_deref().filter(|id| !id.is_empty())
				&& (client_credentials
					|| record.home_account_id.eq_ignore_ascii_case(&incoming.home_account_id))
				&& record.user_assertion_hash == incoming.user_assertion_hash
				&& record.scopes().intersects(&scopes)
		});
		let mut evicted = 0;

		for record in stale {
			self.accessor.delete(RecordKind::AccessToken, &record.cache_key());

			evicted += 1;
		}

		evicted
	}

	/// Deletes every record of `account`.
	///
	/// Family refresh tokens are shared, so when the account holds one the tokens of every client
	/// are removed; otherwise only this client's records go.
	pub async fn remove_account(&self, account: &Account, cancellation: &CancellationToken) -> Result<()> {
		let access = Access::write(cancellation)
			.with_account(Some(account.clone()))
			.with_suggested_key(account.home_account_id.as_ref().map(ToString::to_string));

		self.observe(
			CacheOperation::RemoveAccount,
			self.bracket(access, || async move {
				self.remove_account_records(account);

				Ok(())
			}),
			|_: &()| CacheOutcome::Success,
		)
		.await
	}

	fn remove_account_records(&self, account: &Account) {
		if let Some(home) = account.home_account_id.as_deref() {
			let owned = |home_account_id: &str| home_account_id.eq_ignore_ascii_case(home);
			let refresh_tokens = self
				.accessor
				.refresh_tokens()
				.into_iter()
				.filter(|record| owned(&record.home_account_id))
				.collect::<Vec<_>>();
			let filter_by_client = !self.options.foci_enabled
				|| !refresh_tokens.iter().any(RefreshTokenRecord::is_family_token);
			let for_client = |client_id: &str| !filter_by_client || self.client_id.matches(client_id);
			let mut removed = Vec::<CacheRecord>::new();

			removed.extend(
				refresh_tokens
					.into_iter()
					.filter(|record| for_client(&record.client_id))
					.map(CacheRecord::from),
			);
			removed.extend(
				self.accessor
					.access_tokens()
					.into_iter()
					.filter(|record| owned(&record.home_account_id) && for_client(&record.client_id))
					.map(CacheRecord::from),
			);
			removed.extend(
				self.accessor
					.id_tokens()
					.into_iter()
					.filter(|record| owned(&record.home_account_id) && for_client(&record.client_id))
					.map(CacheRecord::from),
			);
			removed.extend(
				self.accessor
					.accounts()
					.into_iter()
					.filter(|record| {
						owned(&record.home_account_id)
							&& (account.username.is_empty()
								|| record.username.eq_ignore_ascii_case(&account.username))
					})
					.map(CacheRecord::from),
			);

			for record in &removed {
				self.accessor.delete_record(record);
			}

			tracing::debug!(removed = removed.len(), filter_by_client, "account records removed");
		}

		if self.options.legacy_cache_compatibility && !self.options.application_cache {
			legacy::remove_user(
				self.legacy.as_ref(),
				&self.client_id,
				&account.username,
				account.home_account_id.as_deref(),
			);
		}

		self.metrics.record_removal();
	}

	/// Empties every partition, the unknown top-level nodes, and the legacy store.
	pub async fn clear(&self, cancellation: &CancellationToken) -> Result<()> {
		self.observe(
			CacheOperation::Clear,
			self.bracket(Access::write(cancellation), || async move {
				self.accessor.clear();
				self.serializer.clear_unknown_nodes();
				legacy::clear(self.legacy.as_ref());

				tracing::debug!("token cache cleared");

				Ok(())
			}),
			|_: &()| CacheOutcome::Success,
		)
		.await
	}
}

/// `now + lifetime`, saturated at the calendar bounds; saturated expiries read back as corrupt.
fn expiry_after(now: OffsetDateTime, lifetime: Duration) -> OffsetDateTime {
	now.checked_add(lifetime).unwrap_or_else(|| {
		if lifetime.is_negative() {
			PrimitiveDateTime::MIN.assume_utc()
		} else {
			PrimitiveDateTime::MAX.assume_utc()
		}
	})
}

/// Who a token response belongs to.
#[derive(Debug)]
struct Identity {
	tenant: String,
	home_account_id: String,
	username: String,
}
impl Identity {
	fn resolve(
		request: &CacheRequest,
		authority: &Authority,
		claims: Option<&IdTokenClaims>,
		client_info: Option<&ClientInfo>,
	) -> Result<Self> {
		let tenant = authority
			.specific_tenant()
			.map(ToString::to_string)
			.or_else(|| claims.and_then(|claims| claims.tid.clone()))
			.unwrap_or_default();
		let home_account_id = if request.is_client_credentials() {
			String::new()
		} else if let Some(info) = client_info {
			info.home_account_id()?.to_string()
		} else {
			claims.and_then(|claims| claims.sub.clone()).unwrap_or_default()
		};
		let username = claims
			.and_then(|claims| {
				claims.preferred_username.clone().or_else(|| {
					claims.upn.clone().filter(|_| authority.kind() == AuthorityKind::Adfs)
				})
			})
			.unwrap_or_default();

		Ok(Self { tenant, home_account_id, username })
	}

	/// Account handed to the hooks and returned to the caller; none for app-only identities.
	fn account(&self, environment: &str, claims: Option<&IdTokenClaims>) -> Option<Account> {
		let home = HomeAccountId::new(&self.home_account_id).ok()?;
		let home_tenant = home.home_tenant().map(str::to_owned);
		let profiles = claims
			.map(|claims| {
				vec![TenantProfile {
					tenant_id: self.tenant.clone(),
					object_id: claims.oid.clone(),
					is_home_tenant: home_tenant
						.as_deref()
						.is_some_and(|tenant| tenant.eq_ignore_ascii_case(&self.tenant)),
				}]
			})
			.unwrap_or_default();

		Some(Account::new(Some(home), self.username.clone(), environment).with_tenant_profiles(profiles))
	}
}
