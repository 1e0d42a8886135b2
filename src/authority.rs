//! Authority URL model: which issuer a request targets and how it is tenanted.

// self
use crate::{_prelude::*, auth::TenantId, error::ConfigError};

/// Tenant aliases that stand for "any tenant" rather than a specific directory.
pub const COMMON_TENANTS: [&str; 3] = ["common", "organizations", "consumers"];

/// Issuer families with different tenancy and discovery rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorityKind {
	/// Multi-tenant cloud directory (`https://host/{tenant}/`); eligible for instance discovery.
	Aad,
	/// Federation server (`https://host/adfs/`); no tenancy, no discovery.
	Adfs,
	/// Consumer directory with policies (`https://host/tfp/{tenant}/{policy}/` or `*.b2clogin.com`).
	B2c,
}
impl AuthorityKind {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthorityKind::Aad => "aad",
			AuthorityKind::Adfs => "adfs",
			AuthorityKind::B2c => "b2c",
		}
	}
}

/// Parsed, canonicalized authority.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Authority {
	host: String,
	kind: AuthorityKind,
	tenant: Option<TenantId>,
	segments: Vec<String>,
}
impl Authority {
	/// Parses and validates an authority URL.
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(raw).map_err(|source| ConfigError::InvalidAuthority { source })?;
		let unsupported = |reason| ConfigError::UnsupportedAuthority { authority: raw.to_owned(), reason };

		if url.scheme() != "https" {
			return Err(unsupported("authority must use https"));
		}

		let host = url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| unsupported("authority must name a host"))?
			.to_ascii_lowercase();
		let segments = url
			.path_segments()
			.map(|segments| {
				segments.filter(|segment| !segment.is_empty()).map(str::to_owned).collect::<Vec<_>>()
			})
			.unwrap_or_default();
		let first = segments.first().map(|segment| segment.to_ascii_lowercase());
		let kind = match first.as_deref() {
			Some("adfs") => AuthorityKind::Adfs,
			Some("tfp") => AuthorityKind::B2c,
			_ if host.ends_with(".b2clogin.com") => AuthorityKind::B2c,
			_ => AuthorityKind::Aad,
		};
		let (tenant, segments) = match kind {
			AuthorityKind::Aad => {
				let tenant =
					segments.first().cloned().ok_or_else(|| unsupported("authority must name a tenant"))?;

				(Some(tenant.clone()), vec![tenant])
			},
			AuthorityKind::Adfs => (None, vec!["adfs".to_owned()]),
			AuthorityKind::B2c => {
				let tenant_index = usize::from(first.as_deref() == Some("tfp"));
				let tenant = segments
					.get(tenant_index)
					.cloned()
					.ok_or_else(|| unsupported("b2c authority must name a tenant"))?;

				if segments.len() < tenant_index + 2 {
					return Err(unsupported("b2c authority must name a policy"));
				}

				(Some(tenant), segments)
			},
		};
		let tenant = tenant.map(TenantId::new).transpose()?;

		Ok(Self { host, kind, tenant, segments })
	}

	/// Issuer family.
	pub fn kind(&self) -> AuthorityKind {
		self.kind
	}

	/// Lowercase host.
	pub fn host(&self) -> &str {
		&self.host
	}

	/// Tenant segment, absent for federation servers.
	pub fn tenant(&self) -> Option<&TenantId> {
		self.tenant.as_ref()
	}

	/// True when the tenant is one of [`COMMON_TENANTS`].
	pub fn is_common_tenant(&self) -> bool {
		self.tenant
			.as_ref()
			.is_some_and(|tenant| COMMON_TENANTS.iter().any(|alias| tenant.matches(alias)))
	}

	/// Tenant when it names one directory.
	pub fn specific_tenant(&self) -> Option<&TenantId> {
		self.tenant.as_ref().filter(|_| !self.is_common_tenant())
	}

	/// Same authority with the tenant replaced; only tenanted cloud authorities change.
	pub fn with_tenant(&self, tenant: &TenantId) -> Self {
		let mut authority = self.clone();

		if self.kind == AuthorityKind::Aad {
			authority.tenant = Some(tenant.clone());
			authority.segments = vec![tenant.to_string()];
		}

		authority
	}

	/// Same authority served from another alias host.
	pub fn with_host(&self, host: &str) -> Self {
		Self { host: host.to_ascii_lowercase(), ..self.clone() }
	}

	/// `https://{host}/{segments}/`.
	pub fn canonical(&self) -> String {
		format!("https://{}/{}/", self.host, self.segments.join("/"))
	}

	/// Authorization endpoint advertised to the instance discovery service.
	pub fn authorize_endpoint(&self) -> String {
		let tenant = self.tenant.as_deref().unwrap_or(COMMON_TENANTS[0]);

		format!("https://{}/{tenant}/oauth2/v2.0/authorize", self.host)
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authority({})", self.canonical())
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical())
	}
}
impl FromStr for Authority {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
