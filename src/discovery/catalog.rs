//! Bundled alias sets of the well-known cloud instances.

// std
use std::sync::OnceLock;
// self
use crate::_prelude::*;

/// Resolved alias set of one cloud instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadataEntry {
	/// Host used for network calls.
	pub preferred_network: String,
	/// Host new records are written under.
	pub preferred_cache: String,
	/// Every host equivalent to the two above.
	#[serde(default)]
	pub aliases: Vec<String>,
}
impl InstanceMetadataEntry {
	/// Entry of a host nobody told us about: the host is its own only alias.
	pub fn self_entry(host: &str) -> Self {
		let host = host.to_ascii_lowercase();

		Self { preferred_network: host.clone(), preferred_cache: host.clone(), aliases: vec![host] }
	}

	/// True if `host` is one of the aliases, ignoring ASCII case.
	pub fn contains_alias(&self, host: &str) -> bool {
		self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(host))
	}

	/// True if `host` is the preferred cache alias.
	pub fn is_preferred_cache(&self, host: &str) -> bool {
		self.preferred_cache.eq_ignore_ascii_case(host)
	}
}

/// Static lookup table of known clouds.
#[derive(Debug)]
pub struct AliasCatalog {
	entries: Vec<InstanceMetadataEntry>,
}
impl AliasCatalog {
	/// The catalog shipped with the crate.
	pub fn bundled() -> &'static AliasCatalog {
		static CATALOG: OnceLock<AliasCatalog> = OnceLock::new();

		CATALOG.get_or_init(|| AliasCatalog {
			entries: vec![
				entry(
					"login.microsoftonline.com",
					"login.windows.net",
					&[
						"login.microsoftonline.com",
						"login.windows.net",
						"login.microsoft.com",
						"sts.windows.net",
					],
				),
				entry(
					"login.partner.microsoftonline.cn",
					"login.partner.microsoftonline.cn",
					&["login.partner.microsoftonline.cn", "login.chinacloudapi.cn"],
				),
				entry("login.microsoftonline.de", "login.microsoftonline.de", &["login.microsoftonline.de"]),
				entry(
					"login.microsoftonline.us",
					"login.microsoftonline.us",
					&["login.microsoftonline.us", "login.usgovcloudapi.net"],
				),
				entry(
					"login-us.microsoftonline.com",
					"login-us.microsoftonline.com",
					&["login-us.microsoftonline.com"],
				),
				entry(
					"login.windows-ppe.net",
					"login.windows-ppe.net",
					&["login.windows-ppe.net", "sts.windows-ppe.net", "login.microsoft-ppe.com"],
				),
			],
		})
	}

	/// Entry whose aliases include `host`.
	pub fn lookup(&self, host: &str) -> Option<&InstanceMetadataEntry> {
		self.entries.iter().find(|entry| entry.contains_alias(host))
	}

	/// True if `host` belongs to any bundled cloud.
	pub fn contains(&self, host: &str) -> bool {
		self.lookup(host).is_some()
	}
}

fn entry(network: &str, cache: &str, aliases: &[&str]) -> InstanceMetadataEntry {
	InstanceMetadataEntry {
		preferred_network: network.to_owned(),
		preferred_cache: cache.to_owned(),
		aliases: aliases.iter().map(|alias| (*alias).to_owned()).collect(),
	}
}
