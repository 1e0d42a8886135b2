//! Cache-level error types shared across the engine, codecs, and discovery.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical cache error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// A persisted blob could not be decoded or encoded.
	#[error(transparent)]
	Cache(#[from] CacheError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Instance discovery failed; never retried here.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// External storage used by a persistence hook failed.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),

	/// More than one cached access token satisfies the request.
	#[error("{count} cached access tokens match the request; narrow the authority or account.")]
	MultipleTokensMatched {
		/// Number of candidates left after every filter ran.
		count: usize,
	},
	/// The caller's cancellation signal fired before the operation finished.
	#[error("Cache operation was cancelled.")]
	Cancelled,
	/// A notification hook called back into the cache it is serving.
	#[error("Token cache was accessed from within its own notification.")]
	ReentrantAccess,
	/// A notification hook reported a failure.
	#[error("Token cache notification failed.")]
	Notification {
		/// Hook-supplied failure.
		#[source]
		source: BoxError,
	},
}
impl Error {
	/// Wraps a hook-specific failure inside [`Error::Notification`].
	pub fn notification(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Notification { source: Box::new(src) }
	}
}

/// Failures raised while encoding or decoding a cache blob.
#[derive(Debug, ThisError)]
pub enum CacheError {
	/// The blob is not valid for the declared format.
	#[error("Cache blob is not valid {format} data.")]
	Malformed {
		/// Format label (`json`, `dictionary`, `legacy`).
		format: &'static str,
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The blob parsed but belongs to another format.
	#[error("Cache blob is not in the {format} format: {reason}.")]
	WrongFormat {
		/// Format label the caller asked for.
		format: &'static str,
		/// What gave the payload away.
		reason: String,
	},
	/// Records could not be encoded.
	#[error("Failed to serialize the {format} cache: {message}.")]
	Serialization {
		/// Format label.
		format: &'static str,
		/// Encoder message.
		message: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Authority URL cannot be parsed.
	#[error("Authority URL is invalid.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authority URL parsed but has an unsupported shape.
	#[error("Authority `{authority}` is not supported: {reason}.")]
	UnsupportedAuthority {
		/// Offending authority string.
		authority: String,
		/// Why it was rejected.
		reason: &'static str,
	},
	/// Identifier failed validation.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// ID token in a token response cannot be decoded.
	#[error("ID token is malformed: {reason}.")]
	InvalidIdToken {
		/// Decoding failure summary.
		reason: String,
	},
	/// Client info in a token response cannot be decoded.
	#[error("Client info is malformed: {reason}.")]
	InvalidClientInfo {
		/// Decoding failure summary.
		reason: String,
	},
}

/// Instance discovery failures surfaced by network clients.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the instance discovery endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Discovery endpoint answered with a non-success status.
	#[error("Instance discovery endpoint returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, when readable.
		body: Option<String>,
	},
	/// Discovery endpoint returned a payload that cannot be parsed.
	#[error("Instance discovery endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Discovery payload omitted the `metadata` section.
	#[error("Instance discovery response carries no metadata for `{host}`.")]
	MissingMetadata {
		/// Host that was being resolved.
		host: String,
	},
	/// Discovery URL cannot be built for the authority.
	#[error("Instance discovery URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl DiscoveryError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for DiscoveryError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, ThisError)]
	#[error("disk quota exceeded")]
	struct QuotaError;

	#[test]
	fn notification_error_exposes_hook_source() {
		let err = Error::notification(QuotaError);

		assert!(matches!(err, Error::Notification { .. }));
		assert_eq!(err.to_string(), "Token cache notification failed.");

		let source =
			StdError::source(&err).expect("Notification error should expose the hook failure.");

		assert_eq!(source.to_string(), "disk quota exceeded");
	}

	#[test]
	fn discovery_error_converts_into_cache_error() {
		let err: Error =
			DiscoveryError::Status { status: 503, body: Some("busy".into()) }.into();

		assert!(matches!(err, Error::Discovery(DiscoveryError::Status { status: 503, .. })));
		assert!(err.to_string().contains("503"));
	}
}
