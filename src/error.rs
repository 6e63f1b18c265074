//! Session-level error types shared across flows, the gateway, stores, and session state.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Tenant-scope or role check denied the action.
	#[error(transparent)]
	TenantAccess(#[from] crate::session::TenantAccessError),
	/// Provider unreachable or misconfigured while initializing the session.
	#[error("Authentication is unavailable: {reason}.")]
	AuthInit {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Action attempted without an authenticated session; a fresh login is required.
	#[error("Login is required: {reason}.")]
	LoginRequired {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Refresh grant failed; the session was cleared and a fresh login is required.
	#[error("Token refresh failed: {reason}.")]
	TokenRefresh {
		/// Human-readable failure summary.
		reason: String,
	},
	/// No usable access token is held and none could be obtained.
	#[error("No valid access token is available.")]
	TokenUnavailable,
	/// Profile fetch failed after a successful token exchange.
	#[error("Profile could not be loaded: {reason}.")]
	ProfileLoad {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Backend API answered with a non-retryable error status.
	#[error("API request failed with status {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Body preview or reason phrase.
		message: String,
	},
	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the caller should send the user through a fresh login.
	pub fn requires_login(&self) -> bool {
		matches!(
			self,
			Self::LoginRequired { .. }
				| Self::TokenRefresh { .. }
				| Self::TokenUnavailable
				| Self::InvalidGrant { .. }
				| Self::Api { status: 401, .. }
		)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// A configuration value is missing.
	#[error("Configuration value `{key}` is missing.")]
	MissingValue {
		/// Configuration key.
		key: &'static str,
	},
	/// A configuration value cannot be parsed.
	#[error("Configuration value `{key}` is invalid: {reason}.")]
	InvalidValue {
		/// Configuration key.
		key: &'static str,
		/// Parse failure summary.
		reason: String,
	},
	/// An API path could not be joined onto the base URL.
	#[error("API path `{path}` cannot be joined onto the base URL.")]
	InvalidApiPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An API path resolved to a URL outside the gateway's base origin.
	#[error("API path `{path}` resolves outside the base URL's origin.")]
	ForeignApiUrl {
		/// Offending path.
		path: String,
	},
	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Descriptor does not declare an end-session endpoint.
	#[error("Descriptor `{descriptor}` does not declare an end-session endpoint.")]
	MissingEndSessionEndpoint {
		/// Provider identifier string.
		descriptor: String,
	},
	/// Held token pair is missing a refresh secret.
	#[error("Held token pair is missing a refresh token.")]
	MissingRefreshToken,
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier validation failed.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Token pair builder validation failed.
	#[error("Unable to build token pair.")]
	TokenBuild(#[from] crate::auth::TokenPairBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Backend API kept failing with a server error after every retry attempt.
	#[error("API kept failing with status {status} after {attempts} attempts.")]
	Upstream {
		/// Last HTTP status code observed.
		status: u16,
		/// Number of attempts performed.
		attempts: u32,
		/// Retry-After hint from the last response, if supplied.
		retry_after: Option<Duration>,
	},
	/// Backend API responded with JSON that does not match the expected shape.
	#[error("API response could not be decoded.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Logical target of the call (token endpoint, API, ...).
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error raised against the token endpoint.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { target: "the token endpoint", source: Box::new(src) }
	}

	/// Wraps a transport-specific network error raised against an arbitrary target.
	pub fn network_to(
		target: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target, source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
