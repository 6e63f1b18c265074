//! Deployment configuration for the session core.
//!
//! [`SessionConfig`] deserializes from any serde source (missing tuning values fall back to
//! defaults) or from environment-style key lookups via [`SessionConfig::from_env`]. The
//! provider descriptor is derived from a Keycloak base URL and realm.

// self
use crate::{
	_prelude::*,
	auth::{OPENID_SCOPE, ProviderId, ScopeSet},
	error::ConfigError,
	flows::RefreshPolicy,
	provider::{ProviderDescriptor, ProviderDescriptorBuilder},
	session::AccessPolicy,
};
#[cfg(feature = "reqwest")] use crate::gateway::{HttpGateway, RetryPolicy};

const KEYCLOAK_PROVIDER_ID: &str = "keycloak";

/// Settings shared by the OIDC client, the gateway, and the session state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Keycloak base URL, e.g. `https://id.example.com`.
	pub provider_url: Url,
	/// Realm hosting the console's client.
	pub realm: String,
	/// Public client identifier.
	pub client_id: String,
	/// Redirect URI registered for the login callback.
	pub redirect_uri: Url,
	/// Base URL of the backend API.
	pub api_base_url: Url,
	/// Redirect URI of the silent-check page; silent SSO is off when unset.
	#[serde(default)]
	pub silent_check_uri: Option<Url>,
	/// Where the provider sends the user after logout.
	#[serde(default)]
	pub post_logout_redirect_uri: Option<Url>,
	/// Requested scopes.
	#[serde(default = "default_scopes")]
	pub scopes: Vec<String>,
	/// Role that may act on every tenant.
	#[serde(default = "default_platform_admin_role")]
	pub platform_admin_role: String,
	/// Header carrying the selected tenant on API requests.
	#[serde(default = "default_tenant_header")]
	pub tenant_header: String,
	/// Current-user endpoint; the profile is read from token claims when unset.
	#[serde(default)]
	pub profile_path: Option<String>,
	/// How long before expiry the proactive refresh fires.
	#[serde(default = "default_refresh_lead_secs")]
	pub refresh_lead_secs: u32,
	/// Lower bound on the proactive refresh delay.
	#[serde(default = "default_refresh_min_delay_secs")]
	pub refresh_min_delay_secs: u32,
	/// Margin before expiry inside which an access token is refreshed on use.
	#[serde(default = "default_token_safety_margin_secs")]
	pub token_safety_margin_secs: u32,
	/// Silent-check timeout.
	#[serde(default = "default_silent_check_timeout_ms")]
	pub silent_check_timeout_ms: u32,
	/// Lifetime of an unfinished login attempt.
	#[serde(default = "default_pkce_ttl_secs")]
	pub pkce_ttl_secs: u32,
	/// Retries after a 5xx response or network failure.
	#[serde(default = "default_retry_attempts")]
	pub retry_attempts: u32,
	/// First retry delay; doubles per retry.
	#[serde(default = "default_retry_base_delay_ms")]
	pub retry_base_delay_ms: u32,
	/// Per-request timeout of the default HTTP client.
	#[serde(default = "default_http_timeout_secs")]
	pub http_timeout_secs: u32,
}
impl SessionConfig {
	/// Reads the configuration from process environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Reads the configuration through `lookup`, using the environment variable names.
	///
	/// Required: `OIDC_PROVIDER_URL`, `OIDC_REALM`, `OIDC_CLIENT_ID`, `OIDC_REDIRECT_URI`,
	/// `API_BASE_URL`. Optional: `OIDC_SILENT_CHECK_URI`, `OIDC_POST_LOGOUT_REDIRECT_URI`,
	/// `OIDC_SCOPES` (space or comma separated), `OIDC_PLATFORM_ADMIN_ROLE`,
	/// `API_TENANT_HEADER`, `API_PROFILE_PATH`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let value = |key: &'static str| {
			lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
		};
		let required = |key: &'static str| value(key).ok_or(ConfigError::MissingValue { key });
		let url = |key: &'static str, raw: String| {
			Url::parse(&raw).map_err(|e| ConfigError::InvalidValue { key, reason: e.to_string() })
		};
		let optional_url = |key: &'static str| value(key).map(|raw| url(key, raw)).transpose();

		Ok(Self {
			provider_url: url("OIDC_PROVIDER_URL", required("OIDC_PROVIDER_URL")?)?,
			realm: required("OIDC_REALM")?,
			client_id: required("OIDC_CLIENT_ID")?,
			redirect_uri: url("OIDC_REDIRECT_URI", required("OIDC_REDIRECT_URI")?)?,
			api_base_url: url("API_BASE_URL", required("API_BASE_URL")?)?,
			silent_check_uri: optional_url("OIDC_SILENT_CHECK_URI")?,
			post_logout_redirect_uri: optional_url("OIDC_POST_LOGOUT_REDIRECT_URI")?,
			scopes: value("OIDC_SCOPES")
				.map(|raw| {
					raw.split([' ', ',']).filter(|s| !s.is_empty()).map(str::to_owned).collect()
				})
				.unwrap_or_else(default_scopes),
			platform_admin_role: value("OIDC_PLATFORM_ADMIN_ROLE")
				.unwrap_or_else(default_platform_admin_role),
			tenant_header: value("API_TENANT_HEADER").unwrap_or_else(default_tenant_header),
			profile_path: value("API_PROFILE_PATH"),
			refresh_lead_secs: default_refresh_lead_secs(),
			refresh_min_delay_secs: default_refresh_min_delay_secs(),
			token_safety_margin_secs: default_token_safety_margin_secs(),
			silent_check_timeout_ms: default_silent_check_timeout_ms(),
			pkce_ttl_secs: default_pkce_ttl_secs(),
			retry_attempts: default_retry_attempts(),
			retry_base_delay_ms: default_retry_base_delay_ms(),
			http_timeout_secs: default_http_timeout_secs(),
		})
	}

	/// Derives the Keycloak provider descriptor for the configured realm.
	pub fn descriptor(&self) -> Result<ProviderDescriptor> {
		let id = ProviderId::new(KEYCLOAK_PROVIDER_ID).map_err(ConfigError::from)?;
		let descriptor =
			ProviderDescriptorBuilder::keycloak_realm(id, &self.provider_url, &self.realm)
				.and_then(ProviderDescriptorBuilder::build)
				.map_err(ConfigError::from)?;

		Ok(descriptor)
	}

	/// Requested scopes; `openid` is always included.
	pub fn scope(&self) -> Result<ScopeSet> {
		let scope = ScopeSet::new(self.scopes.iter().map(String::as_str).chain([OPENID_SCOPE]))
			.map_err(ConfigError::from)?;

		Ok(scope)
	}

	/// Authorization policy for the configured platform-admin role.
	pub fn access_policy(&self) -> Result<AccessPolicy> {
		AccessPolicy::new(&self.platform_admin_role)
	}

	/// Proactive refresh timing.
	pub fn refresh_policy(&self) -> RefreshPolicy {
		RefreshPolicy::new(
			Duration::seconds(i64::from(self.refresh_lead_secs)),
			Duration::seconds(i64::from(self.refresh_min_delay_secs)),
		)
	}

	/// Token safety margin.
	pub fn token_safety_margin(&self) -> Duration {
		Duration::seconds(i64::from(self.token_safety_margin_secs))
	}

	/// Silent-check timeout.
	pub fn silent_check_timeout(&self) -> Duration {
		Duration::milliseconds(i64::from(self.silent_check_timeout_ms))
	}

	/// Lifetime of an unfinished login attempt.
	pub fn pkce_ttl(&self) -> Duration {
		Duration::seconds(i64::from(self.pkce_ttl_secs))
	}

	/// Per-request timeout of the default HTTP client.
	pub fn http_timeout(&self) -> Duration {
		Duration::seconds(i64::from(self.http_timeout_secs))
	}

	/// Gateway retry policy.
	#[cfg(feature = "reqwest")]
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(
			self.retry_attempts,
			Duration::milliseconds(i64::from(self.retry_base_delay_ms)),
		)
	}
}

fn default_scopes() -> Vec<String> {
	["openid", "profile", "email"].into_iter().map(str::to_owned).collect()
}

fn default_platform_admin_role() -> String {
	AccessPolicy::DEFAULT_PLATFORM_ADMIN_ROLE.to_owned()
}

#[cfg(feature = "reqwest")]
fn default_tenant_header() -> String {
	HttpGateway::DEFAULT_TENANT_HEADER.to_owned()
}

#[cfg(not(feature = "reqwest"))]
fn default_tenant_header() -> String {
	"X-Store-ID".to_owned()
}

fn default_refresh_lead_secs() -> u32 {
	300
}

fn default_refresh_min_delay_secs() -> u32 {
	30
}

fn default_token_safety_margin_secs() -> u32 {
	30
}

fn default_silent_check_timeout_ms() -> u32 {
	5_000
}

fn default_pkce_ttl_secs() -> u32 {
	600
}

fn default_retry_attempts() -> u32 {
	3
}

fn default_retry_base_delay_ms() -> u32 {
	250
}

fn default_http_timeout_secs() -> u32 {
	30
}
