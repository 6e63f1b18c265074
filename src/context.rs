//! Explicitly constructed application root wiring the token store, OIDC client, gateway, and
//! session state from one [`SessionConfig`].
//!
//! Nothing here is global: each [`AppContext`] owns its own components, so several contexts
//! (for instance one per test) coexist without sharing tokens or timers.

// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	error::ConfigError,
	flows::{Navigator, ReqwestOidcClient, SilentCheck, SilentCheckFrame},
	gateway::{ApiRequest, ApiResponse, HttpGateway},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	session::{
		ClaimsProfileSource, EndpointProfileSource, ProfileSource, ReqwestSessionState,
		SessionState,
	},
	store::{MemoryPkceStore, MemoryPreferenceStore, PkceStore, PreferenceStore, TokenStore},
};

/// Owns every session component of one application instance.
pub struct AppContext {
	config: SessionConfig,
	tokens: Arc<TokenStore>,
	oidc: ReqwestOidcClient,
	gateway: HttpGateway,
	session: ReqwestSessionState,
}
impl AppContext {
	/// Starts a builder for `config`.
	pub fn builder(config: SessionConfig) -> AppContextBuilder {
		AppContextBuilder::new(config)
	}

	/// Configuration the context was built from.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Token store shared by the client and the gateway.
	pub fn tokens(&self) -> &Arc<TokenStore> {
		&self.tokens
	}

	/// OIDC client.
	pub fn oidc(&self) -> &ReqwestOidcClient {
		&self.oidc
	}

	/// Backend API gateway.
	pub fn gateway(&self) -> &HttpGateway {
		&self.gateway
	}

	/// Session state.
	pub fn session(&self) -> &ReqwestSessionState {
		&self.session
	}

	/// Starts a login that returns to the configured redirect URI.
	pub async fn login(&self) -> Result<Url> {
		self.session.login(&self.config.redirect_uri).await
	}

	/// Signs out, sending the user to the configured post-logout URI when one is set.
	pub async fn logout(&self) -> Result<()> {
		self.session.logout(self.config.post_logout_redirect_uri.as_ref()).await
	}

	/// Sends `request`, scoping it to the selected tenant unless it names one already.
	pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		if request.tenant.is_none() && !request.skip_auth {
			request.tenant = self.session.selected_tenant();
		}

		self.gateway.send(request).await
	}
}
impl Debug for AppContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppContext")
			.field("oidc", &self.oidc)
			.field("gateway", &self.gateway)
			.field("session", &self.session)
			.finish()
	}
}

/// Builder for [`AppContext`]; every host integration point has an in-memory default.
pub struct AppContextBuilder {
	config: SessionConfig,
	http_client: Option<ReqwestHttpClient>,
	navigator: Option<Arc<dyn Navigator>>,
	silent_frame: Option<Arc<dyn SilentCheckFrame>>,
	pkce: Option<Arc<dyn PkceStore>>,
	preferences: Option<Arc<dyn PreferenceStore>>,
	profiles: Option<Arc<dyn ProfileSource>>,
}
impl AppContextBuilder {
	fn new(config: SessionConfig) -> Self {
		Self {
			config,
			http_client: None,
			navigator: None,
			silent_frame: None,
			pkce: None,
			preferences: None,
			profiles: None,
		}
	}

	/// Overrides the HTTP client shared by the OIDC client and the gateway.
	pub fn http_client(mut self, client: ReqwestHttpClient) -> Self {
		self.http_client = Some(client);

		self
	}

	/// Sets the user-agent redirect boundary.
	pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = Some(navigator);

		self
	}

	/// Sets the hidden frame that loads silent-check URLs; requires `silent_check_uri`.
	pub fn silent_frame(mut self, frame: Arc<dyn SilentCheckFrame>) -> Self {
		self.silent_frame = Some(frame);

		self
	}

	/// Overrides the PKCE attempt storage.
	pub fn pkce_store(mut self, store: Arc<dyn PkceStore>) -> Self {
		self.pkce = Some(store);

		self
	}

	/// Overrides the tenant preference storage.
	pub fn preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
		self.preferences = Some(store);

		self
	}

	/// Overrides the profile source chosen from `profile_path`.
	pub fn profile_source(mut self, source: Arc<dyn ProfileSource>) -> Self {
		self.profiles = Some(source);

		self
	}

	/// Validates the configuration and wires the components together.
	pub fn build(self) -> Result<AppContext> {
		let Self { config, http_client, navigator, silent_frame, pkce, preferences, profiles } =
			self;
		let descriptor = config.descriptor()?;
		let tokens = Arc::new(TokenStore::new(config.token_safety_margin()));
		let http_client = match http_client {
			Some(client) => client,
			None => ReqwestHttpClient::console(config.http_timeout())?,
		};
		let pkce = pkce.unwrap_or_else(|| Arc::new(MemoryPkceStore::with_ttl(config.pkce_ttl())));
		let mut oidc =
			ReqwestOidcClient::builder(descriptor, config.client_id.clone(), tokens.clone())
				.http_client(http_client.clone(), ReqwestTransportErrorMapper)
				.scope(config.scope()?)
				.refresh_policy(config.refresh_policy())
				.pkce_store(pkce);

		if let Some(navigator) = navigator {
			oidc = oidc.navigator(navigator);
		}

		match (silent_frame, config.silent_check_uri.clone()) {
			(Some(frame), Some(uri)) => {
				oidc = oidc.silent_check(
					SilentCheck::new(frame, uri).with_timeout(config.silent_check_timeout()),
				);
			},
			(Some(_), None) =>
				return Err(ConfigError::MissingValue { key: "silent_check_uri" }.into()),
			(None, Some(_)) => {
				log_warn!("Silent-check URI is configured without a frame; silent SSO is off.");
			},
			(None, None) => {},
		}

		let oidc = oidc.build()?;
		let gateway = HttpGateway::new(http_client, config.api_base_url.clone(), tokens.clone())
			.with_retry_policy(config.retry_policy())
			.with_tenant_header(&config.tenant_header)?;
		let profiles = match (profiles, config.profile_path.as_deref()) {
			(Some(profiles), _) => profiles,
			(None, Some(path)) => Arc::new(EndpointProfileSource::new(gateway.clone(), path)),
			(None, None) => Arc::new(ClaimsProfileSource::new(config.client_id.clone())),
		};
		let preferences =
			preferences.unwrap_or_else(|| Arc::new(MemoryPreferenceStore::default()));
		let session =
			SessionState::new(oidc.clone(), profiles, preferences, config.access_policy()?);

		log_info!(
			client_id = %config.client_id,
			api = %config.api_base_url,
			"Application context ready."
		);

		Ok(AppContext { config, tokens, oidc, gateway, session })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::test_reqwest_http_client, flows::OidcState, session::SessionStatus};

	fn config() -> SessionConfig {
		SessionConfig::from_lookup(|key| {
			let value = match key {
				"OIDC_PROVIDER_URL" => "https://id.example.com",
				"OIDC_REALM" => "shop",
				"OIDC_CLIENT_ID" => "console",
				"OIDC_REDIRECT_URI" => "https://admin.example.com/callback",
				"API_BASE_URL" => "https://api.example.com/v1",
				"API_TENANT_HEADER" => "X-Tenant",
				_ => return None,
			};

			Some(value.to_owned())
		})
		.expect("Config fixture should load.")
	}

	#[test]
	fn contexts_are_independent() {
		let first = AppContext::builder(config())
			.http_client(test_reqwest_http_client())
			.build()
			.expect("First context should build.");
		let second = AppContext::builder(config()).build().expect("Second context should build.");

		assert!(!Arc::ptr_eq(first.tokens(), second.tokens()));
		assert!(Arc::ptr_eq(first.tokens(), first.gateway().tokens()));
		assert_eq!(first.oidc().state(), OidcState::Uninitialized);
		assert_eq!(first.session().status(), SessionStatus::Idle);
		assert_eq!(first.gateway().base_url().as_str(), "https://api.example.com/v1/");
	}

	#[test]
	fn silent_frame_requires_a_silent_check_uri() {
		struct Frame;
		impl SilentCheckFrame for Frame {
			fn load(
				&self,
				_request: crate::flows::SilentCheckRequest,
			) -> crate::flows::SilentCheckFuture<'_> {
				Box::pin(async { Err(Error::AuthInit { reason: "unused".into() }) })
			}
		}

		let err = AppContext::builder(config())
			.silent_frame(Arc::new(Frame))
			.build()
			.expect_err("Frame without URI should be rejected.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::MissingValue { key: "silent_check_uri" })
		));
	}
}
