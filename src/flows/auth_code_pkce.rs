//! Authorization Code + PKCE login: authorize redirect, callback validation, and code exchange.
//!
//! [`OidcClient::login`] stores a fresh [`PendingAuthorization`] in the configured
//! [`PkceStore`](crate::store::PkceStore) and navigates to the authorize URL. The redirect
//! handler hands the returned `code` and `state` to [`OidcClient::handle_callback`] (or the raw
//! redirect URL to [`OidcClient::handle_callback_url`]), which consumes the pending attempt and
//! only contacts the token endpoint when the `state` matches an unexpired attempt.

mod session;

pub use session::*;

// std
use std::borrow::Cow;
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	flows::{OidcClient, OidcEvent, OidcInner, OidcState},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Parameters carried by an authorization redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Echoed `state`.
	pub state: Option<String>,
	/// OAuth error code reported by the provider.
	pub error: Option<String>,
	/// Human-readable error detail reported by the provider.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Parses the redirect query, falling back to the fragment for `response_mode=fragment`.
	pub fn from_url(url: &Url) -> Self {
		let params = Self::from_pairs(url.query_pairs());

		if !params.is_empty() {
			return params;
		}

		url.fragment()
			.map(|fragment| Self::from_pairs(url::form_urlencoded::parse(fragment.as_bytes())))
			.unwrap_or(params)
	}

	/// Returns `true` when none of the recognised parameters are present.
	pub fn is_empty(&self) -> bool {
		self.code.is_none()
			&& self.state.is_none()
			&& self.error.is_none()
			&& self.error_description.is_none()
	}

	pub(crate) fn provider_error(&self) -> Option<String> {
		let error = self.error.as_deref()?;

		Some(match self.error_description.as_deref() {
			Some(description) => format!("{error}: {description}"),
			None => error.to_owned(),
		})
	}

	fn from_pairs<'a, I>(pairs: I) -> Self
	where
		I: Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
	{
		let mut params = Self::default();

		for (key, value) in pairs {
			let slot = match key.as_ref() {
				"code" => &mut params.code,
				"state" => &mut params.state,
				"error" => &mut params.error,
				"error_description" => &mut params.error_description,
				_ => continue,
			};

			*slot = Some(value.into_owned());
		}

		params
	}
}

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts an interactive login and navigates the user agent to the authorize URL.
	///
	/// Any unfinished attempt is replaced. Returns the URL that was navigated to.
	pub fn login(&self, redirect_uri: &Url) -> Result<Url> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let _span = FlowSpan::new(KIND, "login").entered();
		let inner = &self.inner;
		let pending = build_pending(AuthorizeParams {
			descriptor: &inner.descriptor,
			strategy: inner.strategy.as_ref(),
			client_id: &inner.client_id,
			scope: &inner.scope,
			redirect_uri: redirect_uri.clone(),
			prompt: None,
		});
		let url = pending.authorize_url.clone();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		inner.pkce.put(pending)?;
		inner.navigator.navigate(&url)?;

		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		log_info!(redirect_uri = %redirect_uri, "Redirecting to the authorization endpoint.");

		Ok(url)
	}

	/// Completes a login with the `code` and `state` returned on the redirect.
	///
	/// Fails with [`Error::LoginRequired`] without contacting the provider when no unexpired
	/// attempt matches `state`.
	pub async fn handle_callback(&self, code: &str, state: &str) -> Result<TokenPair> {
		let inner = &self.inner;

		obs::observe(FlowKind::AuthorizationCode, "handle_callback", async {
			let epoch = inner.current_epoch();
			let result = match inner.pkce.take(state) {
				Ok(Some(pending)) => inner.redeem_code(&pending, code).await,
				Ok(None) => Err(Error::LoginRequired {
					reason: "no pending login attempt matches the returned state".into(),
				}),
				Err(e) => Err(e.into()),
			};

			match result {
				Ok(pair) => {
					inner.transition(OidcState::Authenticated);
					inner.events.emit(&OidcEvent::Authenticated);

					log_info!(expires_at = %pair.expires_at, "Login completed.");

					Ok(pair)
				},
				Err(e) => {
					// A logout that raced the exchange already settled the client state.
					if inner.current_epoch() == epoch {
						inner.fail_login(&e);
					}

					Err(e)
				},
			}
		})
		.await
	}

	/// Completes a login from the full redirect URL.
	///
	/// Provider-reported errors (for example `access_denied`) surface as
	/// [`Error::LoginRequired`] and discard the pending attempt.
	pub async fn handle_callback_url(&self, url: &Url) -> Result<TokenPair> {
		let params = CallbackParams::from_url(url);

		if let Some(reason) = params.provider_error() {
			let err = Error::LoginRequired { reason };

			self.inner.pkce.clear();
			self.inner.fail_login(&err);

			return Err(err);
		}

		match (params.code, params.state) {
			(Some(code), Some(state)) => self.handle_callback(&code, &state).await,
			_ => {
				let err = Error::LoginRequired {
					reason: "redirect is missing the code or state parameter".into(),
				};

				self.inner.fail_login(&err);

				Err(err)
			},
		}
	}
}

impl<C, M> OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges `code` for a token pair and hydrates the token store.
	///
	/// The pair is dropped when the session was discarded while the exchange was in flight.
	pub(crate) async fn redeem_code(
		self: &Arc<Self>,
		pending: &PendingAuthorization,
		code: &str,
	) -> Result<TokenPair> {
		let epoch = self.current_epoch();
		let facade = self.facade()?;
		let pair = facade
			.exchange_authorization_code(
				self.strategy.as_ref(),
				code,
				pending.code_verifier(),
				&pending.scope,
				&pending.redirect_uri,
			)
			.await?;

		if self.current_epoch() != epoch {
			log_info!("Session ended while redeeming the code; discarding the token pair.");

			return Err(Error::LoginRequired { reason: "session ended during login".into() });
		}
		if let Some(id_token) = pair.id_token.as_ref() {
			pending.validate_nonce(id_token)?;
		}

		self.adopt_tokens(&pair)?;

		Ok(pair)
	}

	fn fail_login(&self, err: &Error) {
		log_warn!(error = %err, "Login failed.");

		if !self.tokens.has_valid_token() {
			self.transition(OidcState::Unauthenticated);
		}

		self.events.emit(&OidcEvent::error(err));
	}
}
