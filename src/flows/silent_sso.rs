//! Session bootstrap: stored-token reuse and the silent-SSO probe.
//!
//! The probe loads an authorize URL with `prompt=none` in a hidden frame supplied by the host
//! ([`SilentCheckFrame`]). The frame resolves with the URL its silent-check page was redirected
//! to. Only a message carrying the request's correlation id and posted from a trusted origin
//! (the silent-check page or the provider) is accepted.

// std
use std::time::Duration as StdDuration;
// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	flows::{
		AuthorizeParams, CallbackParams, OidcClient, OidcEvent, OidcInner, OidcState,
		build_pending,
	},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
};

/// Boxed future returned by [`SilentCheckFrame::load`].
pub type SilentCheckFuture<'a> =
	Pin<Box<dyn Future<Output = Result<SilentCheckMessage>> + 'a + Send>>;

/// Request handed to the hidden frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SilentCheckRequest {
	/// Identifier the frame must echo back in its message.
	pub correlation_id: Uuid,
	/// Authorize URL (with `prompt=none`) to load.
	pub url: Url,
}

/// Message posted back by the silent-check page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SilentCheckMessage {
	/// Correlation id copied from the request.
	pub correlation_id: Uuid,
	/// ASCII origin of the poster.
	pub origin: String,
	/// URL the silent-check page was redirected to, carrying `code`/`state` or `error`.
	pub callback_url: Url,
}

/// Host boundary that loads a URL in a hidden frame and waits for its message.
pub trait SilentCheckFrame
where
	Self: Send + Sync,
{
	/// Loads `request.url` and resolves with the message the silent-check page posted.
	fn load(&self, request: SilentCheckRequest) -> SilentCheckFuture<'_>;
}

/// Silent-SSO configuration.
#[derive(Clone)]
pub struct SilentCheck {
	frame: Arc<dyn SilentCheckFrame>,
	redirect_uri: Url,
	timeout: Duration,
}
impl SilentCheck {
	/// How long `init` waits for the frame when no timeout is configured.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(5);

	/// Creates a probe that redirects to `redirect_uri` (the silent-check page).
	pub fn new(frame: Arc<dyn SilentCheckFrame>, redirect_uri: Url) -> Self {
		Self { frame, redirect_uri, timeout: Self::DEFAULT_TIMEOUT }
	}

	/// Overrides the timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Silent-check page URI.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// Timeout applied to the frame.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	fn std_timeout(&self) -> StdDuration {
		StdDuration::try_from(self.timeout).unwrap_or(StdDuration::ZERO)
	}
}
impl Debug for SilentCheck {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentCheck")
			.field("redirect_uri", &self.redirect_uri)
			.field("timeout", &self.timeout)
			.finish()
	}
}

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Detects an existing session; returns whether the client ended up authenticated.
	///
	/// A still-valid stored token wins. Otherwise the silent-SSO probe runs when configured.
	/// Probe failures (frame error, timeout, untrusted origin, unexpected provider error, or a
	/// failed exchange) are reported as [`Error::AuthInit`] and are not retried.
	pub async fn init(&self) -> Result<bool> {
		let inner = &self.inner;

		obs::observe(FlowKind::Init, "init", async {
			inner.transition(OidcState::Initializing);

			let now = OffsetDateTime::now_utc();

			if let Some(pair) = inner.tokens.snapshot().filter(|pair| !pair.is_expired_at(now)) {
				log_debug!("Reusing the stored token pair.");

				inner.schedule_refresh(pair.expires_at);

				return Ok(inner.finish_init(true));
			}

			let outcome = match &inner.silent_check {
				Some(check) if inner.descriptor.quirks.supports_prompt_none =>
					inner.silent_sso(check).await,
				_ => Ok(None),
			};

			match outcome {
				Ok(found) => Ok(inner.finish_init(found.is_some())),
				Err(e) => {
					log_warn!(error = %e, "Session initialization failed.");

					inner.transition(OidcState::Unauthenticated);
					inner.events.emit(&OidcEvent::error(&e));

					Err(e)
				},
			}
		})
		.await
	}
}

impl<C, M> OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	async fn silent_sso(self: &Arc<Self>, check: &SilentCheck) -> Result<Option<TokenPair>> {
		let pending = build_pending(AuthorizeParams {
			descriptor: &self.descriptor,
			strategy: self.strategy.as_ref(),
			client_id: &self.client_id,
			scope: &self.scope,
			redirect_uri: check.redirect_uri.clone(),
			prompt: Some("none"),
		});
		let correlation_id = Uuid::new_v4();
		let request = SilentCheckRequest { correlation_id, url: pending.authorize_url.clone() };

		log_debug!(%correlation_id, "Starting silent SSO check.");

		let message = match tokio::time::timeout(check.std_timeout(), check.frame.load(request))
			.await
		{
			Ok(Ok(message)) => message,
			Ok(Err(e)) => return Err(auth_init(format!("silent check frame failed: {e}"))),
			Err(_) => return Err(auth_init("silent check timed out")),
		};

		if message.correlation_id != correlation_id {
			return Err(auth_init("silent check response does not match the request"));
		}

		let trusted =
			[check.redirect_uri.origin().ascii_serialization(), self.descriptor.provider_origin()];

		if !trusted.contains(&message.origin) {
			return Err(auth_init(format!(
				"silent check message came from an untrusted origin {}",
				message.origin
			)));
		}

		let params = CallbackParams::from_url(&message.callback_url);

		if let Some(error) = params.error.as_deref() {
			if self.strategy.is_session_absent(error) {
				log_debug!(error, "No provider session found.");

				return Ok(None);
			}

			let reason = params.provider_error().unwrap_or_else(|| error.to_owned());

			return Err(auth_init(format!("provider rejected the silent check: {reason}")));
		}

		let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
			return Err(auth_init("silent check response is missing the code or state"));
		};

		pending.validate_state(state).map_err(|_| auth_init("silent check state mismatch"))?;

		let pair = self.redeem_code(&pending, code).await.map_err(|e| {
			let reason = e.to_string();
			let reason = reason.trim_end_matches('.');

			auth_init(format!("silent check code exchange failed: {reason}"))
		})?;

		Ok(Some(pair))
	}

	fn finish_init(&self, authenticated: bool) -> bool {
		if authenticated {
			self.transition(OidcState::Authenticated);
		} else {
			self.transition(OidcState::Unauthenticated);
		}

		let settled =
			if authenticated { OidcEvent::Authenticated } else { OidcEvent::Unauthenticated };

		self.events.emit(&OidcEvent::Initialized { authenticated });
		self.events.emit(&settled);

		log_info!(authenticated, "Session initialized.");

		authenticated
	}
}

fn auth_init(reason: impl Into<String>) -> Error {
	Error::AuthInit { reason: reason.into() }
}
