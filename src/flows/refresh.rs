//! Single-flight refresh grant and the token store's late-bound refresher.
//!
//! Every refresh path (explicit [`OidcClient::refresh`], the proactive timer, and
//! [`TokenStore::force_refresh`](crate::store::TokenStore::force_refresh) triggered by the
//! gateway) funnels into one shared in-flight future, so concurrent callers observe the same
//! outcome and the provider sees at most one `grant_type=refresh_token` call at a time.
//! Results are dropped if the session was discarded (logout or reset) while the grant ran.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::Ordering;
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	error::ConfigError,
	flows::{OidcClient, OidcEvent, OidcInner, OidcState, common},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::GrantType,
	store::{RefreshCallback, RefreshFuture},
};

pub(crate) type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, Arc<Error>>>>;

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges the held refresh token for a new pair, joining a refresh already in flight.
	///
	/// On failure the session is cleared, [`OidcEvent::TokenExpired`] is emitted, and the
	/// error is reported as [`Error::TokenRefresh`].
	pub async fn refresh(&self) -> Result<TokenPair> {
		self.inner.refresh_shared().await.map_err(|e| refresh_error(&e))
	}
}

impl<C, M> OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn refresh_shared(self: &Arc<Self>) -> SharedRefresh {
		let mut in_flight = self.in_flight.lock();

		if let Some(shared) = in_flight.as_ref() {
			log_debug!("Joining in-flight token refresh.");

			return shared.clone();
		}

		let inner = Arc::clone(self);
		let shared = async move {
			let result = inner.run_refresh().await.map_err(Arc::new);

			*inner.in_flight.lock() = None;

			result
		}
		.boxed()
		.shared();

		*in_flight = Some(shared.clone());

		shared
	}

	/// Stores a freshly issued pair and re-arms the proactive refresh.
	pub(crate) fn adopt_tokens(self: &Arc<Self>, pair: &TokenPair) -> Result<()> {
		self.tokens.store(pair.clone())?;
		self.schedule_refresh(pair.expires_at);

		Ok(())
	}

	async fn run_refresh(self: &Arc<Self>) -> Result<TokenPair> {
		obs::observe(FlowKind::Refresh, "refresh", async {
			let epoch = self.current_epoch();

			self.refresh_metrics.record_attempt();
			self.transition(OidcState::Refreshing);

			match self.exchange_refresh_token().await {
				Ok(pair) if self.current_epoch() == epoch => {
					if let Err(e) = self.adopt_tokens(&pair) {
						self.refresh_metrics.record_failure();
						self.expire_session();

						return Err(e);
					}

					self.refresh_metrics.record_success();
					self.transition(OidcState::Authenticated);
					self.events.emit(&OidcEvent::TokenRefreshed { expires_at: pair.expires_at });

					log_info!(expires_at = %pair.expires_at, "Token pair refreshed.");

					Ok(pair)
				},
				Ok(_) => {
					self.refresh_metrics.record_failure();

					log_info!("Session ended while refreshing; discarding the refreshed pair.");

					Err(Error::TokenRefresh { reason: "session ended during refresh".into() })
				},
				Err(e) => {
					self.refresh_metrics.record_failure();

					log_warn!(error = %e, "Token refresh failed; clearing the session.");

					if self.current_epoch() == epoch {
						self.expire_session();
					}

					Err(e)
				},
			}
		})
		.await
	}

	async fn exchange_refresh_token(&self) -> Result<TokenPair> {
		common::ensure_grant_supported(&self.descriptor, GrantType::RefreshToken)?;

		let previous = self.tokens.snapshot();
		let secret = previous
			.as_ref()
			.and_then(|pair| pair.refresh_token.clone())
			.ok_or(ConfigError::MissingRefreshToken)?;
		let facade = self.facade()?;
		let mut pair = facade.refresh_token(self.strategy.as_ref(), &secret, &self.scope).await?;

		// Rotation is optional; omitted tokens stay valid.
		pair.refresh_token = pair.refresh_token.or(Some(secret));
		pair.id_token = pair.id_token.or_else(|| previous.and_then(|pair| pair.id_token));

		Ok(pair)
	}

	fn expire_session(&self) {
		self.epoch.fetch_add(1, Ordering::SeqCst);
		self.scheduler.cancel();
		self.tokens.clear();
		self.transition(OidcState::Unauthenticated);
		self.events.emit(&OidcEvent::TokenExpired);
	}
}

/// Registered on the [`TokenStore`](crate::store::TokenStore) so storage-level refreshes reuse
/// the client's single-flight grant.
pub(crate) struct ClientRefresher<C, M>(pub(crate) Weak<OidcInner<C, M>>)
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>;
impl<C, M> RefreshCallback for ClientRefresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh(&self) -> RefreshFuture<'_> {
		let inner = self.0.upgrade();

		Box::pin(async move {
			let inner = inner.ok_or(Error::TokenUnavailable)?;

			inner.refresh_shared().await.map_err(|e| refresh_error(&e))
		})
	}
}

fn refresh_error(err: &Error) -> Error {
	match err {
		Error::TokenRefresh { reason } => Error::TokenRefresh { reason: reason.clone() },
		other => Error::TokenRefresh { reason: other.to_string().trim_end_matches('.').to_owned() },
	}
}
