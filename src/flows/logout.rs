//! Logout: local teardown first, then the provider's end-session endpoint.

// self
use crate::{
	_prelude::*,
	flows::{OidcClient, OidcEvent, OidcState},
	http::TokenHttpClient,
	oauth::{EndSession, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
};

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Ends the session and optionally navigates to `redirect_uri`.
	///
	/// Tokens, the pending login attempt, and the refresh timer are discarded before any network
	/// call, and [`OidcEvent::Logout`] is emitted immediately. The end-session POST (`client_id`
	/// plus whichever of `refresh_token` and `id_token_hint` is held) runs afterwards; its
	/// failure is logged and returned while local state stays cleared.
	pub async fn logout(&self, redirect_uri: Option<&Url>) -> Result<()> {
		let inner = &self.inner;

		obs::observe(FlowKind::Logout, "logout", async {
			let held = inner.tokens.snapshot();
			let refresh_token = held.as_ref().and_then(|pair| pair.refresh_token.clone());
			let id_token = held.and_then(|pair| pair.id_token);

			inner.discard_session();
			inner.transition(OidcState::LoggedOut);
			inner.events.emit(&OidcEvent::Logout);

			log_info!("Local session cleared.");

			let mut outcome = Ok(());

			match &inner.descriptor.endpoints.end_session {
				Some(endpoint) if refresh_token.is_some() || id_token.is_some() => {
					let strategy = inner.strategy.as_ref();
					let request = EndSession {
						endpoint,
						refresh_token: refresh_token.as_ref(),
						id_token: id_token.as_ref(),
					};
					let notified = match inner.facade() {
						Ok(facade) => facade.end_session(strategy, request).await,
						Err(e) => Err(e),
					};

					if let Err(e) = notified {
						log_warn!(error = %e, "End-session notification failed.");

						outcome = Err(e);
					}
				},
				Some(_) => log_debug!("No provider tokens held; skipping end-session call."),
				None => log_debug!("Descriptor declares no end-session endpoint."),
			}

			let navigated = redirect_uri.map_or(Ok(()), |uri| inner.navigator.navigate(uri));

			outcome.and(navigated)
		})
		.await
	}
}
