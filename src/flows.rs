//! OIDC client orchestrating login, silent SSO, refresh scheduling, and logout.
//!
//! [`OidcClient`] owns the provider descriptor, the transport, and the lifecycle state machine
//! `Uninitialized → Initializing → {Authenticated, Unauthenticated} → (Authenticated ⇄
//! Refreshing) → LoggedOut`. Each flow lives in its own module and extends the client with an
//! `impl` block; lifecycle transitions are broadcast through the [`EventBus`].

pub mod auth_code_pkce;
mod common;
pub mod events;
pub mod logout;
pub mod navigator;
pub mod refresh;
pub mod schedule;
pub mod silent_sso;

pub use auth_code_pkce::*;
pub use events::*;
pub use navigator::*;
pub use refresh::*;
pub use schedule::*;
pub use silent_sso::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	provider::{DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderStrategy},
	store::{MemoryPkceStore, PkceStore, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// OIDC client specialized for the crate's default reqwest transport stack.
pub type ReqwestOidcClient = OidcClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Lifecycle states of the [`OidcClient`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OidcState {
	/// `init` has not run yet.
	#[default]
	Uninitialized,
	/// `init` is probing for an existing session.
	Initializing,
	/// A valid token pair is held.
	Authenticated,
	/// No session is held; a login is required.
	Unauthenticated,
	/// A refresh grant is in flight.
	Refreshing,
	/// The user logged out; local tokens are gone.
	LoggedOut,
}

/// Coordinates the OIDC flows against a single provider descriptor.
///
/// Cloning is cheap; clones share state, timers, and listeners.
pub struct OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	inner: Arc<OidcInner<C, M>>,
}
impl<C, M> OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a builder for the provided descriptor, public client id, and token store.
	pub fn builder(
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		tokens: Arc<TokenStore>,
	) -> OidcClientBuilder<C, M> {
		OidcClientBuilder::new(descriptor, client_id.into(), tokens)
	}

	/// Current lifecycle state.
	pub fn state(&self) -> OidcState {
		*self.inner.state.read()
	}

	/// Event bus broadcasting lifecycle transitions.
	pub fn events(&self) -> &EventBus {
		&self.inner.events
	}

	/// Token store hydrated by this client.
	pub fn tokens(&self) -> &Arc<TokenStore> {
		&self.inner.tokens
	}

	/// Provider descriptor in use.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.inner.descriptor
	}

	/// OAuth client identifier.
	pub fn client_id(&self) -> &str {
		&self.inner.client_id
	}

	/// Scopes requested on login and refresh.
	pub fn scope(&self) -> &ScopeSet {
		&self.inner.scope
	}

	/// Counters for refresh attempts and outcomes.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.inner.refresh_metrics
	}

	/// Instant the pending proactive refresh fires at, if one is scheduled.
	pub fn scheduled_refresh_at(&self) -> Option<OffsetDateTime> {
		self.inner.scheduler.fires_at()
	}

	/// Drops local tokens, the pending PKCE attempt, and the refresh timer without contacting
	/// the provider or emitting events.
	pub fn reset(&self) {
		self.inner.discard_session();
		self.inner.transition(OidcState::Unauthenticated);
	}
}
impl<C, M> Clone for OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}
impl<C, M> Debug for OidcClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OidcClient")
			.field("descriptor", &self.inner.descriptor.id)
			.field("client_id", &self.inner.client_id)
			.field("state", &self.state())
			.finish()
	}
}

/// Builder for [`OidcClient`].
pub struct OidcClientBuilder<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: ProviderDescriptor,
	client_id: String,
	client_secret: Option<String>,
	tokens: Arc<TokenStore>,
	http_client: Option<Arc<C>>,
	transport_mapper: Option<Arc<M>>,
	strategy: Arc<dyn ProviderStrategy>,
	navigator: Option<Arc<dyn Navigator>>,
	pkce: Option<Arc<dyn PkceStore>>,
	silent_check: Option<SilentCheck>,
	refresh_policy: RefreshPolicy,
	scope: ScopeSet,
}
impl<C, M> OidcClientBuilder<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn new(descriptor: ProviderDescriptor, client_id: String, tokens: Arc<TokenStore>) -> Self {
		Self {
			descriptor,
			client_id,
			client_secret: None,
			tokens,
			http_client: None,
			transport_mapper: None,
			strategy: Arc::new(DefaultProviderStrategy),
			navigator: None,
			pkce: None,
			silent_check: None,
			refresh_policy: RefreshPolicy::default(),
			scope: ScopeSet::default().with_openid(),
		}
	}

	/// Sets the transport and its error mapper.
	pub fn http_client(mut self, client: impl Into<Arc<C>>, mapper: impl Into<Arc<M>>) -> Self {
		self.http_client = Some(client.into());
		self.transport_mapper = Some(mapper.into());

		self
	}

	/// Sets a client secret for descriptors preferring confidential client authentication.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the provider strategy (defaults to [`DefaultProviderStrategy`]).
	pub fn strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Sets the user-agent redirect boundary (defaults to a [`RecordingNavigator`]).
	pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = Some(navigator);

		self
	}

	/// Overrides the PKCE attempt storage (defaults to [`MemoryPkceStore`]).
	pub fn pkce_store(mut self, store: Arc<dyn PkceStore>) -> Self {
		self.pkce = Some(store);

		self
	}

	/// Enables the silent-SSO probe performed by `init`.
	pub fn silent_check(mut self, check: SilentCheck) -> Self {
		self.silent_check = Some(check);

		self
	}

	/// Overrides the proactive refresh timing.
	pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Overrides the requested scopes; `openid` is always included.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Validates the configuration and registers the client as the token store's refresher.
	pub fn build(self) -> Result<OidcClient<C, M>> {
		let http_client =
			self.http_client.ok_or(ConfigError::MissingValue { key: "http_client" })?;
		let transport_mapper =
			self.transport_mapper.ok_or(ConfigError::MissingValue { key: "transport_mapper" })?;

		common::ensure_grant_supported(&self.descriptor, GrantType::AuthorizationCode)?;

		let scope = self.scope.with_openid();
		let inner = Arc::new(OidcInner {
			descriptor: self.descriptor,
			client_id: self.client_id,
			client_secret: self.client_secret,
			scope,
			http_client,
			transport_mapper,
			strategy: self.strategy,
			tokens: self.tokens,
			pkce: self.pkce.unwrap_or_else(|| Arc::new(MemoryPkceStore::default())),
			navigator: self.navigator.unwrap_or_else(|| Arc::new(RecordingNavigator::default())),
			silent_check: self.silent_check,
			refresh_policy: self.refresh_policy,
			state: RwLock::new(OidcState::Uninitialized),
			events: EventBus::default(),
			scheduler: RefreshScheduler::default(),
			in_flight: Mutex::new(None),
			epoch: AtomicU64::new(0),
			refresh_metrics: RefreshMetrics::default(),
		});

		inner.tokens.set_refresh_callback(Arc::new(ClientRefresher(Arc::downgrade(&inner))));

		Ok(OidcClient { inner })
	}
}

pub(crate) struct OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) descriptor: ProviderDescriptor,
	pub(crate) client_id: String,
	pub(crate) client_secret: Option<String>,
	pub(crate) scope: ScopeSet,
	pub(crate) http_client: Arc<C>,
	pub(crate) transport_mapper: Arc<M>,
	pub(crate) strategy: Arc<dyn ProviderStrategy>,
	pub(crate) tokens: Arc<TokenStore>,
	pub(crate) pkce: Arc<dyn PkceStore>,
	pub(crate) navigator: Arc<dyn Navigator>,
	pub(crate) silent_check: Option<SilentCheck>,
	pub(crate) refresh_policy: RefreshPolicy,
	pub(crate) state: RwLock<OidcState>,
	pub(crate) events: EventBus,
	pub(crate) scheduler: RefreshScheduler,
	pub(crate) in_flight: Mutex<Option<SharedRefresh>>,
	// Bumped whenever local session state is discarded; refreshes started under an older epoch
	// must not resurrect the session.
	pub(crate) epoch: AtomicU64,
	pub(crate) refresh_metrics: RefreshMetrics,
}
impl<C, M> OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn facade(&self) -> Result<BasicFacade<C, M>> {
		BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	pub(crate) fn transition(&self, next: OidcState) {
		let previous = std::mem::replace(&mut *self.state.write(), next);

		if previous != next {
			log_debug!(from = ?previous, to = ?next, "OIDC client state changed.");
		}
	}

	pub(crate) fn current_epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}

	pub(crate) fn discard_session(&self) {
		self.epoch.fetch_add(1, Ordering::SeqCst);
		self.scheduler.cancel();
		self.tokens.clear();
		self.pkce.clear();
	}
}
