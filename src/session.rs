//! Application-level session state machine composing the OIDC client, the profile source, and
//! tenant preferences.
//!
//! [`SessionState`] moves through `Idle → Loading → {Authenticated, Error}` and resets to `Idle`
//! on logout or when the OIDC client reports an expired session. User data lives only in
//! memory; the selected tenant is the one value persisted through a [`PreferenceStore`].

pub mod access;
pub mod profile;

pub use access::*;
pub use profile::*;

// self
use crate::{
	_prelude::*,
	auth::{RoleName, TenantAccess, TenantId, UserId},
	flows::{ListenerId, OidcClient, OidcEventKind},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
	store::PreferenceStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Session state specialized for the crate's default reqwest transport stack.
pub type ReqwestSessionState = SessionState<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coarse status of the [`Session`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
	/// No user is signed in.
	#[default]
	Idle,
	/// An action is resolving the session.
	Loading,
	/// A user is signed in and the profile is loaded.
	Authenticated,
	/// The last action failed; see [`Session::error_message`].
	Error,
}

/// Snapshot of the signed-in user as seen by the application.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
	/// Current status.
	pub status: SessionStatus,
	/// Signed-in user.
	pub user_id: Option<UserId>,
	/// Email address.
	pub email: Option<String>,
	/// Login name.
	pub username: Option<String>,
	/// Granted roles.
	pub roles: BTreeSet<RoleName>,
	/// Accessible tenants.
	pub tenants: Vec<TenantAccess>,
	/// Tenant that tenant-scoped actions apply to.
	pub selected_tenant: Option<TenantId>,
	/// Failure summary while `status` is [`SessionStatus::Error`].
	pub error_message: Option<String>,
}
impl Session {
	/// Returns `true` while the status is [`SessionStatus::Authenticated`].
	pub fn is_authenticated(&self) -> bool {
		self.status == SessionStatus::Authenticated
	}

	fn loading(&self) -> Self {
		Self { status: SessionStatus::Loading, error_message: None, ..self.clone() }
	}

	fn failed(message: String) -> Self {
		Self { status: SessionStatus::Error, error_message: Some(message), ..Self::default() }
	}
}

/// Role- and tenant-aware session owned by the application.
///
/// Actions are serialized: a second action waits until the first one settles.
pub struct SessionState<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oidc: OidcClient<C, M>,
	profiles: Arc<dyn ProfileSource>,
	preferences: Arc<dyn PreferenceStore>,
	policy: AccessPolicy,
	session: Arc<RwLock<Session>>,
	actions: AsyncMutex<()>,
	listeners: Vec<ListenerId>,
}
impl<C, M> SessionState<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires a session to `oidc` and subscribes to its expiry and logout events.
	pub fn new(
		oidc: OidcClient<C, M>,
		profiles: Arc<dyn ProfileSource>,
		preferences: Arc<dyn PreferenceStore>,
		policy: AccessPolicy,
	) -> Self {
		let session = Arc::new(RwLock::new(Session::default()));
		let listeners = [OidcEventKind::TokenExpired, OidcEventKind::Logout]
			.into_iter()
			.map(|kind| {
				let session = Arc::clone(&session);

				oidc.events().subscribe(kind, move |_event| {
					*session.write() = Session::default();

					Ok(())
				})
			})
			.collect();

		Self {
			oidc,
			profiles,
			preferences,
			policy,
			session,
			actions: AsyncMutex::new(()),
			listeners,
		}
	}

	/// Underlying OIDC client.
	pub fn oidc(&self) -> &OidcClient<C, M> {
		&self.oidc
	}

	/// Authorization policy in force.
	pub fn policy(&self) -> &AccessPolicy {
		&self.policy
	}

	/// Current session.
	///
	/// An authenticated session whose access token is gone is reported as `Idle`.
	pub fn snapshot(&self) -> Session {
		let session = self.session.read().clone();

		if session.is_authenticated() && !self.oidc.tokens().has_valid_token() {
			Session::default()
		} else {
			session
		}
	}

	/// Current status.
	pub fn status(&self) -> SessionStatus {
		self.snapshot().status
	}

	/// Tenant that tenant-scoped requests should target.
	pub fn selected_tenant(&self) -> Option<TenantId> {
		self.snapshot().selected_tenant
	}

	/// Resolves an existing session at startup.
	pub async fn init(&self) -> Result<SessionStatus> {
		let _guard = self.actions.lock().await;

		self.begin();

		let authenticated = match self.oidc.init().await {
			Ok(authenticated) => authenticated,
			Err(e) => return Err(self.fail(e)),
		};

		if authenticated {
			self.hydrate(false).await?;
		} else {
			*self.session.write() = Session::default();
		}

		Ok(self.status())
	}

	/// Starts an interactive login; returns the authorize URL the user agent was sent to.
	pub async fn login(&self, redirect_uri: &Url) -> Result<Url> {
		let _guard = self.actions.lock().await;

		self.begin();

		self.oidc.login(redirect_uri).map_err(|e| self.fail(e))
	}

	/// Completes a login from the `code` and `state` of the redirect.
	pub async fn complete_login(&self, code: &str, state: &str) -> Result<()> {
		let _guard = self.actions.lock().await;

		self.begin();

		if let Err(e) = self.oidc.handle_callback(code, state).await {
			return Err(self.fail(e));
		}

		self.hydrate(false).await
	}

	/// Completes a login from the full redirect URL.
	pub async fn complete_login_from_url(&self, url: &Url) -> Result<()> {
		let _guard = self.actions.lock().await;

		self.begin();

		if let Err(e) = self.oidc.handle_callback_url(url).await {
			return Err(self.fail(e));
		}

		self.hydrate(false).await
	}

	/// Refreshes the tokens and re-derives roles and tenants, keeping an accessible selection.
	///
	/// A rejected refresh leaves the session `Idle`.
	pub async fn refresh(&self) -> Result<()> {
		let _guard = self.actions.lock().await;

		if let Err(e) = self.oidc.refresh().await {
			*self.session.write() = Session::default();

			return Err(e);
		}

		self.hydrate(true).await
	}

	/// Signs out; the session ends `Idle` even when the provider call fails.
	pub async fn logout(&self, redirect_uri: Option<&Url>) -> Result<()> {
		let _guard = self.actions.lock().await;
		let outcome = self.oidc.logout(redirect_uri).await;

		*self.session.write() = Session::default();

		outcome
	}

	/// Reloads the profile for the held tokens.
	pub async fn load_profile(&self) -> Result<()> {
		let _guard = self.actions.lock().await;

		self.hydrate(true).await
	}

	/// Selects the tenant tenant-scoped actions apply to and remembers it for the user.
	///
	/// `None` clears the selection.
	pub async fn set_selected_tenant(&self, tenant: Option<TenantId>) -> Result<()> {
		let _guard = self.actions.lock().await;
		let session = self.snapshot();

		if !session.is_authenticated() {
			return Err(Error::LoginRequired { reason: "no authenticated session".into() });
		}
		if let Some(denied) =
			tenant.as_ref().filter(|tenant| !self.policy.can_access_tenant(&session, tenant))
		{
			return Err(TenantAccessError::WrongTenant { tenant: denied.clone() }.into());
		}

		self.session.write().selected_tenant = tenant.clone();

		log_info!(tenant = ?tenant, "Selected tenant changed.");

		let Some(user) = &session.user_id else { return Ok(()) };

		if let Err(_e) = self.preferences.save_selected_tenant(user, tenant.as_ref()).await {
			log_warn!(error = %_e, "Failed to persist the selected tenant.");
		}

		Ok(())
	}

	/// Returns `true` when the signed-in user holds `role`.
	pub fn has_role(&self, role: &str) -> bool {
		let session = self.snapshot();

		session.is_authenticated() && session.roles.contains(role)
	}

	/// Returns `true` when the signed-in user holds at least one of `roles`.
	pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a str>) -> bool {
		let session = self.snapshot();

		session.is_authenticated() && roles.into_iter().any(|role| session.roles.contains(role))
	}

	/// Returns `true` when the signed-in user may act on `tenant`.
	pub fn can_access_tenant(&self, tenant: &TenantId) -> bool {
		self.policy.can_access_tenant(&self.snapshot(), tenant)
	}

	/// Checks `requirement` against the current session.
	///
	/// Fails with [`Error::LoginRequired`] when nobody is signed in and with
	/// [`Error::TenantAccess`] when the signed-in user lacks the role or tenant.
	pub fn authorize(&self, requirement: &AccessRequirement) -> Result<()> {
		let session = self.snapshot();

		if !session.is_authenticated() {
			return Err(Error::LoginRequired { reason: "no authenticated session".into() });
		}

		self.policy.evaluate(&session, requirement)?;

		Ok(())
	}

	fn begin(&self) {
		let mut session = self.session.write();

		*session = session.loading();
	}

	// Drops tokens and records the failure. Returns the error for propagation.
	fn fail(&self, err: Error) -> Error {
		log_warn!(error = %err, "Session action failed.");

		self.oidc.reset();

		*self.session.write() = Session::failed(err.to_string());

		err
	}

	async fn hydrate(&self, keep_selection: bool) -> Result<()> {
		let loaded =
			obs::observe(FlowKind::Profile, "load", self.profiles.load(self.oidc.tokens())).await;
		let profile = match loaded {
			Ok(profile) => profile,
			Err(e @ Error::ProfileLoad { .. }) => return Err(self.fail(e)),
			Err(e) => return Err(self.fail(Error::ProfileLoad { reason: e.to_string() })),
		};
		let mut next = Session {
			status: SessionStatus::Authenticated,
			user_id: profile.user_id,
			email: profile.email,
			username: profile.username,
			roles: profile.roles,
			tenants: profile.tenants,
			selected_tenant: None,
			error_message: None,
		};
		let current =
			if keep_selection { self.session.read().selected_tenant.clone() } else { None };

		next.selected_tenant = match current.filter(|t| self.policy.can_access_tenant(&next, t)) {
			Some(tenant) => Some(tenant),
			None => self.default_tenant(&next).await,
		};

		if !self.oidc.tokens().has_valid_token() {
			return Err(self.fail(Error::TokenUnavailable));
		}

		log_info!(
			user = ?next.user_id,
			roles = next.roles.len(),
			tenants = next.tenants.len(),
			selected = ?next.selected_tenant,
			"Session authenticated."
		);

		*self.session.write() = next;

		Ok(())
	}

	async fn default_tenant(&self, session: &Session) -> Option<TenantId> {
		if let Some(user) = &session.user_id {
			match self.preferences.selected_tenant(user).await {
				Ok(Some(tenant)) if self.policy.can_access_tenant(session, &tenant) =>
					return Some(tenant),
				Ok(_) => {},
				Err(_e) => log_warn!(error = %_e, "Failed to read the saved tenant."),
			}
		}

		if let [only] = session.tenants.as_slice() {
			return Some(only.tenant_id.clone());
		}

		let mut defaults = session.tenants.iter().filter(|access| access.is_default);

		match (defaults.next(), defaults.next()) {
			(Some(access), None) => Some(access.tenant_id.clone()),
			_ => None,
		}
	}
}
impl<C, M> Drop for SessionState<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn drop(&mut self) {
		for id in self.listeners.drain(..) {
			self.oidc.events().unsubscribe(id);
		}
	}
}
impl<C, M> Debug for SessionState<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionState")
			.field("session", &*self.session.read())
			.field("policy", &self.policy)
			.finish()
	}
}
