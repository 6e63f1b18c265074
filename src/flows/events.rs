//! Typed lifecycle events and the listener registry that broadcasts them.
//!
//! Listeners run synchronously on the emitting task, outside the registry lock, so they may
//! subscribe or unsubscribe from inside a callback. A listener that returns an error or panics
//! is logged and skipped; the remaining listeners still run.

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

/// Result returned by event listeners.
pub type ListenerResult = Result<(), Box<dyn StdError + Send + Sync>>;

type Listener = Arc<dyn Fn(&OidcEvent) -> ListenerResult + Send + Sync>;

/// Lifecycle event emitted by the OIDC client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OidcEvent {
	/// `init` finished.
	Initialized {
		/// Whether a session was found.
		authenticated: bool,
	},
	/// A token pair was obtained by login, silent SSO, or a stored session.
	Authenticated,
	/// No session is held after `init`.
	Unauthenticated,
	/// The refresh grant rotated the token pair.
	TokenRefreshed {
		/// Expiry of the new access token.
		expires_at: OffsetDateTime,
	},
	/// Refresh failed and the session was cleared.
	TokenExpired,
	/// The user logged out.
	Logout,
	/// A flow failed.
	Error {
		/// Human-readable failure summary.
		message: String,
	},
}
impl OidcEvent {
	/// Discriminant used for kind-scoped subscriptions.
	pub fn kind(&self) -> OidcEventKind {
		match self {
			OidcEvent::Initialized { .. } => OidcEventKind::Initialized,
			OidcEvent::Authenticated => OidcEventKind::Authenticated,
			OidcEvent::Unauthenticated => OidcEventKind::Unauthenticated,
			OidcEvent::TokenRefreshed { .. } => OidcEventKind::TokenRefreshed,
			OidcEvent::TokenExpired => OidcEventKind::TokenExpired,
			OidcEvent::Logout => OidcEventKind::Logout,
			OidcEvent::Error { .. } => OidcEventKind::Error,
		}
	}

	pub(crate) fn error(err: &Error) -> Self {
		Self::Error { message: err.to_string() }
	}
}

/// Event kinds listeners can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OidcEventKind {
	/// `init` finished.
	Initialized,
	/// A session was established.
	Authenticated,
	/// No session is held.
	Unauthenticated,
	/// The token pair was rotated.
	TokenRefreshed,
	/// Refresh failed and the session was cleared.
	TokenExpired,
	/// The user logged out.
	Logout,
	/// A flow failed.
	Error,
}
impl OidcEventKind {
	/// Returns a stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			OidcEventKind::Initialized => "initialized",
			OidcEventKind::Authenticated => "authenticated",
			OidcEventKind::Unauthenticated => "unauthenticated",
			OidcEventKind::TokenRefreshed => "token_refreshed",
			OidcEventKind::TokenExpired => "token_expired",
			OidcEventKind::Logout => "logout",
			OidcEventKind::Error => "error",
		}
	}
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of event listeners.
#[derive(Default)]
pub struct EventBus {
	listeners: RwLock<Vec<Registration>>,
	next: AtomicU64,
}
impl EventBus {
	/// Registers `listener` for events of `kind`.
	pub fn subscribe<F>(&self, kind: OidcEventKind, listener: F) -> ListenerId
	where
		F: 'static + Fn(&OidcEvent) -> ListenerResult + Send + Sync,
	{
		self.register(Some(kind), Arc::new(listener))
	}

	/// Registers `listener` for every event.
	pub fn subscribe_all<F>(&self, listener: F) -> ListenerId
	where
		F: 'static + Fn(&OidcEvent) -> ListenerResult + Send + Sync,
	{
		self.register(None, Arc::new(listener))
	}

	/// Removes a listener; returns `false` if it was already gone.
	pub fn unsubscribe(&self, id: ListenerId) -> bool {
		let mut listeners = self.listeners.write();
		let before = listeners.len();

		listeners.retain(|registration| registration.id != id);

		listeners.len() != before
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.read().len()
	}

	/// Delivers `event` to every matching listener in subscription order.
	pub fn emit(&self, event: &OidcEvent) {
		let kind = event.kind();
		let targets = self
			.listeners
			.read()
			.iter()
			.filter(|registration| registration.kind.is_none_or(|k| k == kind))
			.map(|registration| (registration.id, registration.listener.clone()))
			.collect::<Vec<_>>();

		log_debug!(event = kind.as_str(), listeners = targets.len(), "Emitting OIDC event.");

		for (_id, listener) in targets {
			match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
				Ok(Ok(())) => {},
				Ok(Err(_e)) => {
					log_error!(
						listener = _id.0,
						event = kind.as_str(),
						error = %_e,
						"Event listener failed."
					);
				},
				Err(_) => {
					log_error!(listener = _id.0, event = kind.as_str(), "Event listener panicked.");
				},
			}
		}
	}

	fn register(&self, kind: Option<OidcEventKind>, listener: Listener) -> ListenerId {
		let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));

		self.listeners.write().push(Registration { id, kind, listener });

		id
	}
}
impl Debug for EventBus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EventBus").field("listeners", &self.listener_count()).finish()
	}
}

struct Registration {
	id: ListenerId,
	kind: Option<OidcEventKind>,
	listener: Listener,
}
