//! Session-scoped storage for the pending PKCE challenge of the current login attempt.

// self
use crate::{_prelude::*, flows::PendingAuthorization, store::StoreError};

/// Short-lived storage for [`PendingAuthorization`] values.
///
/// At most one attempt is held per session. Taking an attempt removes it whether or not the
/// supplied `state` matches, so a verifier is never usable twice.
pub trait PkceStore
where
	Self: Send + Sync,
{
	/// Holds `pending`, replacing any previous attempt.
	fn put(&self, pending: PendingAuthorization) -> Result<(), StoreError>;

	/// Removes the held attempt and returns it when its `state` matches and it has not expired.
	fn take(&self, state: &str) -> Result<Option<PendingAuthorization>, StoreError>;

	/// Drops the held attempt, if any.
	fn clear(&self);
}

/// Default in-memory [`PkceStore`] with a time-to-live for abandoned attempts.
#[derive(Debug)]
pub struct MemoryPkceStore {
	slot: Mutex<Option<PendingAuthorization>>,
	ttl: Duration,
}
impl MemoryPkceStore {
	/// Lifetime of an attempt when none is configured.
	pub const DEFAULT_TTL: Duration = Duration::minutes(10);

	/// Creates a store that expires attempts after `ttl`.
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { slot: Mutex::new(None), ttl }
	}

	/// Returns `true` while an attempt is held.
	pub fn is_pending(&self) -> bool {
		self.slot.lock().is_some()
	}
}
impl Default for MemoryPkceStore {
	fn default() -> Self {
		Self::with_ttl(Self::DEFAULT_TTL)
	}
}
impl PkceStore for MemoryPkceStore {
	fn put(&self, pending: PendingAuthorization) -> Result<(), StoreError> {
		if self.slot.lock().replace(pending).is_some() {
			log_debug!("Replaced an unfinished login attempt.");
		}

		Ok(())
	}

	fn take(&self, state: &str) -> Result<Option<PendingAuthorization>, StoreError> {
		let Some(pending) = self.slot.lock().take() else {
			return Ok(None);
		};

		if pending.validate_state(state).is_err() {
			log_warn!("Discarded login attempt after a state mismatch.");

			return Ok(None);
		}
		if pending.is_expired_at(OffsetDateTime::now_utc(), self.ttl) {
			log_warn!(created_at = %pending.created_at, "Discarded an expired login attempt.");

			return Ok(None);
		}

		Ok(Some(pending))
	}

	fn clear(&self) {
		self.slot.lock().take();
	}
}
