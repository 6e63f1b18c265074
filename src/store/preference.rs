//! Non-sensitive per-user preferences that may outlive a session (the selected tenant).

// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserId},
	store::StoreFuture,
};

/// Storage backend for the tenant a user last selected.
///
/// Only tenant identifiers are persisted; tokens, roles, and profile data never reach this store.
pub trait PreferenceStore
where
	Self: Send + Sync,
{
	/// Loads the tenant last selected by `user`.
	fn selected_tenant<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<TenantId>>;

	/// Persists (or with `None`, forgets) the tenant selected by `user`.
	fn save_selected_tenant<'a>(
		&'a self,
		user: &'a UserId,
		tenant: Option<&'a TenantId>,
	) -> StoreFuture<'a, ()>;
}

/// In-process [`PreferenceStore`] for tests and hosts without durable storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryPreferenceStore(Arc<RwLock<HashMap<UserId, TenantId>>>);
impl PreferenceStore for MemoryPreferenceStore {
	fn selected_tenant<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<TenantId>> {
		Box::pin(async move { Ok(self.0.read().get(user).cloned()) })
	}

	fn save_selected_tenant<'a>(
		&'a self,
		user: &'a UserId,
		tenant: Option<&'a TenantId>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.0.write();

			match tenant {
				Some(tenant) => guard.insert(user.clone(), tenant.clone()),
				None => guard.remove(user),
			};

			Ok(())
		})
	}
}
