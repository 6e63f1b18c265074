//! In-memory token holder plus the storage contracts for PKCE challenges and user preferences.
//!
//! [`TokenStore`] is the only owner of the session's token pair. Other components read through
//! its accessors and mutate only via [`TokenStore::store`] and [`TokenStore::clear`]. The refresh
//! strategy is late-bound through [`RefreshCallback`] so the store never depends on a protocol.

pub mod file;
pub mod pkce;
pub mod preference;

pub use file::FilePreferenceStore;
pub use pkce::{MemoryPkceStore, PkceStore};
pub use preference::{MemoryPreferenceStore, PreferenceStore};

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
};

/// Boxed future returned by async storage contracts.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Boxed future returned by [`RefreshCallback::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenPair>> + 'a + Send>>;

/// Late-bound refresh strategy invoked when the held access token is no longer usable.
///
/// Implementations are expected to store the refreshed pair back into the [`TokenStore`]
/// before resolving.
pub trait RefreshCallback
where
	Self: Send + Sync,
{
	/// Obtains a fresh token pair.
	fn refresh(&self) -> RefreshFuture<'_>;
}

/// Error type produced by token, PKCE, and preference stores.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Token pair was already expired when it was handed to the store.
	#[error("Token pair expired at {expires_at}.")]
	Expired {
		/// Expiry instant carried by the rejected pair.
		expires_at: OffsetDateTime,
	},
	/// Serialization failures surfaced by a persistent backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Holder of the current access/refresh token pair.
pub struct TokenStore {
	pair: RwLock<Option<TokenPair>>,
	refresh: RwLock<Option<Arc<dyn RefreshCallback>>>,
	safety_margin: Duration,
}
impl TokenStore {
	/// Margin applied before expiry when deciding whether the access token is still usable.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(30);

	/// Creates an empty store with the provided safety margin.
	pub fn new(safety_margin: Duration) -> Self {
		let safety_margin = safety_margin.max(Duration::ZERO);

		Self { pair: RwLock::new(None), refresh: RwLock::new(None), safety_margin }
	}

	/// Safety margin applied by [`TokenStore::get_valid_access_token`].
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Replaces the held pair.
	///
	/// Pairs whose expiry is not in the future are rejected and leave the previous pair intact.
	pub fn store(&self, pair: TokenPair) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();

		if pair.expires_at <= now {
			return Err(StoreError::Expired { expires_at: pair.expires_at });
		}

		log_debug!(expires_at = %pair.expires_at, "Storing token pair.");

		*self.pair.write() = Some(pair);

		Ok(())
	}

	/// Discards the held pair. Calling it on an empty store is a no-op.
	pub fn clear(&self) {
		if self.pair.write().take().is_some() {
			log_debug!("Cleared token pair.");
		}
	}

	/// Registers (or replaces) the refresh strategy.
	pub fn set_refresh_callback(&self, callback: Arc<dyn RefreshCallback>) {
		*self.refresh.write() = Some(callback);
	}

	/// Returns `true` once a refresh strategy has been registered.
	pub fn has_refresh_callback(&self) -> bool {
		self.refresh.read().is_some()
	}

	/// Clone of the held pair, if any.
	pub fn snapshot(&self) -> Option<TokenPair> {
		self.pair.read().clone()
	}

	/// Held access token while it has not expired, ignoring the safety margin.
	pub fn current_access_token(&self) -> Option<TokenSecret> {
		let now = OffsetDateTime::now_utc();

		self.pair
			.read()
			.as_ref()
			.filter(|pair| !pair.is_expired_at(now))
			.map(|pair| pair.access_token.clone())
	}

	/// Returns `true` while the held access token has not expired.
	pub fn has_valid_token(&self) -> bool {
		self.current_access_token().is_some()
	}

	/// Returns the access token if it stays valid beyond the safety margin, refreshing otherwise.
	pub async fn get_valid_access_token(&self) -> Result<TokenSecret> {
		if let Some(token) = self.fresh_access_token(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		log_debug!("Access token is missing or inside the safety margin; refreshing.");

		self.force_refresh().await
	}

	/// Invokes the refresh strategy regardless of the held token's freshness.
	pub async fn force_refresh(&self) -> Result<TokenSecret> {
		let callback = self.refresh.read().clone().ok_or(Error::TokenUnavailable)?;

		match callback.refresh().await {
			Ok(pair) => Ok(pair.access_token),
			Err(_e) => {
				log_warn!(error = %_e, "Refresh callback failed.");

				Err(Error::TokenUnavailable)
			},
		}
	}

	fn fresh_access_token(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		self.pair
			.read()
			.as_ref()
			.filter(|pair| pair.is_fresh_at(now, self.safety_margin))
			.map(|pair| pair.access_token.clone())
	}
}
impl Default for TokenStore {
	fn default() -> Self {
		Self::new(Self::DEFAULT_SAFETY_MARGIN)
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("pair", &*self.pair.read())
			.field("refresh_callback_set", &self.has_refresh_callback())
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}
