//! Single-flight coordination of refreshes triggered by `401 Unauthorized` responses.
//!
//! The first rejected request becomes the leader and calls
//! [`TokenStore::force_refresh`]; requests rejected while that refresh runs wait in a FIFO
//! queue and are released in arrival order with the leader's outcome. A request rejected with a
//! token that has already been rotated skips the queue and replays with the current token. A
//! late rejection of the token whose refresh already failed is answered without a new refresh.

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, auth::TokenSecret, store::TokenStore};

type Waiter = oneshot::Sender<Option<TokenSecret>>;

#[derive(Debug, Default)]
pub(crate) struct RefreshQueue {
	state: Mutex<QueueState>,
}
impl RefreshQueue {
	/// Returns a token to replay the rejected request with, or `None` when refresh failed.
	pub(crate) async fn acquire(
		&self,
		tokens: &TokenStore,
		rejected: Option<&TokenSecret>,
	) -> Option<TokenSecret> {
		match self.ticket(tokens, rejected) {
			Ticket::Ready(token) => {
				log_debug!("Token rotated since the request was sent; replaying directly.");

				Some(token)
			},
			Ticket::Follower(receiver) => receiver.await.ok().flatten(),
			Ticket::Failed => {
				log_debug!("Refresh for the rejected token already failed; not retrying.");

				None
			},
			Ticket::Leader => {
				let mut leader = LeaderGuard { queue: self, outcome: None };

				match tokens.force_refresh().await {
					Ok(token) => {
						self.state.lock().failed = None;
						leader.outcome = Some(token);
					},
					Err(_e) => {
						log_warn!(error = %_e, "Refresh after 401 failed.");

						self.state.lock().failed = rejected.cloned();
					},
				}

				leader.outcome.clone()
			},
		}
	}

	/// Number of requests waiting on the running refresh.
	#[cfg(test)]
	pub(crate) fn waiting(&self) -> usize {
		self.state.lock().waiters.len()
	}

	fn ticket(&self, tokens: &TokenStore, rejected: Option<&TokenSecret>) -> Ticket {
		let mut state = self.state.lock();

		if state.refreshing {
			let (sender, receiver) = oneshot::channel();

			state.waiters.push_back(sender);

			return Ticket::Follower(receiver);
		}
		if let Some(current) =
			tokens.current_access_token().filter(|current| Some(current) != rejected)
		{
			return Ticket::Ready(current);
		}
		if rejected.is_some() && state.failed.as_ref() == rejected {
			return Ticket::Failed;
		}

		state.refreshing = true;

		Ticket::Leader
	}
}

#[derive(Debug, Default)]
struct QueueState {
	refreshing: bool,
	waiters: VecDeque<Waiter>,
	// Token whose refresh failed last.
	failed: Option<TokenSecret>,
}

enum Ticket {
	Ready(TokenSecret),
	Leader,
	Follower(oneshot::Receiver<Option<TokenSecret>>),
	Failed,
}

/// Releases the queue when the leader finishes or is dropped mid-refresh.
struct LeaderGuard<'a> {
	queue: &'a RefreshQueue,
	outcome: Option<TokenSecret>,
}
impl Drop for LeaderGuard<'_> {
	fn drop(&mut self) {
		let waiters = {
			let mut state = self.queue.state.lock();

			state.refreshing = false;

			std::mem::take(&mut state.waiters)
		};

		log_debug!(released = waiters.len(), "Releasing requests queued behind the refresh.");

		for waiter in waiters {
			let _ = waiter.send(self.outcome.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{ScopeSet, TokenPair},
		store::{RefreshCallback, RefreshFuture},
	};

	fn pair(access: &str) -> TokenPair {
		TokenPair::builder(ScopeSet::default())
			.access_token(access)
			.refresh_token("refresh")
			.expires_in(Duration::minutes(10))
			.build()
			.expect("Token pair fixture should build.")
	}

	struct SlowRotation {
		store: Weak<TokenStore>,
		calls: AtomicUsize,
		fail: bool,
	}
	impl RefreshCallback for SlowRotation {
		fn refresh(&self) -> RefreshFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				tokio::time::sleep(std::time::Duration::from_millis(50)).await;

				if self.fail {
					return Err(Error::TokenRefresh { reason: "invalid_grant".into() });
				}

				let next = pair("rotated");

				if let Some(store) = self.store.upgrade() {
					store.store(next.clone())?;
				}

				Ok(next)
			})
		}
	}

	fn store(fail: bool) -> (Arc<TokenStore>, Arc<SlowRotation>) {
		let store = Arc::new(TokenStore::default());
		let callback = Arc::new(SlowRotation {
			store: Arc::downgrade(&store),
			calls: AtomicUsize::new(0),
			fail,
		});

		store.store(pair("stale")).expect("Initial pair should be stored.");
		store.set_refresh_callback(callback.clone());

		(store, callback)
	}

	#[tokio::test]
	async fn concurrent_rejections_share_one_refresh() {
		let (tokens, callback) = store(false);
		let queue = RefreshQueue::default();
		let stale = TokenSecret::new("stale");
		let (a, b, c) = tokio::join!(
			queue.acquire(&tokens, Some(&stale)),
			queue.acquire(&tokens, Some(&stale)),
			queue.acquire(&tokens, Some(&stale)),
		);

		assert_eq!(callback.calls.load(Ordering::SeqCst), 1);

		for token in [a, b, c] {
			assert_eq!(token.as_ref().map(TokenSecret::expose), Some("rotated"));
		}

		assert_eq!(queue.waiting(), 0);
	}

	#[tokio::test]
	async fn rotated_tokens_replay_without_refreshing() {
		let (tokens, callback) = store(false);
		let queue = RefreshQueue::default();
		let older = TokenSecret::new("older");
		let token = queue.acquire(&tokens, Some(&older)).await;

		assert_eq!(token.as_ref().map(TokenSecret::expose), Some("stale"));
		assert_eq!(callback.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn failed_refresh_rejects_every_waiter() {
		let (tokens, callback) = store(true);
		let queue = RefreshQueue::default();
		let stale = TokenSecret::new("stale");
		let (a, b) = tokio::join!(
			queue.acquire(&tokens, Some(&stale)),
			queue.acquire(&tokens, Some(&stale)),
		);

		assert!(a.is_none());
		assert!(b.is_none());
		assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn late_rejection_after_a_failed_refresh_does_not_refresh_again() {
		let (tokens, callback) = store(true);
		let queue = RefreshQueue::default();
		let stale = TokenSecret::new("stale");

		assert!(queue.acquire(&tokens, Some(&stale)).await.is_none());
		assert!(queue.acquire(&tokens, Some(&stale)).await.is_none());
		assert_eq!(callback.calls.load(Ordering::SeqCst), 1);

		tokens.store(pair("relogged")).expect("A new login should be stored.");

		let token = queue.acquire(&tokens, Some(&stale)).await;

		assert_eq!(token.as_ref().map(TokenSecret::expose), Some("relogged"));
		assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
	}
}
