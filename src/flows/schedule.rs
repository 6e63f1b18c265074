//! Proactive refresh timing and the single-slot timer that drives it.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	flows::OidcInner,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

/// Decides how long before expiry the proactive refresh fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
	/// Refresh this long before the access token expires.
	pub lead: Duration,
	/// Never fire sooner than this after hydration.
	pub min_delay: Duration,
}
impl RefreshPolicy {
	/// Default lead time before expiry.
	pub const DEFAULT_LEAD: Duration = Duration::minutes(5);
	/// Default floor for the timer delay.
	pub const DEFAULT_MIN_DELAY: Duration = Duration::seconds(30);

	/// Creates a policy; negative durations are clamped to zero.
	pub fn new(lead: Duration, min_delay: Duration) -> Self {
		Self { lead: clamp_non_negative(lead), min_delay: clamp_non_negative(min_delay) }
	}

	/// Delay from `now` until the refresh for a token expiring at `expires_at` should fire.
	///
	/// Equals `max(expires_at - lead, now + min_delay) - now`.
	pub fn delay_for(&self, expires_at: OffsetDateTime, now: OffsetDateTime) -> Duration {
		let target = (expires_at - self.lead).max(now + self.min_delay);

		target - now
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_LEAD, Self::DEFAULT_MIN_DELAY)
	}
}

/// Holds at most one pending refresh timer.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
	slot: Mutex<Option<ScheduledRefresh>>,
	next: AtomicU64,
}
impl RefreshScheduler {
	/// Instant the pending timer fires at, if any.
	pub fn fires_at(&self) -> Option<OffsetDateTime> {
		self.slot.lock().as_ref().map(|scheduled| scheduled.fires_at)
	}

	/// Returns `true` while a timer is pending.
	pub fn is_armed(&self) -> bool {
		self.slot.lock().is_some()
	}

	/// Aborts the pending timer, if any.
	pub fn cancel(&self) {
		if let Some(previous) = self.slot.lock().take() {
			previous.handle.abort();

			log_debug!(fires_at = %previous.fires_at, "Cancelled proactive refresh.");
		}
	}

	/// Replaces the pending timer with the task built by `make_task`.
	///
	/// The task receives its generation so it can [`release`](Self::release) the slot when it
	/// fires. Returns `false` when called outside a Tokio runtime.
	pub(crate) fn arm<F>(&self, fires_at: OffsetDateTime, make_task: impl FnOnce(u64) -> F) -> bool
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let Ok(runtime) = Handle::try_current() else {
			log_warn!("No Tokio runtime is available; proactive refresh is disabled.");

			return false;
		};
		let generation = self.next.fetch_add(1, Ordering::Relaxed) + 1;
		let mut slot = self.slot.lock();

		if let Some(previous) = slot.take() {
			previous.handle.abort();
		}

		let handle = runtime.spawn(make_task(generation));

		*slot = Some(ScheduledRefresh { generation, fires_at, handle });

		true
	}

	/// Clears the slot if it still belongs to `generation`.
	pub(crate) fn release(&self, generation: u64) -> bool {
		let mut slot = self.slot.lock();

		if slot.as_ref().is_some_and(|scheduled| scheduled.generation == generation) {
			*slot = None;

			true
		} else {
			false
		}
	}
}
impl Drop for RefreshScheduler {
	fn drop(&mut self) {
		if let Some(previous) = self.slot.get_mut().take() {
			previous.handle.abort();
		}
	}
}

#[derive(Debug)]
struct ScheduledRefresh {
	generation: u64,
	fires_at: OffsetDateTime,
	handle: JoinHandle<()>,
}

impl<C, M> OidcInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Arms the proactive refresh for a token expiring at `expires_at`.
	pub(crate) fn schedule_refresh(self: &Arc<Self>, expires_at: OffsetDateTime) {
		let now = OffsetDateTime::now_utc();
		let delay = self.refresh_policy.delay_for(expires_at, now);
		let fires_at = now + delay;
		let sleep_for = std::time::Duration::try_from(delay).unwrap_or(std::time::Duration::ZERO);
		let weak = Arc::downgrade(self);
		let armed = self.scheduler.arm(fires_at, move |generation| async move {
			tokio::time::sleep(sleep_for).await;

			let Some(inner) = weak.upgrade() else {
				return;
			};

			if !inner.scheduler.release(generation) {
				return;
			}

			log_debug!("Proactive refresh timer fired.");

			if let Err(_e) = inner.refresh_shared().await {
				log_warn!(error = %_e, "Proactive refresh failed.");
			}
		});

		if armed {
			log_debug!(%fires_at, "Scheduled proactive refresh.");
		}
	}
}

fn clamp_non_negative(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn long_lived_tokens_refresh_ahead_of_expiry() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let policy = RefreshPolicy::default();

		assert_eq!(policy.delay_for(now + Duration::hours(1), now), Duration::minutes(55));
	}

	#[test]
	fn short_lived_tokens_respect_the_minimum_delay() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let policy = RefreshPolicy::default();

		assert_eq!(policy.delay_for(now + Duration::seconds(120), now), Duration::seconds(30));
		assert_eq!(policy.delay_for(now - Duration::seconds(5), now), Duration::seconds(30));
	}

	#[test]
	fn negative_policy_values_are_clamped() {
		let policy = RefreshPolicy::new(Duration::seconds(-1), Duration::seconds(-1));

		assert_eq!(policy.lead, Duration::ZERO);
		assert_eq!(policy.min_delay, Duration::ZERO);
	}

	#[tokio::test]
	async fn arming_replaces_the_pending_timer() {
		let scheduler = RefreshScheduler::default();
		let first = OffsetDateTime::now_utc() + Duration::hours(1);
		let second = first + Duration::minutes(1);

		assert!(scheduler.arm(first, |_| async {}));
		assert!(scheduler.arm(second, |_| async {}));
		assert_eq!(scheduler.fires_at(), Some(second));
		assert!(!scheduler.release(1));
		assert!(scheduler.release(2));
		assert!(!scheduler.is_armed());
	}

	#[test]
	fn arming_without_runtime_is_skipped() {
		let scheduler = RefreshScheduler::default();

		assert!(!scheduler.arm(OffsetDateTime::now_utc(), |_| async {}));
		assert!(scheduler.fires_at().is_none());
	}
}
