//! Retry budget and exponential backoff for gateway requests.

// self
use crate::_prelude::*;

/// Retry budget applied to network failures and 5xx responses.
///
/// Client errors (4xx) are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries performed after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry; doubled for each subsequent one.
	pub base_delay: Duration,
	/// Upper bound for any single delay, including `Retry-After` hints.
	pub max_delay: Duration,
}
impl RetryPolicy {
	/// Default retry count.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default base delay.
	pub const DEFAULT_BASE_DELAY: Duration = Duration::milliseconds(250);
	/// Default delay cap.
	pub const DEFAULT_MAX_DELAY: Duration = Duration::seconds(10);

	/// Creates a policy with the default delay cap.
	pub fn new(max_retries: u32, base_delay: Duration) -> Self {
		let base_delay = if base_delay.is_negative() { Duration::ZERO } else { base_delay };

		Self { max_retries, base_delay, max_delay: Self::DEFAULT_MAX_DELAY.max(base_delay) }
	}

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self::new(0, Duration::ZERO)
	}

	/// Overrides the delay cap.
	pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
		self.max_delay = if max_delay.is_negative() { Duration::ZERO } else { max_delay };

		self
	}

	/// Attempts performed before giving up, counting the first one.
	pub fn total_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Backoff before retry number `retry` (zero-based): `base_delay × 2^retry`, capped.
	pub fn backoff(&self, retry: u32) -> Duration {
		let factor = 2_i32.checked_pow(retry).unwrap_or(i32::MAX);

		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Decides whether retry number `retry` may run and how long to wait first.
	///
	/// A `Retry-After` hint longer than the computed backoff wins, still bounded by
	/// `max_delay`.
	pub(crate) fn decide(&self, retry: u32, retry_after: Option<Duration>) -> RetryDecision {
		if retry >= self.max_retries {
			return RetryDecision::Stop;
		}

		let backoff = self.backoff(retry);
		let delay = retry_after.map_or(backoff, |hint| hint.max(backoff)).min(self.max_delay);

		RetryDecision::RetryAfter(delay)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BASE_DELAY)
	}
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryDecision {
	RetryAfter(Duration),
	Stop,
}
