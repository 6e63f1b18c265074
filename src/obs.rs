//! Observability helpers for session flows and gateway calls.
//!
//! # Feature Flags
//!
//! - `tracing` (default) emits structured spans named `oidc_session.flow` with the `flow` and
//!   `stage` (call site) fields, and enables the crate's internal log events.
//! - `metrics` increments the `oidc_session_flow_total` counter for every attempt/success/failure,
//!   labeled by `flow` + `outcome`, and records terminal latencies in the
//!   `oidc_session_flow_duration_seconds` histogram.
//!
//! Gateway spans additionally carry the `request_id` that was sent as `x-request-id`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// std
use std::time::Instant;
// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Flow kinds observed by the session core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Session bootstrap (stored token reuse or silent SSO check).
	Init,
	/// Authorization Code + PKCE login and callback exchange.
	AuthorizationCode,
	/// Refresh token flow.
	Refresh,
	/// Logout and end-session notification.
	Logout,
	/// Profile projection after login.
	Profile,
	/// Backend API request through the gateway.
	Gateway,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Init => "init",
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::Logout => "logout",
			FlowKind::Profile => "profile",
			FlowKind::Gateway => "gateway",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a [`FlowSpan`] and records attempt, terminal outcome, and duration.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	observe_in(FlowSpan::new(kind, stage), kind, fut).await
}

/// [`observe`] for gateway calls; the span carries the `x-request-id` sent upstream.
pub(crate) async fn observe_request<T, Fut>(
	stage: &'static str,
	request_id: Uuid,
	fut: Fut,
) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(FlowKind::Gateway, stage).with_request_id(request_id);

	observe_in(span, FlowKind::Gateway, fut).await
}

async fn observe_in<T, Fut>(span: FlowSpan, kind: FlowKind, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let started = Instant::now();

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);
	record_flow_duration(kind, outcome, started.elapsed());

	result
}
