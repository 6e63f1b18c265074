// std
use std::time::Duration as StdDuration;
// self
use crate::obs::{FlowKind, FlowOutcome};

/// Increments `oidc_session_flow_total` for `kind` + `outcome` (when metrics are enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oidc_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how long a finished flow took in `oidc_session_flow_duration_seconds`.
///
/// Only terminal outcomes carry a meaningful latency; attempts are ignored.
pub fn record_flow_duration(kind: FlowKind, outcome: FlowOutcome, elapsed: StdDuration) {
	if outcome == FlowOutcome::Attempt {
		return;
	}

	#[cfg(feature = "metrics")]
	{
		metrics::histogram!(
			"oidc_session_flow_duration_seconds",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.record(elapsed.as_secs_f64());
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, elapsed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recording_without_a_recorder_is_silent() {
		record_flow_outcome(FlowKind::Gateway, FlowOutcome::Attempt);
		record_flow_outcome(FlowKind::Logout, FlowOutcome::Failure);
		record_flow_duration(FlowKind::Refresh, FlowOutcome::Success, StdDuration::from_millis(12));
		record_flow_duration(FlowKind::Refresh, FlowOutcome::Attempt, StdDuration::ZERO);
	}
}
