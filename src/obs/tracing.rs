// crates.io
use uuid::Uuid;
// self
use crate::{_prelude::*, obs::FlowKind};

/// Instrumented future when tracing is enabled, the bare future otherwise.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// `oidc_session.flow` span tagged with the flow kind, the call site, and (for gateway calls)
/// the request id.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oidc_session.flow",
				flow = kind.as_str(),
				stage,
				request_id = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Attaches the correlation id sent upstream as `x-request-id`.
	pub fn with_request_id(self, request_id: Uuid) -> Self {
		#[cfg(feature = "tracing")]
		{
			self.span.record("request_id", tracing::field::display(request_id));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = request_id;
		}

		self
	}

	/// Enters the span for a synchronous section such as building the authorize redirect.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async flow without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Guard returned by [`FlowSpan::entered`]; the span closes when it drops.
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn guard_debug_is_opaque() {
		let guard = FlowSpan::new(FlowKind::AuthorizationCode, "login").entered();

		assert_eq!(format!("{guard:?}"), "FlowSpanGuard(..)");
	}

	#[tokio::test]
	async fn request_spans_wrap_gateway_futures() {
		let span = FlowSpan::new(FlowKind::Gateway, "send").with_request_id(Uuid::new_v4());

		assert_eq!(span.instrument(async { 200_u16 }).await, 200);
	}
}
