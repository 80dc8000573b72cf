// self
use crate::{_prelude::*, auth::Credential, obs::OperationKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// Span wrapper used by stores and the pipeline.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a span tagged with the operation kind + stage.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("oauth2_pipeline.operation", operation = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments a future without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
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

/// Emits a debug event describing one transport send.
pub fn trace_send(attempt: u32, method: &str, url: &Url, status: Option<u16>) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, method, url = %url, status, "request sent");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, method, url, status);
	}
}

/// Emits a debug event identifying a freshly issued credential by fingerprint only.
pub fn trace_issued(credential: &Credential) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			fingerprint = %credential.fingerprint(),
			expires_at = %credential.expires_at(),
			"credential issued"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = credential;
	}
}

/// Emits a debug event describing a scheduled retry.
pub fn trace_retry(attempt: u32, delay: StdDuration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay);
	}
}
