// self
use crate::{
	_prelude::*,
	obs::{OperationKind, OperationOutcome},
};

/// Counts one operation outcome on `oauth2_pipeline_operation_total`.
pub fn record_operation(kind: OperationKind, outcome: OperationOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_pipeline_operation_total",
			"operation" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts one transport send on `oauth2_pipeline_send_total`, labeled by status class.
pub fn record_send(status: Option<u16>) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_pipeline_send_total", "status" => status_class(status))
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = status;
	}
}

/// Observes a scheduled backoff wait on `oauth2_pipeline_backoff_seconds`.
pub fn record_backoff(delay: StdDuration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("oauth2_pipeline_backoff_seconds").record(delay.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = delay;
	}
}

/// Collapses a status code into a low-cardinality label; `None` means no response arrived.
pub const fn status_class(status: Option<u16>) -> &'static str {
	match status {
		None => "transport_error",
		Some(100..=199) => "1xx",
		Some(200..=299) => "2xx",
		Some(300..=399) => "3xx",
		Some(401) => "401",
		Some(400..=499) => "4xx",
		Some(500..=599) => "5xx",
		Some(_) => "other",
	}
}
