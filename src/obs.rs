//! Optional observability hooks for pipeline operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `oauth2_pipeline.operation` carrying the `operation`
//!   and `stage` fields, plus a debug event for every transport send.
//! - Enable `metrics` to increment `oauth2_pipeline_operation_total` (labeled by `operation`
//!   and `outcome`) and `oauth2_pipeline_send_total` (labeled by status class), and to record
//!   backoff waits on the `oauth2_pipeline_backoff_seconds` histogram.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline operations observed by the hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Credential issuance against the identity endpoint.
	TokenIssuance,
	/// Account-context lookup.
	ContextFetch,
	/// Caller-facing `execute` calls.
	Execute,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::TokenIssuance => "token_issuance",
			OperationKind::ContextFetch => "context_fetch",
			OperationKind::Execute => "execute",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to the operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Another attempt was scheduled.
	Retry,
}
impl OperationOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Failure => "failure",
			OperationOutcome::Retry => "retry",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
