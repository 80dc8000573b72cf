//! Per-account context value attached alongside the bearer credential.

// self
use crate::_prelude::*;

/// Opaque per-account authorization datum with a validity window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextValue {
	value: String,
	expires_at: OffsetDateTime,
}
impl ContextValue {
	/// Creates a context value that stays valid until `expires_at`.
	pub fn new(value: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { value: value.into(), expires_at }
	}

	/// Header-ready representation (for example `orgId=1234`).
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Instant after which the value is refreshed.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Returns `true` while the value may still be attached to requests.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}
}
