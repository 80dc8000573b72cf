//! One-shot recovery from HTTP 401 responses.

// self
use crate::{_prelude::*, http::ApiResponse, store::TokenStore};

/// Decides whether a 401 should discard the cached credential and trigger a single resend.
///
/// Only the first 401 of an `execute` call is recovered; the resend's outcome is final as far
/// as this policy is concerned, and recovery never consumes a backoff attempt.
#[derive(Clone, Debug, Default)]
pub struct UnauthorizedRecovery {
	token_store: Option<Arc<TokenStore>>,
}
impl UnauthorizedRecovery {
	/// Recovers by invalidating `token_store`.
	pub fn on_unauthorized(token_store: Arc<TokenStore>) -> Self {
		Self { token_store: Some(token_store) }
	}

	/// Never recovers; every 401 is returned as-is.
	pub fn disabled() -> Self {
		Self { token_store: None }
	}

	/// Returns `true` when `response` should trigger the one forced refresh for this call.
	pub fn should_recover(&self, response: &ApiResponse, already_recovered: bool) -> bool {
		self.token_store.is_some() && !already_recovered && response.is_unauthorized()
	}

	/// Discards the credential the rejected request carried so the next injector pass fetches
	/// a fresh one.
	///
	/// `presented` is the rejected request's `Authorization` value. When another call has
	/// already replaced that credential the cache is left alone; without a value the cache is
	/// cleared unconditionally.
	pub fn recover(&self, presented: Option<&str>) {
		let Some(store) = &self.token_store else {
			return;
		};

		match presented {
			Some(presented) => store.invalidate_stale(presented),
			None => store.invalidate(),
		}
	}
}
