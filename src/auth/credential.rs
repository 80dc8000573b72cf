//! Bearer credential issued by the identity endpoint.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Immutable bearer credential; replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	access_token: TokenSecret,
	issued_at: OffsetDateTime,
	expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential that is valid until `expires_at`.
	pub fn new(
		access_token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { access_token: TokenSecret::new(access_token), issued_at, expires_at }
	}

	/// Creates a credential from a relative lifetime.
	///
	/// Returns `None` when `issued_at + lifetime` falls outside the representable range.
	pub fn issued_for(
		access_token: impl Into<String>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Option<Self> {
		let expires_at = issued_at.checked_add(lifetime)?;

		Some(Self::new(access_token, issued_at, expires_at))
	}

	/// Bearer token secret.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Instant the identity endpoint issued the credential.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Instant after which the credential must not be used.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` when the credential stays valid for longer than `skew` after `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		instant.checked_add(skew).is_some_and(|at| !self.is_expired_at(at))
	}

	/// `Authorization` header value for this credential.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	/// Redacted identifier suitable for traces.
	pub fn fingerprint(&self) -> String {
		self.access_token.fingerprint()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
