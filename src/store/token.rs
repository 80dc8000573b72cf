//! Credential cache in front of the identity endpoint.

// crates.io
use futures::FutureExt;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	clock::Clock,
	error::AcquisitionError,
	oauth::CredentialIssuer,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	store::{SingleFlight, StoreMetrics},
};

/// Owns the bearer credential shared by every pipeline call.
///
/// A cached credential is handed out only while it stays valid for longer than the configured
/// expiry skew; otherwise [`TokenStore::fetch`] starts (or joins) a single issuance. Issuance
/// is never retried here.
pub struct TokenStore {
	issuer: Arc<CredentialIssuer>,
	clock: Arc<dyn Clock>,
	flight: SingleFlight<Credential, AcquisitionError>,
	metrics: Arc<StoreMetrics>,
}
impl TokenStore {
	/// Creates an empty store backed by `issuer`.
	pub fn new(issuer: CredentialIssuer, clock: Arc<dyn Clock>) -> Self {
		Self {
			issuer: Arc::new(issuer),
			clock,
			flight: SingleFlight::new(),
			metrics: Default::default(),
		}
	}

	/// Returns the cached credential or the outcome of a (shared) issuance.
	pub async fn fetch(&self) -> Result<Credential> {
		if let Some(credential) = self.cached() {
			self.metrics.record_cache_hit();

			return Ok(credential);
		}

		let now = self.clock.now();
		let skew = self.issuer.identity().expiry_skew;
		let issuer = self.issuer.clone();
		let metrics = self.metrics.clone();

		self.flight
			.get_or_refresh(
				|credential| credential.is_usable_at(now, skew),
				move || issue(issuer, metrics).boxed(),
			)
			.await
			.map_err(Error::CredentialAcquisition)
	}

	/// Drops the cached credential; the next [`TokenStore::fetch`] goes to the network.
	pub fn invalidate(&self) {
		self.flight.invalidate();
	}

	/// Drops the cached credential only if it still carries the `Authorization` value
	/// `presented`; a credential installed by a newer issuance is kept.
	pub fn invalidate_stale(&self, presented: &str) {
		self.flight.invalidate_if(|credential| credential.bearer() == presented);
	}

	/// Peeks at the cached credential without any network activity.
	pub fn cached(&self) -> Option<Credential> {
		let now = self.clock.now();
		let skew = self.issuer.identity().expiry_skew;

		self.flight.peek(|credential| credential.is_usable_at(now, skew))
	}

	/// Issuance counters.
	pub fn metrics(&self) -> &StoreMetrics {
		&self.metrics
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("issuer", &self.issuer)
			.field("flight", &self.flight)
			.field("metrics", &self.metrics)
			.finish()
	}
}

async fn issue(
	issuer: Arc<CredentialIssuer>,
	metrics: Arc<StoreMetrics>,
) -> Result<Credential, AcquisitionError> {
	const KIND: OperationKind = OperationKind::TokenIssuance;

	let span = OperationSpan::new(KIND, "issue");

	obs::record_operation(KIND, OperationOutcome::Attempt);
	metrics.record_issued();

	let result = span.instrument(async { issuer.issue().await }).await;

	match &result {
		Ok(credential) => {
			obs::trace_issued(credential);
			obs::record_operation(KIND, OperationOutcome::Success);
		},
		Err(_) => {
			metrics.record_failure();
			obs::record_operation(KIND, OperationOutcome::Failure);
		},
	}

	result
}
