//! Account-context cache backed by the context endpoint.

// crates.io
use futures::FutureExt;
// self
use crate::{
	_prelude::*,
	auth::ContextValue,
	clock::Clock,
	error::ContextError,
	http::ApiRequest,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	pipeline::RequestPipeline,
	store::{SingleFlight, StoreMetrics},
};

/// Turns a successful context-endpoint body into the header value.
pub trait ContextDecoder
where
	Self: Send + Sync,
{
	/// Decodes `body`; the returned string is attached to requests verbatim.
	fn decode(&self, body: &[u8]) -> Result<String, ContextError>;
}

/// Decodes an ACL listing (`{"data":[{"orgId":…},…]}`) into `orgId=<id>`.
#[derive(Clone, Debug, Default)]
pub struct AclContextDecoder {
	org_id: Option<u64>,
}
impl AclContextDecoder {
	/// Picks the first listed account.
	pub fn new() -> Self {
		Self::default()
	}

	/// Picks the account with `org_id`, failing when the listing does not include it.
	pub fn for_org(org_id: u64) -> Self {
		Self { org_id: Some(org_id) }
	}
}
impl ContextDecoder for AclContextDecoder {
	fn decode(&self, body: &[u8]) -> Result<String, ContextError> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);
		let listing: AclListing = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ContextError::Decode { source })?;
		let entry = match self.org_id {
			Some(org_id) => listing.data.iter().find(|entry| entry.org_id == org_id),
			None => listing.data.first(),
		}
		.ok_or(ContextError::NoAccount)?;

		Ok(format!("orgId={}", entry.org_id))
	}
}

#[derive(Deserialize)]
struct AclListing {
	data: Vec<AclEntry>,
}

#[derive(Deserialize)]
struct AclEntry {
	#[serde(rename = "orgId")]
	org_id: u64,
}

/// Owns the per-account context value.
///
/// Refreshes go through their own [`RequestPipeline`] whose injectors attach the credential,
/// so a 401 from the context endpoint is handled by the same unauthorized recovery as any
/// other call. A failure that survives the pipeline is surfaced unchanged.
pub struct ContextStore {
	fetcher: Arc<ContextFetcher>,
	flight: SingleFlight<ContextValue, ContextError>,
}
impl ContextStore {
	/// Creates an empty store that issues `request` through `pipeline`.
	pub fn new(
		pipeline: RequestPipeline,
		request: ApiRequest,
		decoder: Arc<dyn ContextDecoder>,
		ttl: Duration,
		clock: Arc<dyn Clock>,
	) -> Self {
		let fetcher = ContextFetcher {
			pipeline,
			request,
			decoder,
			ttl,
			clock,
			metrics: Default::default(),
		};

		Self { fetcher: Arc::new(fetcher), flight: SingleFlight::new() }
	}

	/// Returns the cached value or the outcome of a (shared) refresh.
	pub async fn fetch(&self) -> Result<ContextValue> {
		if let Some(value) = self.cached() {
			self.fetcher.metrics.record_cache_hit();

			return Ok(value);
		}

		let now = self.fetcher.clock.now();
		let fetcher = self.fetcher.clone();

		self.flight
			.get_or_refresh(
				|value| value.is_valid_at(now),
				move || async move { fetcher.refresh().await }.boxed(),
			)
			.await
			.map_err(Error::ContextAcquisition)
	}

	/// Drops the cached value.
	pub fn invalidate(&self) {
		self.flight.invalidate();
	}

	/// Peeks at the cached value without any network activity.
	pub fn cached(&self) -> Option<ContextValue> {
		let now = self.fetcher.clock.now();

		self.flight.peek(|value| value.is_valid_at(now))
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &StoreMetrics {
		&self.fetcher.metrics
	}
}
impl Debug for ContextStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ContextStore")
			.field("url", &self.fetcher.request.url.as_str())
			.field("ttl", &self.fetcher.ttl)
			.field("flight", &self.flight)
			.finish()
	}
}

struct ContextFetcher {
	pipeline: RequestPipeline,
	request: ApiRequest,
	decoder: Arc<dyn ContextDecoder>,
	ttl: Duration,
	clock: Arc<dyn Clock>,
	metrics: StoreMetrics,
}
impl ContextFetcher {
	async fn refresh(&self) -> Result<ContextValue, ContextError> {
		const KIND: OperationKind = OperationKind::ContextFetch;

		let span = OperationSpan::new(KIND, "refresh");

		obs::record_operation(KIND, OperationOutcome::Attempt);
		self.metrics.record_issued();

		let result = span.instrument(self.request_value()).await;

		match &result {
			Ok(_) => obs::record_operation(KIND, OperationOutcome::Success),
			Err(_) => {
				self.metrics.record_failure();
				obs::record_operation(KIND, OperationOutcome::Failure);
			},
		}

		result
	}

	async fn request_value(&self) -> Result<ContextValue, ContextError> {
		let response = self
			.pipeline
			.execute(&self.request)
			.await
			.map_err(|err| ContextError::Request(Box::new(err)))?;

		if !response.is_success() {
			return Err(ContextError::Status { status: response.status_code() });
		}

		let value = self.decoder.decode(&response.body)?;

		Ok(ContextValue::new(value, self.clock.now() + self.ttl))
	}
}
