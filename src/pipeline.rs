//! Request execution: ordered injectors, transport send, and the two retry policies.
//!
//! Each [`RequestPipeline::execute`] call clones the caller's template, runs every injector in
//! declared order, and sends the result. A first HTTP 401 goes to [`UnauthorizedRecovery`],
//! which discards the cached credential so the resend picks up a new one. Transient outcomes
//! go to the [`BackoffPolicy`], which decides whether and when to send again. Everything else,
//! including non-2xx responses, is handed back to the caller untouched.
//!
//! A configured timeout bounds the whole call, injector work and backoff waits included.

pub mod injector;

pub use injector::*;

// std
use std::pin::pin;
// crates.io
use futures::future::{self, Either};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	http::{ApiRequest, ApiResponse, ApiTransport, header},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	retry::{AttemptOutcome, BackoffPolicy, UnauthorizedRecovery},
};

/// Composes injectors, a transport, and the retry policies.
pub struct RequestPipeline {
	transport: Arc<dyn ApiTransport>,
	clock: Arc<dyn Clock>,
	injectors: Vec<Arc<dyn Injector>>,
	recovery: UnauthorizedRecovery,
	backoff: BackoffPolicy,
	timeout: Option<StdDuration>,
}
impl RequestPipeline {
	/// Starts a pipeline over `transport`, timed by `clock`.
	pub fn builder(
		transport: Arc<dyn ApiTransport>,
		clock: Arc<dyn Clock>,
	) -> RequestPipelineBuilder {
		RequestPipelineBuilder {
			transport,
			clock,
			injectors: Vec::new(),
			recovery: UnauthorizedRecovery::disabled(),
			backoff: BackoffPolicy::none(),
			timeout: None,
		}
	}

	/// Injector labels in execution order.
	pub fn injector_names(&self) -> Vec<&'static str> {
		self.injectors.iter().map(|injector| injector.name()).collect()
	}

	/// Backoff policy applied to transient outcomes.
	pub fn backoff(&self) -> &BackoffPolicy {
		&self.backoff
	}

	/// Sends `template` through the pipeline.
	///
	/// Returns the first response that neither policy wants to retry, the last response or
	/// error once the attempt bound is reached, or [`Error::Timeout`] when the deadline
	/// elapses first. Injector failures abort the call immediately.
	pub async fn execute(&self, template: &ApiRequest) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Execute;

		let span = OperationSpan::new(KIND, "execute");

		obs::record_operation(KIND, OperationOutcome::Attempt);

		let result = span.instrument(self.execute_within_deadline(template)).await;

		match &result {
			Ok(_) => obs::record_operation(KIND, OperationOutcome::Success),
			Err(_) => obs::record_operation(KIND, OperationOutcome::Failure),
		}

		result
	}

	async fn execute_within_deadline(&self, template: &ApiRequest) -> Result<ApiResponse> {
		let Some(limit) = self.timeout else {
			return self.run(template, None).await;
		};
		let budget = Budget::starting_at(self.clock.now(), limit);
		let run = pin!(self.run(template, budget));
		let timer = self.clock.deadline(limit);

		match future::select(run, timer).await {
			Either::Left((result, _)) => result,
			Either::Right(((), _)) => Err(Error::Timeout { deadline: limit }),
		}
	}

	async fn run(&self, template: &ApiRequest, budget: Option<Budget>) -> Result<ApiResponse> {
		let mut attempt = 0;
		let mut recovered = false;
		let mut previous_delay = StdDuration::ZERO;

		loop {
			attempt += 1;

			let request = self.prepare(template).await?;
			let presented = request.header(header::AUTHORIZATION.as_str()).map(str::to_owned);
			let mut outcome = self.send(attempt, request).await;

			if let Ok(response) = &outcome {
				if self.recovery.should_recover(response, recovered) {
					recovered = true;
					self.recovery.recover(presented.as_deref());
					obs::record_operation(OperationKind::Execute, OperationOutcome::Retry);

					outcome = match self.prepare(template).await {
						Ok(request) => self.send(attempt, request).await,
						Err(_) => return outcome,
					};
				}
			}

			let now = self.clock.now();
			let classified = match &outcome {
				Ok(response) => AttemptOutcome::Response(response),
				Err(err) => AttemptOutcome::Error(err),
			};
			let Some(delay) = self.backoff.next_delay(attempt, classified, now, previous_delay)
			else {
				return outcome;
			};

			if let Some(budget) = budget {
				if delay >= budget.remaining(now) {
					return Err(Error::Timeout { deadline: budget.limit });
				}
			}

			previous_delay = delay;

			obs::record_operation(OperationKind::Execute, OperationOutcome::Retry);
			obs::record_backoff(delay);
			obs::trace_retry(attempt, delay);
			self.clock.sleep(delay).await;
		}
	}

	async fn prepare(&self, template: &ApiRequest) -> Result<ApiRequest> {
		let mut request = template.clone();

		for injector in &self.injectors {
			request = injector.mutate(request).await?;
		}

		Ok(request)
	}

	async fn send(&self, attempt: u32, request: ApiRequest) -> Result<ApiResponse> {
		let method = request.method.clone();
		let url = request.url.clone();
		let result = self.transport.send(request).await.map_err(Error::from);
		let status = result.as_ref().ok().map(ApiResponse::status_code);

		obs::record_send(status);
		obs::trace_send(attempt, method.as_str(), &url, status);

		result
	}
}
impl Debug for RequestPipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("injectors", &self.injector_names())
			.field("recovery", &self.recovery)
			.field("backoff", &self.backoff)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Builder for [`RequestPipeline`].
pub struct RequestPipelineBuilder {
	transport: Arc<dyn ApiTransport>,
	clock: Arc<dyn Clock>,
	injectors: Vec<Arc<dyn Injector>>,
	recovery: UnauthorizedRecovery,
	backoff: BackoffPolicy,
	timeout: Option<StdDuration>,
}
impl RequestPipelineBuilder {
	/// Appends an injector; injectors run in the order they are added.
	pub fn injector(mut self, injector: impl 'static + Injector) -> Self {
		self.injectors.push(Arc::new(injector));

		self
	}

	/// Sets the 401 recovery rule (disabled by default).
	pub fn recovery(mut self, recovery: UnauthorizedRecovery) -> Self {
		self.recovery = recovery;

		self
	}

	/// Sets the backoff policy (no retries by default).
	pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}

	/// Bounds every call by `timeout`.
	pub fn timeout(mut self, timeout: Option<StdDuration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Finalizes the pipeline.
	pub fn build(self) -> RequestPipeline {
		RequestPipeline {
			transport: self.transport,
			clock: self.clock,
			injectors: self.injectors,
			recovery: self.recovery,
			backoff: self.backoff,
			timeout: self.timeout,
		}
	}
}
impl Debug for RequestPipelineBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipelineBuilder").finish_non_exhaustive()
	}
}

#[derive(Clone, Copy, Debug)]
struct Budget {
	limit: StdDuration,
	until: OffsetDateTime,
}
impl Budget {
	fn starting_at(now: OffsetDateTime, limit: StdDuration) -> Option<Self> {
		let until = now.checked_add(Duration::try_from(limit).ok()?)?;

		Some(Self { limit, until })
	}

	fn remaining(&self, now: OffsetDateTime) -> StdDuration {
		StdDuration::try_from(self.until - now).unwrap_or_default()
	}
}
