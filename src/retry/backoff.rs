//! Exponential backoff with an injectable jitter source.

// self
use crate::{_prelude::*, error::ConfigError, http::ApiResponse};

/// Predicate deciding whether an attempt outcome deserves another send.
pub type RetryPredicate = Arc<dyn Fn(AttemptOutcome<'_>) -> bool + Send + Sync>;

/// Result of one send, as seen by [`RetryPredicate`]s.
#[derive(Clone, Copy, Debug)]
pub enum AttemptOutcome<'a> {
	/// The server answered.
	Response(&'a ApiResponse),
	/// The attempt failed before a response arrived.
	Error(&'a Error),
}
impl AttemptOutcome<'_> {
	/// Default classification: HTTP 429, HTTP 5xx, and transport failures are retryable.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Response(response) => {
				let status = response.status_code();

				status == 429 || (500..=599).contains(&status)
			},
			Self::Error(error) => matches!(error, Error::Transport(_)),
		}
	}
}

/// Source of randomness applied to each computed delay.
pub trait JitterSource
where
	Self: Send + Sync,
{
	/// Returns the delay to actually wait; must not exceed `cap`.
	fn apply(&self, delay: StdDuration, cap: StdDuration) -> StdDuration;
}

/// Leaves delays untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoJitter;
impl JitterSource for NoJitter {
	fn apply(&self, delay: StdDuration, _cap: StdDuration) -> StdDuration {
		delay
	}
}

/// Adds up to `factor × delay` of random extra wait, clamped to the cap.
#[derive(Clone, Copy, Debug)]
pub struct RandomJitter {
	factor: f64,
}
impl RandomJitter {
	/// Creates a jitter source; `factor` is clamped to `0.0..=1.0`.
	pub fn new(factor: f64) -> Self {
		Self { factor: factor.clamp(0.0, 1.0) }
	}
}
impl JitterSource for RandomJitter {
	fn apply(&self, delay: StdDuration, cap: StdDuration) -> StdDuration {
		if self.factor == 0.0 {
			return delay;
		}

		let extra = delay.mul_f64(self.factor * rand::random::<f64>());

		delay.saturating_add(extra).min(cap)
	}
}

/// Immutable backoff configuration.
///
/// Attempt indices start at 1 and count every send of one `execute` call, the first one
/// included. With `base_delay = 2s` and `max_delay = 16s` the waits after attempts 1, 2, 3…
/// are 2s, 4s, 8s, 16s, 16s…
#[derive(Clone)]
pub struct BackoffPolicy {
	max_attempts: Option<u32>,
	base_delay: StdDuration,
	max_delay: StdDuration,
	predicate: RetryPredicate,
	jitter: Arc<dyn JitterSource>,
}
impl BackoffPolicy {
	const DEFAULT_MAX_ATTEMPTS: u32 = 5;
	const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_secs(2);
	const DEFAULT_MAX_DELAY: StdDuration = StdDuration::from_secs(16);
	const MAX_EXPONENT: u32 = 31;

	/// Retries transient failures up to 5 total attempts, 2s doubling to 16s.
	pub fn on_retryable_error() -> Self {
		Self::on_retryable_error_with(Self::DEFAULT_MAX_ATTEMPTS)
	}

	/// Same curve as [`BackoffPolicy::on_retryable_error`] with a custom attempt bound.
	pub fn on_retryable_error_with(max_attempts: u32) -> Self {
		Self {
			max_attempts: Some(max_attempts),
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			predicate: Arc::new(retry_transient),
			jitter: Arc::new(NoJitter),
		}
	}

	/// Never retries; the first outcome is final. Unauthorized recovery is unaffected.
	pub fn none() -> Self {
		Self {
			max_attempts: Some(1),
			predicate: Arc::new(retry_never),
			..Self::on_retryable_error()
		}
	}

	/// Sets the total-attempt bound; `None` retries until the predicate declines.
	pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Sets the first delay and the cap.
	pub fn with_delays(mut self, base_delay: StdDuration, max_delay: StdDuration) -> Self {
		self.base_delay = base_delay;
		self.max_delay = max_delay;

		self
	}

	/// Overrides the retry predicate.
	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(AttemptOutcome<'_>) -> bool,
	{
		self.predicate = Arc::new(predicate);

		self
	}

	/// Overrides the jitter source.
	pub fn with_jitter(mut self, jitter: impl 'static + JitterSource) -> Self {
		self.jitter = Arc::new(jitter);

		self
	}

	/// Total-attempt bound.
	pub fn max_attempts(&self) -> Option<u32> {
		self.max_attempts
	}

	/// First delay.
	pub fn base_delay(&self) -> StdDuration {
		self.base_delay
	}

	/// Delay cap.
	pub fn max_delay(&self) -> StdDuration {
		self.max_delay
	}

	/// Rejects inconsistent parameters.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == Some(0) {
			return Err(ConfigError::InvalidBackoff { reason: "max_attempts must be at least 1" });
		}
		if self.base_delay > self.max_delay {
			return Err(ConfigError::InvalidBackoff {
				reason: "base_delay must not exceed max_delay",
			});
		}

		Ok(())
	}

	/// Returns `true` when the predicate accepts `outcome`.
	pub fn is_retryable(&self, outcome: AttemptOutcome<'_>) -> bool {
		(self.predicate)(outcome)
	}

	/// Returns `true` while another send fits in the attempt bound.
	pub fn allows_attempt_after(&self, attempt: u32) -> bool {
		self.max_attempts.is_none_or(|max| attempt < max)
	}

	/// Deterministic wait after `attempt` (1-based), before jitter.
	pub fn delay_for(&self, attempt: u32) -> StdDuration {
		let exponent = attempt.saturating_sub(1).min(Self::MAX_EXPONENT);
		let factor = 2_u32.saturating_pow(exponent);

		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Decides whether to resend after `attempt` and how long to wait first.
	///
	/// A `Retry-After` hint on the response can only lengthen the wait, never past the cap.
	/// `previous` is the last wait of the same call; the returned wait never drops below it,
	/// so a hinted wait is carried forward instead of falling back to the raw curve.
	pub fn next_delay(
		&self,
		attempt: u32,
		outcome: AttemptOutcome<'_>,
		now: OffsetDateTime,
		previous: StdDuration,
	) -> Option<StdDuration> {
		if !self.allows_attempt_after(attempt) || !self.is_retryable(outcome) {
			return None;
		}

		let mut delay = self.delay_for(attempt);

		if let AttemptOutcome::Response(response) = outcome {
			if let Some(hint) = response.retry_after(now) {
				delay = delay.max(hint.min(self.max_delay));
			}
		}

		let delay = self.jitter.apply(delay, self.max_delay);

		Some(delay.max(previous.min(self.max_delay)))
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self::on_retryable_error()
	}
}
impl Debug for BackoffPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BackoffPolicy")
			.field("max_attempts", &self.max_attempts)
			.field("base_delay", &self.base_delay)
			.field("max_delay", &self.max_delay)
			.finish_non_exhaustive()
	}
}

fn retry_transient(outcome: AttemptOutcome<'_>) -> bool {
	outcome.is_transient()
}

fn retry_never(_: AttemptOutcome<'_>) -> bool {
	false
}
