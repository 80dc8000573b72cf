//! Time source used for expiry checks, backoff delays, and per-call deadlines.
//!
//! Production code runs on [`SystemClock`] (UTC wall clock + tokio timers). Tests swap in
//! [`ManualClock`], whose time only moves when the pipeline sleeps for a backoff delay or the
//! test calls [`ManualClock::advance`], so retry schedules can be asserted without waiting.

// std
use std::task::{Context, Poll, Waker};
// self
use crate::_prelude::*;

/// Boxed timer future returned by [`Clock`] implementations.
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Replaceable source of "now" and of timers.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Current instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends for a backoff delay.
	fn sleep(&self, duration: StdDuration) -> SleepFuture;

	/// Timer that bounds a whole call. Defaults to [`Clock::sleep`].
	fn deadline(&self, duration: StdDuration) -> SleepFuture {
		self.sleep(duration)
	}
}

/// Wall clock backed by tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: StdDuration) -> SleepFuture {
		Box::pin(tokio::time::sleep(duration))
	}
}

/// Deterministic clock for tests.
///
/// Backoff sleeps complete immediately, advance virtual time by the requested amount, and are
/// recorded for inspection. Deadline timers fire once virtual time passes them.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<ManualState>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		let state =
			ManualState { now: start, sleeps: Vec::new(), timers: Vec::new(), next_timer: 0 };

		Self(Arc::new(Mutex::new(state)))
	}

	/// Moves virtual time forward and fires any due deadline timers.
	pub fn advance(&self, by: Duration) {
		let due = {
			let mut state = self.0.lock();

			state.now = state.now.saturating_add(by);

			state.take_due()
		};

		due.into_iter().for_each(Waker::wake);
	}

	/// Backoff delays requested so far, in order.
	pub fn sleeps(&self) -> Vec<StdDuration> {
		self.0.lock().sleeps.clone()
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(OffsetDateTime::UNIX_EPOCH)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		self.0.lock().now
	}

	fn sleep(&self, duration: StdDuration) -> SleepFuture {
		self.0.lock().sleeps.push(duration);
		self.advance(Duration::try_from(duration).unwrap_or(Duration::MAX));

		Box::pin(std::future::ready(()))
	}

	fn deadline(&self, duration: StdDuration) -> SleepFuture {
		let mut state = self.0.lock();
		let until = state.now.saturating_add(Duration::try_from(duration).unwrap_or(Duration::MAX));
		let id = state.next_timer;

		state.next_timer += 1;

		Box::pin(ManualTimer { state: self.0.clone(), id, until })
	}
}

#[derive(Debug)]
struct ManualState {
	now: OffsetDateTime,
	sleeps: Vec<StdDuration>,
	timers: Vec<PendingTimer>,
	next_timer: u64,
}
impl ManualState {
	fn take_due(&mut self) -> Vec<Waker> {
		let now = self.now;
		let (due, pending) =
			self.timers.drain(..).partition::<Vec<_>, _>(|timer| timer.until <= now);

		self.timers = pending;

		due.into_iter().map(|timer| timer.waker).collect()
	}

	fn register(&mut self, id: u64, until: OffsetDateTime, waker: &Waker) {
		match self.timers.iter_mut().find(|timer| timer.id == id) {
			Some(timer) => timer.waker.clone_from(waker),
			None => self.timers.push(PendingTimer { id, until, waker: waker.clone() }),
		}
	}
}

#[derive(Debug)]
struct PendingTimer {
	id: u64,
	until: OffsetDateTime,
	waker: Waker,
}

struct ManualTimer {
	state: Arc<Mutex<ManualState>>,
	id: u64,
	until: OffsetDateTime,
}
impl Future for ManualTimer {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut state = self.state.lock();

		if state.now >= self.until {
			return Poll::Ready(());
		}

		state.register(self.id, self.until, cx.waker());

		Poll::Pending
	}
}
impl Drop for ManualTimer {
	fn drop(&mut self) {
		self.state.lock().timers.retain(|timer| timer.id != self.id);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn manual_sleep_advances_and_records() {
		let clock = ManualClock::default();
		let start = clock.now();

		clock.sleep(StdDuration::from_secs(2)).await;
		clock.sleep(StdDuration::from_secs(4)).await;

		assert_eq!(clock.now() - start, Duration::seconds(6));
		assert_eq!(clock.sleeps(), vec![StdDuration::from_secs(2), StdDuration::from_secs(4)]);
	}

	#[tokio::test]
	async fn manual_deadline_fires_after_virtual_time_passes() {
		let clock = ManualClock::default();
		let timer = tokio::spawn(clock.deadline(StdDuration::from_secs(10)));

		tokio::task::yield_now().await;
		clock.advance(Duration::seconds(5));

		assert!(!timer.is_finished());

		clock.advance(Duration::seconds(5));
		timer.await.expect("Deadline timer task should complete once time passes.");

		assert!(clock.sleeps().is_empty());
	}

	#[test]
	fn repolled_timers_keep_a_single_registration() {
		let clock = ManualClock::default();
		let mut timer = clock.deadline(StdDuration::from_secs(10));
		let waker = futures::task::noop_waker();
		let mut cx = Context::from_waker(&waker);

		for _ in 0..16 {
			assert!(timer.as_mut().poll(&mut cx).is_pending());
		}

		assert_eq!(clock.0.lock().timers.len(), 1);

		clock.advance(Duration::seconds(10));

		assert!(timer.as_mut().poll(&mut cx).is_ready());
		assert!(clock.0.lock().timers.is_empty());

		let mut abandoned = clock.deadline(StdDuration::from_secs(5));

		assert!(abandoned.as_mut().poll(&mut cx).is_pending());
		assert_eq!(clock.0.lock().timers.len(), 1);

		drop(abandoned);

		assert!(clock.0.lock().timers.is_empty());
	}
}
