//! Single-flight caches for the credential and the account context.
//!
//! Both stores follow the same discipline, implemented once by [`SingleFlight`]: zero or one
//! cached value plus zero or one in-progress refresh. Readers that find a valid cached value
//! return it without touching the network; readers that arrive while a refresh runs join it
//! and observe exactly its outcome, success or failure.

pub mod context;
pub mod token;

pub use context::*;
pub use token::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::_prelude::*;

type SharedFlight<T, E> = Shared<BoxFuture<'static, Result<T, Arc<E>>>>;

/// Cache cell that lets at most one refresh run at a time.
///
/// The lock is held only to read or swap state, never across an `.await`, so readers of an
/// already valid value never wait on an in-flight refresh.
pub struct SingleFlight<T, E> {
	state: Mutex<FlightState<T, E>>,
}
impl<T, E> SingleFlight<T, E>
where
	T: 'static + Clone + Send + Sync,
	E: 'static + Send + Sync,
{
	/// Creates an empty cell.
	pub fn new() -> Self {
		Self { state: Mutex::new(FlightState { cached: None, pending: None, next_id: 0 }) }
	}

	/// Returns the cached value when `is_valid` accepts it.
	pub fn peek(&self, is_valid: impl Fn(&T) -> bool) -> Option<T> {
		self.state.lock().cached.as_ref().filter(|value| is_valid(value)).cloned()
	}

	/// Returns a valid cached value or the outcome of the (possibly shared) refresh.
	///
	/// `refresh` is only invoked when no valid value is cached and no refresh is running.
	/// Every waiter of one refresh receives a clone of the same `Arc` on failure.
	pub async fn get_or_refresh<F>(
		&self,
		is_valid: impl Fn(&T) -> bool,
		refresh: F,
	) -> Result<T, Arc<E>>
	where
		F: FnOnce() -> BoxFuture<'static, Result<T, E>>,
	{
		let (id, flight) = {
			let mut state = self.state.lock();

			if let Some(value) = state.cached.as_ref().filter(|value| is_valid(value)) {
				return Ok(value.clone());
			}

			match state.pending.clone() {
				Some(pending) => pending,
				None => {
					let id = state.next_id;
					let flight = refresh().map(|result| result.map_err(Arc::new)).boxed().shared();

					state.next_id += 1;
					state.pending = Some((id, flight.clone()));

					(id, flight)
				},
			}
		};
		let result = flight.await;
		let mut state = self.state.lock();

		if matches!(&state.pending, Some((pending, _)) if *pending == id) {
			state.pending = None;

			if let Ok(value) = &result {
				state.cached = Some(value.clone());
			}
		}

		result
	}

	/// Drops the cached value; an in-progress refresh is left running.
	pub fn invalidate(&self) {
		self.state.lock().cached = None;
	}

	/// Drops the cached value only when `is_stale` accepts it.
	pub fn invalidate_if(&self, is_stale: impl FnOnce(&T) -> bool) {
		let mut state = self.state.lock();

		if state.cached.as_ref().is_some_and(is_stale) {
			state.cached = None;
		}
	}

	/// Returns `true` while a refresh is in progress.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().pending.is_some()
	}
}
impl<T, E> Default for SingleFlight<T, E>
where
	T: 'static + Clone + Send + Sync,
	E: 'static + Send + Sync,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<T, E> Debug for SingleFlight<T, E> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("SingleFlight")
			.field("cached", &state.cached.is_some())
			.field("refreshing", &state.pending.is_some())
			.finish()
	}
}

struct FlightState<T, E> {
	cached: Option<T>,
	pending: Option<(u64, SharedFlight<T, E>)>,
	next_id: u64,
}

/// Thread-safe counters describing one store's cache behaviour.
#[derive(Debug, Default)]
pub struct StoreMetrics {
	issued: AtomicU64,
	cache_hits: AtomicU64,
	failures: AtomicU64,
}
impl StoreMetrics {
	/// Number of network refreshes started.
	pub fn issued(&self) -> u64 {
		self.issued.load(Ordering::Relaxed)
	}

	/// Number of fetches served from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Number of refreshes that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_issued(&self) {
		self.issued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
