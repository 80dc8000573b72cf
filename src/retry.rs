//! Retry policies applied by the request pipeline.
//!
//! Two independent decision functions run per attempt: [`UnauthorizedRecovery`] handles the
//! first HTTP 401 of a call by discarding the cached credential and resending once, and
//! [`BackoffPolicy`] schedules delayed resends for transient failures. They never share an
//! attempt budget.

pub mod backoff;
pub mod unauthorized;

pub use backoff::*;
pub use unauthorized::*;
