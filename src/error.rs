//! Pipeline-level error taxonomy shared by stores, injectors, and the retry loop.

// self
use crate::_prelude::*;

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical pipeline error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The identity endpoint could not issue a credential.
	///
	/// Every caller that waited on the same refresh receives a clone of the same [`Arc`].
	#[error("Credential acquisition failed: {0}")]
	CredentialAcquisition(#[source] Arc<AcquisitionError>),
	/// The account-context endpoint could not produce a context value.
	#[error("Context acquisition failed: {0}")]
	ContextAcquisition(#[source] Arc<ContextError>),
	/// An injector could not build its contribution to the outbound request.
	#[error(transparent)]
	Injector(#[from] InjectorError),
	/// Transport failure (DNS, TCP, TLS); retryable under the backoff policy.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Non-success HTTP status surfaced via [`crate::http::ApiResponse::error_for_status`].
	#[error(transparent)]
	Status(#[from] StatusError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The per-call deadline elapsed before the pipeline finished.
	#[error("Request did not complete within {deadline:?}.")]
	Timeout {
		/// Deadline configured for the call.
		deadline: StdDuration,
	},
}
impl Error {
	/// Returns the HTTP status carried by the error, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status(err) => Some(err.status),
			Self::CredentialAcquisition(err) => err.status(),
			Self::ContextAcquisition(err) => err.status(),
			_ => None,
		}
	}
}

/// Failures raised while exchanging a client assertion for a credential.
#[derive(Debug, ThisError)]
pub enum AcquisitionError {
	/// The identity endpoint could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The identity endpoint rejected the assertion with an OAuth error body.
	#[error("Identity endpoint rejected the assertion: {error}.")]
	Rejected {
		/// OAuth `error` code (for example `invalid_client`).
		error: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// `Retry-After` hint sent with the rejection, when present.
		retry_after: Option<StdDuration>,
	},
	/// The identity endpoint responded with JSON that does not match the token schema.
	#[error("Identity endpoint returned malformed JSON.")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The identity endpoint returned something that is neither a token nor an OAuth error.
	#[error("Identity endpoint returned an unexpected response: {message}.")]
	InvalidResponse {
		/// Human-readable summary of the unexpected reply.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token response omitted `expires_in`.
	#[error("Token response is missing expires_in.")]
	MissingExpiresIn,
	/// Token response carried an `expires_in` that does not fit the clock range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token response carried a non-positive lifetime.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// The client assertion could not be produced.
	#[error(transparent)]
	Assertion(#[from] crate::auth::AssertionError),
	/// The token request could not be assembled.
	#[error(transparent)]
	Request(#[from] oauth2::http::Error),
}
impl AcquisitionError {
	/// HTTP status code reported by the identity endpoint, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::Malformed { status, .. }
			| Self::InvalidResponse { status, .. } => *status,
			_ => None,
		}
	}

	/// How long the identity endpoint asked callers to wait before trying again, if it said.
	pub fn retry_after(&self) -> Option<StdDuration> {
		match self {
			Self::Rejected { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

/// Failures raised while resolving the per-account context value.
#[derive(Debug, ThisError)]
pub enum ContextError {
	/// The context request failed before a response was produced.
	#[error("Context request failed: {0}")]
	Request(#[source] Box<Error>),
	/// The context endpoint answered with a non-success status (401 included).
	#[error("Context endpoint returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// The context payload could not be decoded.
	#[error("Context endpoint returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The payload did not contain a usable account.
	#[error("Context endpoint did not list a matching account.")]
	NoAccount,
}
impl ContextError {
	/// HTTP status code behind the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status } => Some(*status),
			Self::Request(err) => err.status(),
			_ => None,
		}
	}
}

/// Injector failures; each aborts the attempt before anything is sent.
#[derive(Debug, ThisError)]
pub enum InjectorError {
	/// Header value contains bytes HTTP does not allow.
	#[error("Value for header `{name}` is invalid.")]
	InvalidHeaderValue {
		/// Header whose value was rejected.
		name: String,
	},
	/// The request URL could not be pointed at the configured host.
	#[error("Request URL `{url}` cannot be rewritten to the configured host.")]
	HostRewrite {
		/// URL that failed the rewrite.
		url: String,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The transport gave up waiting for a single response.
	#[error("Transport timed out while waiting for a response.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Non-success HTTP status returned by the remote API.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Remote API returned HTTP {status}.")]
pub struct StatusError {
	/// HTTP status code.
	pub status: u16,
	/// Leading bytes of the response body, lossily decoded.
	pub body_preview: Option<String>,
}

/// Configuration and validation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Builder failure summary.
		message: String,
	},
	/// A required endpoint was not configured.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// An endpoint URL cannot be used.
	#[error("The {endpoint} endpoint is invalid: {url}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL (or path) that failed validation.
		url: String,
	},
	/// A client-credential identifier is empty.
	#[error("Client credential field `{field}` must not be empty.")]
	EmptyCredentialField {
		/// Name of the empty field.
		field: &'static str,
	},
	/// A static header cannot be represented on the wire.
	#[error("Static header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Backoff configuration is inconsistent.
	#[error("Backoff policy is invalid: {reason}.")]
	InvalidBackoff {
		/// Why the policy was rejected.
		reason: &'static str,
	},
	/// A request template path cannot be joined onto the base URL.
	#[error("Request path `{path}` cannot be joined onto the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
	},
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::HttpClientBuild { message: e.to_string() }
	}
}
