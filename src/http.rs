//! Transport primitives shared by the request pipeline and the credential exchange.
//!
//! [`ApiTransport`] is the pipeline's only dependency on an HTTP stack: it sends one
//! [`ApiRequest`] and yields an [`ApiResponse`] or a [`TransportError`]. The same transport
//! also carries the identity-endpoint exchange; [`TransportHandle`] adapts it to the
//! `oauth2` crate's [`AsyncHttpClient`] and records [`ResponseMetadata`] so token errors can
//! be classified with the status code and `Retry-After` hint that produced them.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	clock::Clock,
	error::{StatusError, TransportError},
};
pub use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Sends fully decorated requests; supplied by an HTTP client collaborator.
///
/// Implementations never retry on their own. Any response that reaches the server's
/// status line, including 4xx and 5xx, is returned as `Ok` so the pipeline can classify it.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the response body.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Outbound request; cloned from the caller's template before every attempt.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Header set, including everything injectors contributed.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl ApiRequest {
	/// Creates an empty-bodied request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Sets (replacing) a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Returns a header as UTF-8, if present and printable.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}
impl TryFrom<HttpRequest> for ApiRequest {
	type Error = String;

	fn try_from(request: HttpRequest) -> Result<Self, Self::Error> {
		let (parts, body) = request.into_parts();
		let url = Url::parse(&parts.uri.to_string())
			.map_err(|e| format!("Request URI `{}` is not absolute: {e}.", parts.uri))?;

		Ok(Self { method: parts.method, url, headers: parts.headers, body })
	}
}

/// Buffered response returned by an [`ApiTransport`].
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a bodiless response with the given status.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Sets (replacing) a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Numeric status code.
	pub fn status_code(&self) -> u16 {
		self.status.as_u16()
	}

	/// Returns `true` for 2xx responses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns `true` for HTTP 401.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Converts non-2xx responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(StatusError { status: self.status_code(), body_preview: self.body_preview() }
				.into())
		}
	}

	/// Leading part of the body decoded lossily, or `None` when empty.
	pub fn body_preview(&self) -> Option<String> {
		if self.body.is_empty() {
			return None;
		}

		let end = self.body.len().min(Self::BODY_PREVIEW_LIMIT);

		Some(String::from_utf8_lossy(&self.body[..end]).into_owned())
	}

	/// `Retry-After` hint relative to `now` (seconds or an RFC 2822 date).
	pub fn retry_after(&self, now: OffsetDateTime) -> Option<StdDuration> {
		parse_retry_after(&self.headers, now)
	}

	fn into_http(self) -> HttpResponse {
		let mut response = HttpResponse::new(self.body);

		*response.status_mut() = self.status;
		*response.headers_mut() = self.headers;

		response
	}
}

/// Captures metadata from the most recent identity-endpoint response for error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<StdDuration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// [`AsyncHttpClient`] view of an [`ApiTransport`] that records [`ResponseMetadata`].
pub struct TransportHandle {
	transport: Arc<dyn ApiTransport>,
	clock: Arc<dyn Clock>,
	slot: ResponseMetadataSlot,
}
impl TransportHandle {
	/// Wraps `transport`; metadata lands in `slot`.
	pub fn new(
		transport: Arc<dyn ApiTransport>,
		clock: Arc<dyn Clock>,
		slot: ResponseMetadataSlot,
	) -> Self {
		Self { transport, clock, slot }
	}
}
impl<'c> AsyncHttpClient<'c> for TransportHandle {
	type Error = HttpClientError<TransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let request = ApiRequest::try_from(request)
				.map_err(HttpClientError::<TransportError>::Other)?;
			let response = self.transport.send(request).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata {
				status: Some(response.status_code()),
				retry_after: response.retry_after(self.clock.now()),
			});

			Ok::<_, Self::Error>(response.into_http())
		})
	}
}

/// Thin wrapper around [`ReqwestClient`] implementing [`ApiTransport`].
///
/// Configure any custom client to disable redirect following; the identity endpoint and the
/// API both answer directly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with redirects disabled and a per-request transport timeout.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout)
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestHttpClient {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client
				.request(request.method, request.url)
				.headers(request.headers)
				.body(request.body)
				.send()
				.await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok::<_, TransportError>(ApiResponse { status, headers, body })
		})
	}
}

fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<StdDuration> {
	let value = headers.get(header::RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(StdDuration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		return StdDuration::try_from(moment - now).ok();
	}

	None
}
