//! Scripted in-process transport shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
// self
use oauth2_pipeline::{
	auth::{AssertionError, AssertionSigner, ClientCredentials},
	client::ApiClient,
	clock::Clock,
	config::{ApiConfiguration, ApiConfigurationBuilder, ContextConfig},
	error::TransportError,
	http::{ApiRequest, ApiResponse, ApiTransport, HeaderValue, StatusCode, TransportFuture, header},
	retry::BackoffPolicy,
};

pub const BASE_URL: &str = "https://api.example.test";
pub const TOKEN_ENDPOINT: &str = "https://idp.example.test/auth/oauth2/token";
pub const TOKEN_PATH: &str = "/auth/oauth2/token";
pub const ACL_PATH: &str = "/api/v5/acls";
pub const CONTEXT_HEADER: &str = "X-AP-Context";
pub const ACL_LISTING: &str = r#"{"data":[{"orgName":"Primary","orgId":1001}],"error":null}"#;

/// Scripted outcome of one send.
#[derive(Clone, Debug)]
pub enum Reply {
	/// Respond with this status and an empty body.
	Status(u16),
	/// Respond with this status and a `Retry-After` header.
	RetryAfter(u16, &'static str),
	/// Fail at the transport level.
	Fail,
	/// Never respond.
	Hang,
}

/// Scripted outcome of one token request.
#[derive(Clone, Debug)]
pub enum TokenReply {
	/// Issue `token-<n>` where `n` counts token requests.
	Issue,
	/// Issue `token-<n>` with this raw `expires_in`.
	IssueFor(u64),
	/// Reject with an OAuth error body.
	Reject(u16, &'static str),
	/// Fail at the transport level.
	Fail,
}

/// In-process transport answering the identity endpoint, the ACL endpoint, and API paths.
///
/// Unscripted token requests succeed, unscripted ACL requests return [`ACL_LISTING`], and
/// unscripted API requests return 200.
#[derive(Default)]
pub struct ScriptedTransport {
	token_requests: AtomicUsize,
	token_script: Mutex<VecDeque<TokenReply>>,
	token_bodies: Mutex<Vec<String>>,
	token_latency: Mutex<Option<StdDuration>>,
	scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
	sent: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn script_tokens(&self, replies: impl IntoIterator<Item = TokenReply>) {
		self.token_script.lock().extend(replies);
	}

	pub fn delay_tokens(&self, latency: StdDuration) {
		*self.token_latency.lock() = Some(latency);
	}

	pub fn script(&self, path: &str, replies: impl IntoIterator<Item = Reply>) {
		self.scripts
			.lock()
			.entry(path.to_owned())
			.or_default()
			.extend(replies);
	}

	pub fn token_requests(&self) -> usize {
		self.token_requests.load(Ordering::SeqCst)
	}

	pub fn token_bodies(&self) -> Vec<String> {
		self.token_bodies.lock().clone()
	}

	/// Requests (other than token requests) sent to `path`.
	pub fn sent_to(&self, path: &str) -> Vec<ApiRequest> {
		self.sent
			.lock()
			.iter()
			.filter(|request| request.url.path() == path)
			.cloned()
			.collect()
	}

	/// `Authorization` headers of requests sent to `path`, in order.
	pub fn bearers_sent_to(&self, path: &str) -> Vec<String> {
		self.sent_to(path)
			.iter()
			.map(|request| request.header("authorization").unwrap_or_default().to_owned())
			.collect()
	}

	async fn token(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		let latency = *self.token_latency.lock();

		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}

		let number = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
		let scripted = self.token_script.lock().pop_front();
		let reply = scripted.unwrap_or(TokenReply::Issue);

		self.token_bodies
			.lock()
			.push(String::from_utf8_lossy(&request.body).into_owned());

		match reply {
			TokenReply::Issue => Ok(issued(number, 3600)),
			TokenReply::IssueFor(expires_in) => Ok(issued(number, expires_in)),
			TokenReply::Reject(status, error) => {
				let body = format!(r#"{{"error":"{error}","error_description":"scripted"}}"#);

				Ok(json(status, body))
			},
			TokenReply::Fail => Err(TransportError::Io(std::io::Error::other("token link down"))),
		}
	}

	async fn api(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		let path = request.url.path().to_owned();

		self.sent.lock().push(request);

		let reply =
			self.scripts.lock().get_mut(&path).and_then(VecDeque::pop_front);

		match reply {
			Some(Reply::Status(status)) => Ok(ApiResponse::new(status_code(status))),
			Some(Reply::RetryAfter(status, after)) => Ok(ApiResponse::new(status_code(status))
				.with_header(header::RETRY_AFTER, HeaderValue::from_static(after))),
			Some(Reply::Fail) => Err(TransportError::Io(std::io::Error::other("link down"))),
			Some(Reply::Hang) => futures::future::pending().await,
			None if path == ACL_PATH => Ok(json(200, ACL_LISTING.to_owned())),
			None => Ok(ApiResponse::new(StatusCode::OK).with_body(r#"{"data":[]}"#)),
		}
	}
}
impl ApiTransport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			if request.url.path() == TOKEN_PATH {
				self.token(request).await
			} else {
				self.api(request).await
			}
		})
	}
}

/// Signer producing a fixed signature so assertions can be checked byte for byte.
pub struct StaticSigner;
impl AssertionSigner for StaticSigner {
	fn sign(&self, _signing_input: &[u8]) -> Result<Vec<u8>, AssertionError> {
		Ok(b"signature".to_vec())
	}
}

pub fn credentials() -> ClientCredentials {
	ClientCredentials::new("SEARCHADS.client", "team-1", "key-1", StaticSigner)
}

/// Builder pointed at the scripted endpoints, without a context endpoint.
pub fn config_builder() -> ApiConfigurationBuilder {
	ApiConfiguration::builder(credentials())
		.base_url(BASE_URL)
		.identity_endpoint(TOKEN_ENDPOINT)
		.audience("https://idp.example.test")
		.scope("searchadsorg")
		.header("Accept", "application/json")
}

pub fn context_config() -> ContextConfig {
	ContextConfig::new(ACL_PATH, CONTEXT_HEADER)
}

pub fn client(
	builder: ApiConfigurationBuilder,
	transport: &Arc<ScriptedTransport>,
	clock: Arc<dyn Clock>,
) -> ApiClient {
	let config = builder.build().expect("Test configuration should validate.");

	ApiClient::with_transport(config, transport.clone(), clock)
		.expect("Test client should assemble.")
}

pub fn backoff(max_attempts: u32) -> BackoffPolicy {
	BackoffPolicy::on_retryable_error_with(max_attempts)
}

pub fn secs(values: &[u64]) -> Vec<StdDuration> {
	values.iter().copied().map(StdDuration::from_secs).collect()
}

fn status_code(status: u16) -> StatusCode {
	StatusCode::from_u16(status).expect("Scripted status should be valid.")
}

fn issued(number: usize, expires_in: u64) -> ApiResponse {
	json(
		200,
		format!(
			r#"{{"access_token":"token-{number}","token_type":"Bearer","expires_in":{expires_in}}}"#
		),
	)
}

fn json(status: u16, body: String) -> ApiResponse {
	ApiResponse::new(status_code(status))
		.with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
		.with_body(body)
}
