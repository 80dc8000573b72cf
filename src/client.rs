//! Caller-facing entry point that wires the stores and injectors into one pipeline.

// self
use crate::{
	_prelude::*,
	clock::Clock,
	config::{ApiConfiguration, ContextConfig},
	error::ConfigError,
	http::{ApiRequest, ApiResponse, ApiTransport, HeaderName, Method},
	oauth::CredentialIssuer,
	pipeline::{AuthInjector, ContextInjector, HeaderInjector, HostInjector, RequestPipeline},
	retry::UnauthorizedRecovery,
	store::{AclContextDecoder, ContextDecoder, ContextStore, TokenStore},
};
#[cfg(feature = "reqwest")] use crate::{clock::SystemClock, http::ReqwestHttpClient};

/// API client sharing one credential cache and one context cache across all calls.
///
/// Requests run through host rewrite, static headers, the context header (when configured),
/// and the bearer credential, in that order. The client is cheap to share behind an [`Arc`];
/// every method takes `&self`.
pub struct ApiClient {
	config: ApiConfiguration,
	token_store: Arc<TokenStore>,
	context_store: Option<Arc<ContextStore>>,
	pipeline: RequestPipeline,
}
impl ApiClient {
	/// Creates a client over the default reqwest transport and the system clock.
	#[cfg(feature = "reqwest")]
	pub fn new(config: ApiConfiguration) -> Result<Self> {
		Self::with_transport(config, Arc::new(ReqwestHttpClient::default()), Arc::new(SystemClock))
	}

	/// Creates a client over a caller-supplied transport and clock.
	pub fn with_transport(
		config: ApiConfiguration,
		transport: Arc<dyn ApiTransport>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let decoder = match config.context.as_ref().and_then(|context| context.org_id) {
			Some(org_id) => AclContextDecoder::for_org(org_id),
			None => AclContextDecoder::new(),
		};

		Self::with_context_decoder(config, transport, clock, Arc::new(decoder))
	}

	/// Same as [`ApiClient::with_transport`] with a custom context decoder.
	pub fn with_context_decoder(
		config: ApiConfiguration,
		transport: Arc<dyn ApiTransport>,
		clock: Arc<dyn Clock>,
		decoder: Arc<dyn ContextDecoder>,
	) -> Result<Self> {
		let issuer =
			CredentialIssuer::new(transport.clone(), clock.clone(), config.identity.clone());
		let token_store = Arc::new(TokenStore::new(issuer, clock.clone()));
		let context_store = match &config.context {
			Some(context) => Some(Arc::new(build_context_store(
				&config,
				context,
				&transport,
				&clock,
				&token_store,
				decoder,
			)?)),
			None => None,
		};
		let mut builder = RequestPipeline::builder(transport, clock)
			.injector(HostInjector::new(config.base_url.clone()))
			.injector(HeaderInjector::new(config.static_headers.clone()));

		if let (Some(context), Some(store)) = (&config.context, &context_store) {
			builder = builder.injector(ContextInjector::new(store.clone(), header_name(context)?));
		}

		let pipeline = builder
			.injector(AuthInjector::new(token_store.clone()))
			.recovery(UnauthorizedRecovery::on_unauthorized(token_store.clone()))
			.backoff(config.backoff.clone())
			.timeout(config.timeout)
			.build();

		Ok(Self { config, token_store, context_store, pipeline })
	}

	/// Builds a bodiless request for `path` relative to the base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.config.url(path)?))
	}

	/// Sends `template` through the pipeline.
	pub async fn execute(&self, template: &ApiRequest) -> Result<ApiResponse> {
		self.pipeline.execute(template).await
	}

	/// Shorthand for a `GET` of `path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		let request = self.request(Method::GET, path)?;

		self.execute(&request).await
	}

	/// Configuration the client was built from.
	pub fn config(&self) -> &ApiConfiguration {
		&self.config
	}

	/// Shared credential cache.
	pub fn token_store(&self) -> &Arc<TokenStore> {
		&self.token_store
	}

	/// Shared context cache, when a context endpoint is configured.
	pub fn context_store(&self) -> Option<&Arc<ContextStore>> {
		self.context_store.as_ref()
	}

	/// Underlying pipeline.
	pub fn pipeline(&self) -> &RequestPipeline {
		&self.pipeline
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("pipeline", &self.pipeline)
			.finish()
	}
}

fn build_context_store(
	config: &ApiConfiguration,
	context: &ContextConfig,
	transport: &Arc<dyn ApiTransport>,
	clock: &Arc<dyn Clock>,
	token_store: &Arc<TokenStore>,
	decoder: Arc<dyn ContextDecoder>,
) -> Result<ContextStore> {
	let request = ApiRequest::get(config.url(&context.path)?);
	let pipeline = RequestPipeline::builder(transport.clone(), clock.clone())
		.injector(HostInjector::new(config.base_url.clone()))
		.injector(HeaderInjector::new(config.static_headers.clone()))
		.injector(AuthInjector::new(token_store.clone()))
		.recovery(UnauthorizedRecovery::on_unauthorized(token_store.clone()))
		.backoff(config.backoff.clone())
		.timeout(config.timeout)
		.build();

	Ok(ContextStore::new(pipeline, request, decoder, context.ttl, clock.clone()))
}

fn header_name(context: &ContextConfig) -> Result<HeaderName, ConfigError> {
	HeaderName::try_from(context.header.as_str())
		.map_err(|_| ConfigError::InvalidHeader { name: context.header.clone() })
}
