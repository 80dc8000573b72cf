//! Validated configuration consumed by the pipeline.
//!
//! Values here are opaque to the core: the base host, static headers, client-credential
//! material, and retry parameters are passed through without reinterpretation. Loading them
//! from files or the environment is left to the embedding application.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, ClientSecretSource},
	error::ConfigError,
	http::{HeaderMap, HeaderName, HeaderValue},
	retry::BackoffPolicy,
};

/// Search Ads API host.
pub const SEARCH_ADS_BASE_URL: &str = "https://api.searchads.apple.com";
/// Identity endpoint that issues Search Ads credentials.
pub const SEARCH_ADS_TOKEN_ENDPOINT: &str = "https://appleid.apple.com/auth/oauth2/token";
/// Audience embedded in Search Ads client assertions.
pub const SEARCH_ADS_AUDIENCE: &str = "https://appleid.apple.com";
/// OAuth scope requested for Search Ads credentials.
pub const SEARCH_ADS_SCOPE: &str = "searchadsorg";
/// Endpoint listing the organizations the client may act for.
pub const SEARCH_ADS_ACL_PATH: &str = "/api/v5/acls";
/// Header carrying the per-account context.
pub const SEARCH_ADS_CONTEXT_HEADER: &str = "X-AP-Context";

/// Identity-endpoint settings used by the credential store.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
	/// Token endpoint URL.
	pub token_endpoint: Url,
	/// Audience claim of the client assertion.
	pub audience: String,
	/// Scope requested with every issuance.
	pub scope: Option<String>,
	/// Client-credential material.
	pub credentials: ClientCredentials,
	/// Lifetime of each freshly signed client assertion.
	pub assertion_lifetime: Duration,
	/// Cached credentials are treated as expired this long before their expiry instant.
	pub expiry_skew: Duration,
}

/// Account-context settings used by the context store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
	/// Path (relative to the base URL) of the context endpoint.
	pub path: String,
	/// Header that carries the context value on outbound requests.
	pub header: String,
	/// How long a fetched context value stays cached.
	pub ttl: Duration,
	/// Account to select; the first listed account is used when unset.
	pub org_id: Option<u64>,
}
impl ContextConfig {
	const DEFAULT_TTL: Duration = Duration::hours(1);

	/// Creates a context config for `path`, attached through `header`.
	pub fn new(path: impl Into<String>, header: impl Into<String>) -> Self {
		Self { path: path.into(), header: header.into(), ttl: Self::DEFAULT_TTL, org_id: None }
	}

	/// Overrides the cache lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Pins the account to act for.
	pub fn with_org_id(mut self, org_id: u64) -> Self {
		self.org_id = Some(org_id);

		self
	}
}

/// Complete pipeline configuration.
#[derive(Clone, Debug)]
pub struct ApiConfiguration {
	/// Host every request is rewritten to.
	pub base_url: Url,
	/// Headers attached to every request.
	pub static_headers: HeaderMap,
	/// Identity-endpoint settings.
	pub identity: IdentityConfig,
	/// Account-context settings; `None` skips the context header entirely.
	pub context: Option<ContextConfig>,
	/// Backoff behaviour for transient failures.
	pub backoff: BackoffPolicy,
	/// Hard deadline for one `execute` call, covering every attempt and delay.
	pub timeout: Option<StdDuration>,
}
impl ApiConfiguration {
	/// Creates a builder for `credentials`.
	pub fn builder(credentials: ClientCredentials) -> ApiConfigurationBuilder {
		ApiConfigurationBuilder::new(credentials)
	}

	/// Joins `path` onto the base URL.
	pub fn url(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url.join(path).map_err(|_| ConfigError::InvalidPath { path: path.to_owned() })
	}
}

/// Builder for [`ApiConfiguration`] values.
#[derive(Debug)]
pub struct ApiConfigurationBuilder {
	credentials: ClientCredentials,
	base_url: Option<String>,
	token_endpoint: Option<String>,
	audience: Option<String>,
	scope: Option<String>,
	headers: Vec<(String, String)>,
	context: Option<ContextConfig>,
	backoff: BackoffPolicy,
	timeout: Option<StdDuration>,
	assertion_lifetime: Duration,
	expiry_skew: Duration,
}
impl ApiConfigurationBuilder {
	const DEFAULT_ASSERTION_LIFETIME: Duration = Duration::minutes(20);
	const DEFAULT_EXPIRY_SKEW: Duration = Duration::seconds(60);

	/// Creates an empty builder for `credentials`.
	pub fn new(credentials: ClientCredentials) -> Self {
		Self {
			credentials,
			base_url: None,
			token_endpoint: None,
			audience: None,
			scope: None,
			headers: Vec::new(),
			context: None,
			backoff: BackoffPolicy::on_retryable_error(),
			timeout: None,
			assertion_lifetime: Self::DEFAULT_ASSERTION_LIFETIME,
			expiry_skew: Self::DEFAULT_EXPIRY_SKEW,
		}
	}

	/// Applies the Apple Search Ads endpoints, audience, scope, context header, and `Accept`.
	pub fn search_ads(self) -> Self {
		self.base_url(SEARCH_ADS_BASE_URL)
			.identity_endpoint(SEARCH_ADS_TOKEN_ENDPOINT)
			.audience(SEARCH_ADS_AUDIENCE)
			.scope(SEARCH_ADS_SCOPE)
			.header("Accept", "application/json")
			.context(ContextConfig::new(SEARCH_ADS_ACL_PATH, SEARCH_ADS_CONTEXT_HEADER))
	}

	/// Sets the API host.
	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());

		self
	}

	/// Sets the identity token endpoint.
	pub fn identity_endpoint(mut self, url: impl Into<String>) -> Self {
		self.token_endpoint = Some(url.into());

		self
	}

	/// Sets the assertion audience (defaults to the token endpoint's origin).
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Sets the requested scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Adds a static header; later values for the same name replace earlier ones.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Enables the account-context header.
	pub fn context(mut self, context: ContextConfig) -> Self {
		self.context = Some(context);

		self
	}

	/// Disables the account-context header.
	pub fn without_context(mut self) -> Self {
		self.context = None;

		self
	}

	/// Overrides the backoff policy.
	pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}

	/// Sets the per-call deadline.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Overrides the client assertion lifetime (defaults to 20 minutes).
	pub fn assertion_lifetime(mut self, lifetime: Duration) -> Self {
		self.assertion_lifetime = lifetime;

		self
	}

	/// Overrides the early-expiry window (defaults to 60 seconds; negative values clamp to zero).
	pub fn expiry_skew(mut self, skew: Duration) -> Self {
		self.expiry_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ApiConfiguration, ConfigError> {
		validate_credentials(&self.credentials)?;

		let base_url = parse_endpoint("base", self.base_url)?;
		let token_endpoint = parse_endpoint("token", self.token_endpoint)?;
		let audience =
			self.audience.unwrap_or_else(|| token_endpoint.origin().ascii_serialization());
		let static_headers = build_headers(self.headers)?;

		if let Some(context) = self.context.as_ref() {
			base_url.join(&context.path).map_err(|_| ConfigError::InvalidEndpoint {
				endpoint: "context",
				url: context.path.clone(),
			})?;
			HeaderName::try_from(context.header.as_str())
				.map_err(|_| ConfigError::InvalidHeader { name: context.header.clone() })?;
		}

		self.backoff.validate()?;

		Ok(ApiConfiguration {
			base_url,
			static_headers,
			identity: IdentityConfig {
				token_endpoint,
				audience,
				scope: self.scope,
				credentials: self.credentials,
				assertion_lifetime: self.assertion_lifetime,
				expiry_skew: self.expiry_skew,
			},
			context: self.context,
			backoff: self.backoff,
			timeout: self.timeout,
		})
	}
}

fn validate_credentials(credentials: &ClientCredentials) -> Result<(), ConfigError> {
	let fields = [
		("client_id", credentials.client_id.as_str()),
		("team_id", credentials.team_id.as_str()),
		("key_id", credentials.key_id.as_str()),
	];

	if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
		return Err(ConfigError::EmptyCredentialField { field });
	}
	if let ClientSecretSource::Presigned(secret) = &credentials.secret {
		if secret.expose().trim().is_empty() {
			return Err(ConfigError::EmptyCredentialField { field: "client_secret" });
		}
	}

	Ok(())
}

fn parse_endpoint(endpoint: &'static str, raw: Option<String>) -> Result<Url, ConfigError> {
	let raw = raw.ok_or(ConfigError::MissingEndpoint { endpoint })?;
	let url = Url::parse(&raw)
		.map_err(|_| ConfigError::InvalidEndpoint { endpoint, url: raw.clone() })?;

	if url.cannot_be_a_base() || url.host_str().is_none() {
		return Err(ConfigError::InvalidEndpoint { endpoint, url: raw });
	}

	Ok(url)
}

fn build_headers(headers: Vec<(String, String)>) -> Result<HeaderMap, ConfigError> {
	let mut map = HeaderMap::new();

	for (name, value) in headers {
		let header_name = HeaderName::try_from(name.as_str())
			.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
		let header_value =
			HeaderValue::try_from(value).map_err(|_| ConfigError::InvalidHeader { name })?;

		map.insert(header_name, header_value);
	}

	Ok(map)
}
