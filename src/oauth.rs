//! Client-credentials exchange against the identity endpoint.
//!
//! [`CredentialIssuer`] performs exactly one network exchange per call: it mints the client
//! assertion, posts `grant_type=client_credentials` through the `oauth2` crate over the
//! pipeline's own [`ApiTransport`], and maps every failure into [`AcquisitionError`].
//! Retrying is left to callers; the issuer never loops.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, HttpClientError, RequestTokenError, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	clock::Clock,
	config::IdentityConfig,
	error::{AcquisitionError, TransportError},
	http::{ApiTransport, ResponseMetadata, ResponseMetadataSlot, TransportHandle},
};

/// Exchanges client assertions for bearer credentials.
pub struct CredentialIssuer {
	transport: Arc<dyn ApiTransport>,
	clock: Arc<dyn Clock>,
	identity: IdentityConfig,
}
impl CredentialIssuer {
	/// Creates an issuer that talks to `identity.token_endpoint` over `transport`.
	pub fn new(
		transport: Arc<dyn ApiTransport>,
		clock: Arc<dyn Clock>,
		identity: IdentityConfig,
	) -> Self {
		Self { transport, clock, identity }
	}

	/// Identity settings used for every exchange.
	pub fn identity(&self) -> &IdentityConfig {
		&self.identity
	}

	/// Performs a single credential-issuance exchange.
	pub async fn issue(&self) -> Result<Credential, AcquisitionError> {
		let issued_at = self.clock.now();
		let secret = self.identity.credentials.client_secret(
			&self.identity.audience,
			issued_at,
			self.identity.assertion_lifetime,
		)?;
		let client = BasicClient::new(ClientId::new(self.identity.credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(TokenUrl::from_url(self.identity.token_endpoint.clone()));
		let slot = ResponseMetadataSlot::default();
		let handle = TransportHandle::new(self.transport.clone(), self.clock.clone(), slot.clone());
		let mut request = client.exchange_client_credentials();

		if let Some(scope) = &self.identity.scope {
			request = request.add_scope(Scope::new(scope.clone()));
		}

		let response = request
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(slot.take(), err))?;

		map_token_response(response, issued_at)
	}
}
impl Debug for CredentialIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialIssuer").field("identity", &self.identity).finish()
	}
}

fn map_token_response(
	response: BasicTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<Credential, AcquisitionError> {
	let expires_in = response.expires_in().ok_or(AcquisitionError::MissingExpiresIn)?.as_secs();
	let expires_in =
		i64::try_from(expires_in).map_err(|_| AcquisitionError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(AcquisitionError::NonPositiveExpiresIn);
	}

	Credential::issued_for(
		response.access_token().secret().to_owned(),
		issued_at,
		Duration::seconds(expires_in),
	)
	.ok_or(AcquisitionError::ExpiresInOutOfRange)
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<TransportError>>,
) -> AcquisitionError {
	let status = meta.as_ref().and_then(|value| value.status);
	let retry_after = meta.as_ref().and_then(|value| value.retry_after);

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response(response, status, retry_after),
		RequestTokenError::Request(error) => map_transport_error(error, status),
		RequestTokenError::Parse(source, _body) => AcquisitionError::Malformed { source, status },
		RequestTokenError::Other(message) => AcquisitionError::InvalidResponse { message, status },
	}
}

fn map_server_response(
	response: BasicErrorResponse,
	status: Option<u16>,
	retry_after: Option<StdDuration>,
) -> AcquisitionError {
	AcquisitionError::Rejected {
		error: response.error().as_ref().to_string(),
		description: response.error_description().cloned(),
		status,
		retry_after,
	}
}

fn map_transport_error(
	err: HttpClientError<TransportError>,
	status: Option<u16>,
) -> AcquisitionError {
	match err {
		HttpClientError::Reqwest(inner) => AcquisitionError::Transport(*inner),
		HttpClientError::Http(inner) => AcquisitionError::Request(inner),
		HttpClientError::Io(inner) => AcquisitionError::Transport(TransportError::Io(inner)),
		HttpClientError::Other(message) => AcquisitionError::InvalidResponse { message, status },
		_ => AcquisitionError::InvalidResponse {
			message: "HTTP client error occurred while calling the identity endpoint".into(),
			status,
		},
	}
}
