//! Client assertions presented to the identity endpoint in place of a static client secret.
//!
//! The identity provider expects a compact JWS whose claims bind the client, team, and
//! audience together. The pipeline assembles the header and claims itself but treats the
//! private key as opaque: signing is delegated to an [`AssertionSigner`] supplied by the
//! caller, or the caller hands over an assertion minted out of band via
//! [`ClientSecretSource::Presigned`].

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors raised while producing a client assertion.
#[derive(Debug, ThisError)]
pub enum AssertionError {
	/// The signer rejected the input or could not reach its key material.
	#[error("Client assertion could not be signed: {message}.")]
	Signing {
		/// Signer-supplied summary.
		message: String,
	},
	/// Header or claims could not be serialized.
	#[error("Client assertion could not be encoded.")]
	Encode(#[from] serde_json::Error),
	/// The configured lifetime would produce an assertion that is already expired.
	#[error("Client assertion lifetime must be positive.")]
	NonPositiveLifetime,
}

/// Signs the JWS signing input with the client's private key.
pub trait AssertionSigner
where
	Self: Send + Sync,
{
	/// JWS `alg` header value produced by this signer.
	fn algorithm(&self) -> &str {
		"ES256"
	}

	/// Returns the raw signature bytes for `signing_input`.
	fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>, AssertionError>;
}

/// Where the `client_secret` sent to the identity endpoint comes from.
#[derive(Clone)]
pub enum ClientSecretSource {
	/// Mint a fresh assertion for every issuance using the signer.
	Signer(Arc<dyn AssertionSigner>),
	/// Reuse an assertion generated elsewhere.
	Presigned(TokenSecret),
}
impl Debug for ClientSecretSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Signer(_) => f.write_str("ClientSecretSource::Signer(..)"),
			Self::Presigned(_) => f.write_str("ClientSecretSource::Presigned(<redacted>)"),
		}
	}
}

/// Client-credential material consumed by the credential store.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
	/// OAuth client identifier (`sub` claim and `client_id` form field).
	pub client_id: String,
	/// Team identifier (`iss` claim).
	pub team_id: String,
	/// Key identifier (`kid` header).
	pub key_id: String,
	/// Signing capability or presigned assertion.
	pub secret: ClientSecretSource,
}
impl ClientCredentials {
	/// Credentials that sign a new assertion for every issuance.
	pub fn new(
		client_id: impl Into<String>,
		team_id: impl Into<String>,
		key_id: impl Into<String>,
		signer: impl 'static + AssertionSigner,
	) -> Self {
		Self {
			client_id: client_id.into(),
			team_id: team_id.into(),
			key_id: key_id.into(),
			secret: ClientSecretSource::Signer(Arc::new(signer)),
		}
	}

	/// Credentials that reuse an assertion minted out of band.
	pub fn presigned(
		client_id: impl Into<String>,
		team_id: impl Into<String>,
		key_id: impl Into<String>,
		assertion: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			team_id: team_id.into(),
			key_id: key_id.into(),
			secret: ClientSecretSource::Presigned(TokenSecret::new(assertion)),
		}
	}

	/// Produces the `client_secret` for one issuance at `issued_at`.
	pub fn client_secret(
		&self,
		audience: &str,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Result<TokenSecret, AssertionError> {
		match &self.secret {
			ClientSecretSource::Presigned(secret) => Ok(secret.clone()),
			ClientSecretSource::Signer(signer) =>
				ClientAssertion::new(self, audience, issued_at, lifetime)?.sign(signer.as_ref()),
		}
	}
}

/// Registered claims carried by the client assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Team identifier.
	pub iss: String,
	/// Client identifier.
	pub sub: String,
	/// Identity endpoint audience.
	pub aud: String,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, seconds since the Unix epoch.
	pub exp: i64,
}

#[derive(Serialize)]
struct AssertionHeader<'a> {
	alg: &'a str,
	kid: &'a str,
}

/// Unsigned client assertion (header + claims).
#[derive(Clone, Debug)]
pub struct ClientAssertion {
	key_id: String,
	claims: AssertionClaims,
}
impl ClientAssertion {
	/// Builds the claims for `credentials` targeting `audience`.
	pub fn new(
		credentials: &ClientCredentials,
		audience: &str,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Result<Self, AssertionError> {
		if !lifetime.is_positive() {
			return Err(AssertionError::NonPositiveLifetime);
		}

		let iat = issued_at.unix_timestamp();
		let claims = AssertionClaims {
			iss: credentials.team_id.clone(),
			sub: credentials.client_id.clone(),
			aud: audience.to_owned(),
			iat,
			exp: (issued_at + lifetime).unix_timestamp(),
		};

		Ok(Self { key_id: credentials.key_id.clone(), claims })
	}

	/// Claims embedded in the assertion.
	pub fn claims(&self) -> &AssertionClaims {
		&self.claims
	}

	/// `base64url(header).base64url(claims)` for the given algorithm.
	pub fn signing_input(&self, algorithm: &str) -> Result<String, AssertionError> {
		let header = serde_json::to_vec(&AssertionHeader { alg: algorithm, kid: &self.key_id })?;
		let claims = serde_json::to_vec(&self.claims)?;

		Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(claims)))
	}

	/// Signs the assertion and returns the compact serialization.
	pub fn sign(&self, signer: &dyn AssertionSigner) -> Result<TokenSecret, AssertionError> {
		let input = self.signing_input(signer.algorithm())?;
		let signature = signer.sign(input.as_bytes())?;

		Ok(TokenSecret::new(format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature))))
	}
}
