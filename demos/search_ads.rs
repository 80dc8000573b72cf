//! Runs a Search Ads style call against a local mock: the client signs an assertion, exchanges it
//! for a bearer token, resolves the account context, and reuses both for the second call.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_pipeline::{
	auth::{AssertionError, AssertionSigner, ClientCredentials},
	client::ApiClient,
	config::ApiConfiguration,
};

/// Stand-in for an ES256 signer backed by the team's private key.
struct DemoSigner;
impl AssertionSigner for DemoSigner {
	fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>, AssertionError> {
		Ok(signing_input.iter().take(64).copied().collect())
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/oauth2/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let acl_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v5/acls");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":[{\"orgName\":\"Demo\",\"orgId\":314159}]}");
		})
		.await;
	let campaigns_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v5/campaigns").header("x-ap-context", "orgId=314159");
			then.status(200).header("content-type", "application/json").body("{\"data\":[]}");
		})
		.await;
	let credentials = ClientCredentials::new(
		"SEARCHADS.demo-client",
		"SEARCHADS.demo-team",
		"demo-key",
		DemoSigner,
	);
	let config = ApiConfiguration::builder(credentials)
		.search_ads()
		.base_url(server.base_url())
		.identity_endpoint(server.url("/auth/oauth2/token"))
		.build()?;
	let client = ApiClient::new(config)?;

	for _ in 0..2 {
		let response = client.get("/api/v5/campaigns").await?.error_for_status()?;

		println!("Campaigns responded with HTTP {}.", response.status_code());
	}

	token_mock.assert_async().await;
	acl_mock.assert_async().await;
	campaigns_mock.assert_calls_async(2).await;

	Ok(())
}
