// crates.io
use httpmock::prelude::*;
// self
use arm_rest_client::{
	_preludet::*,
	credential::{AccessToken, AuthMethod, Secret, TokenCredentials},
	error::{Error, TokenEndpointError},
	retry::RetryPolicy,
};

const TOKEN_PATH: &str = "/tenant-1/oauth2/token/";

fn build_credentials(server: &MockServer) -> TokenCredentials {
	let config = test_credential_config(
		AuthMethod::ServicePrincipalSecret { secret: Secret::new("spn-secret") },
		&server.base_url(),
	);

	TokenCredentials::new(config, Arc::new(test_transport()))
}

#[tokio::test]
async fn secret_grant_posts_form_and_returns_token() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
				.body_includes("grant_type=client_credentials")
				.body_includes("client_id=client-1")
				.body_includes("client_secret=spn-secret");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"spn-token\",\"token_type\":\"Bearer\",\"expires_in\":\"3599\"}");
		})
		.await;
	let token = credentials.get_token(false).await.expect("Secret grant should succeed.");

	assert_eq!(token.expose(), "spn-token");

	mock.assert_async().await;
}

#[tokio::test]
async fn resolved_fetch_is_reused_without_refetching() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"memoized-token\"}");
		})
		.await;
	let first = credentials.get_token(false).await.expect("First fetch should succeed.");
	let second = credentials.get_token(false).await.expect("Second call should reuse the fetch.");

	assert_eq!(first.expose(), "memoized-token");
	assert_eq!(second.expose(), "memoized-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_callers_share_one_fetch() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"shared-token\"}");
		})
		.await;
	let (first, second) =
		tokio::join!(credentials.get_token(false), credentials.get_token(false));
	let first = first.expect("First concurrent call should succeed.");
	let second = second.expect("Second concurrent call should succeed.");

	assert_eq!(first.expose(), "shared-token");
	assert_eq!(second.expose(), "shared-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn forced_refresh_starts_a_new_fetch() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"refreshed-token\"}");
		})
		.await;
	let _ = credentials.get_token(false).await.expect("Initial fetch should succeed.");
	let refreshed = credentials.get_token(true).await.expect("Forced refresh should succeed.");

	assert_eq!(refreshed.expose(), "refreshed-token");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_principal_surfaces_actionable_message() {
	let server = MockServer::start_async().await;
	let config = test_credential_config(
		AuthMethod::ServicePrincipalSecret { secret: Secret::new("expired-secret") },
		&server.base_url(),
	);
	// A single attempt keeps the test from backing off on the retryable 403.
	let credentials = TokenCredentials::new(config, Arc::new(test_transport()))
		.with_token_retry_policy(RetryPolicy::secret_grant().with_retry_count(1));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(403)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\"}");
		})
		.await;
	let err = credentials
		.get_token(false)
		.await
		.expect_err("A 403 from the token endpoint should fail the fetch.");

	assert!(matches!(
		&err,
		Error::SharedFetch(shared)
			if matches!(
				*shared.0,
				Error::TokenEndpoint(TokenEndpointError::InvalidServicePrincipal { status: 403 }),
			)
	));
	assert_eq!(
		err.to_string(),
		"Could not fetch access token for Azure. Verify the service principal used is valid and \
		 not expired. (CODE: 403)",
	);

	mock.assert_async().await;
}

#[tokio::test]
async fn unexpected_status_maps_to_rejected() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(501).body("not implemented");
		})
		.await;
	let err = credentials
		.get_token(false)
		.await
		.expect_err("A non-retryable failure status should fail the fetch.");

	assert!(matches!(
		&err,
		Error::SharedFetch(shared)
			if matches!(
				*shared.0,
				Error::TokenEndpoint(TokenEndpointError::Rejected { status: 501, .. }),
			)
	));

	mock.assert_async().await;
}

#[tokio::test]
async fn malformed_token_body_is_reported() {
	let server = MockServer::start_async().await;
	let credentials = build_credentials(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_type\":\"Bearer\"}");
		})
		.await;
	let err = credentials
		.get_token(false)
		.await
		.expect_err("A 200 without access_token should fail the fetch.");

	assert!(matches!(
		&err,
		Error::SharedFetch(shared)
			if matches!(
				*shared.0,
				Error::TokenEndpoint(TokenEndpointError::MalformedResponse { status: 200, .. }),
			)
	));

	mock.assert_async().await;
}

#[tokio::test]
async fn presupplied_token_never_touches_the_network() {
	let server = MockServer::start_async().await;
	let config = test_credential_config(
		AuthMethod::PresuppliedToken { token: AccessToken::new("static-token") },
		&server.base_url(),
	);
	let credentials = TokenCredentials::new(config, Arc::new(test_transport()));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).body("{\"access_token\":\"never-used\"}");
		})
		.await;
	let token = credentials.get_token(false).await.expect("Pre-supplied token should be returned.");
	let forced = credentials.get_token(true).await.expect("Force is a no-op for this method.");

	assert_eq!(token.expose(), "static-token");
	assert_eq!(forced.expose(), "static-token");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn missing_certificate_file_fails_the_certificate_grant() {
	let server = MockServer::start_async().await;
	let config = test_credential_config(
		AuthMethod::ServicePrincipalCertificate {
			certificate_path: "/nonexistent/path/to/certificate.pem".into(),
		},
		&server.base_url(),
	);
	let credentials = TokenCredentials::new(config, Arc::new(test_transport()));
	let err = credentials
		.get_token(false)
		.await
		.expect_err("A missing certificate file should fail before any token request.");

	assert!(matches!(
		&err,
		Error::SharedFetch(shared) if matches!(*shared.0, Error::Cert(_)),
	));
}
