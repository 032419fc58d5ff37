//! Multi-scheme token acquisition with shared in-flight fetch memoization.
//!
//! [`TokenCredentials::get_token`] is the crate's central concurrency contract: all
//! concurrent non-forced callers attach to one shared fetch future, so a burst of
//! requests performs exactly one network fetch. A forced refresh swaps a new shared
//! future into the pending slot; waiters already attached to the old future still
//! resolve from it.

// std
use std::path::Path;
// crates.io
use futures::future::{FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	credential::{AccessToken, AuthMethod, CredentialConfig, Secret, assertion},
	error::{SharedFetchError, TokenEndpointError, TransportError},
	http::{HttpTransport, RequestBody, WebRequest, WebResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	retry::{self, RetryPolicy},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestTransport, TransportConfig};

/// Metadata endpoint API version.
const METADATA_API_VERSION: &str = "2018-02-01";
/// Metadata endpoint token path.
const METADATA_TOKEN_PATH: &str = "/metadata/identity/oauth2/token";
/// Retries allowed against a throttling metadata endpoint.
const METADATA_RETRY_LIMIT: u32 = 5;
/// Base wait seeding the metadata endpoint's backoff, in milliseconds.
const METADATA_BASE_WAIT_MS: u64 = 2_000;
/// Client assertion type for the certificate grant.
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

type SharedFetch =
	Shared<Pin<Box<dyn Future<Output = Result<AccessToken, SharedFetchError>> + Send>>>;

/// Bearer-token provider for one credential configuration.
///
/// Construct once and share (`Arc`) across requests; all memoization state is scoped to
/// the instance and nothing touches disk.
pub struct TokenCredentials {
	config: CredentialConfig,
	transport: Arc<dyn HttpTransport>,
	token_policy: Option<RetryPolicy>,
	pending: Mutex<Option<SharedFetch>>,
}
impl TokenCredentials {
	/// Creates a provider using the caller-supplied transport.
	pub fn new(config: CredentialConfig, transport: Arc<dyn HttpTransport>) -> Self {
		Self { config, transport, token_policy: None, pending: Mutex::new(None) }
	}

	/// Creates a provider with a reqwest transport built from `transport_config`.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(
		config: CredentialConfig,
		transport_config: &TransportConfig,
	) -> Result<Self> {
		let transport = ReqwestTransport::new(transport_config)?;

		Ok(Self::new(config, Arc::new(transport)))
	}

	/// Overrides the retry policy applied to token-endpoint requests.
	///
	/// Defaults to the per-grant policies ([`RetryPolicy::secret_grant`] /
	/// [`RetryPolicy::certificate_grant`]) when unset.
	pub fn with_token_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.token_policy = Some(policy);

		self
	}

	/// Credential configuration backing this provider.
	pub fn config(&self) -> &CredentialConfig {
		&self.config
	}

	/// Returns a bearer token, fetching one if needed.
	///
	/// A pre-supplied token is returned as-is without any network call; there is
	/// nothing to refresh for that method, so `force` is ignored. For every other
	/// method, `force = false` attaches to the pending fetch (starting one if none
	/// exists) and `force = true` always starts a fresh fetch, replacing the pending
	/// slot for subsequent callers.
	pub async fn get_token(&self, force: bool) -> Result<AccessToken> {
		if let AuthMethod::PresuppliedToken { token } = self.config.method() {
			obs::record_flow_outcome(FlowKind::Presupplied, FlowOutcome::Attempt);
			obs::record_flow_outcome(FlowKind::Presupplied, FlowOutcome::Success);

			return Ok(token.clone());
		}

		let fetch = {
			let mut pending = self.pending.lock();

			match (&*pending, force) {
				(Some(shared), false) => shared.clone(),
				_ => {
					let shared = self.start_fetch();

					*pending = Some(shared.clone());

					shared
				},
			}
		};

		fetch.await.map_err(Error::from)
	}

	/// Builds the shared fetch future for the configured method.
	fn start_fetch(&self) -> SharedFetch {
		let transport = Arc::clone(&self.transport);
		let config = self.config.clone();
		let policy = self.token_policy.clone();
		let future = async move {
			let flow = flow_kind(&config);
			let span = FlowSpan::new(flow, "get_token");

			obs::record_flow_outcome(flow, FlowOutcome::Attempt);

			let result = span
				.instrument(fetch_token(transport.as_ref(), &config, policy.as_ref()))
				.await;

			match &result {
				Ok(_) => obs::record_flow_outcome(flow, FlowOutcome::Success),
				Err(_) => obs::record_flow_outcome(flow, FlowOutcome::Failure),
			}

			result.map_err(|err| SharedFetchError(Arc::new(err)))
		};

		let future: Pin<Box<dyn Future<Output = Result<AccessToken, SharedFetchError>> + Send>> =
			Box::pin(future);

		future.shared()
	}
}
impl Debug for TokenCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCredentials")
			.field("config", &self.config)
			.field("fetch_pending", &self.pending.lock().is_some())
			.finish()
	}
}

fn flow_kind(config: &CredentialConfig) -> FlowKind {
	match config.method() {
		AuthMethod::ManagedIdentity { .. } => FlowKind::ManagedIdentity,
		AuthMethod::ServicePrincipalSecret { .. } => FlowKind::SecretGrant,
		AuthMethod::ServicePrincipalCertificate { .. } => FlowKind::CertificateGrant,
		AuthMethod::PresuppliedToken { .. } => FlowKind::Presupplied,
	}
}

async fn fetch_token(
	transport: &dyn HttpTransport,
	config: &CredentialConfig,
	policy: Option<&RetryPolicy>,
) -> Result<AccessToken> {
	match config.method() {
		AuthMethod::ManagedIdentity { client_id } =>
			fetch_managed_identity_token(transport, config, client_id.as_deref()).await,
		AuthMethod::ServicePrincipalSecret { secret } =>
			fetch_secret_grant_token(transport, config, policy, secret).await,
		AuthMethod::ServicePrincipalCertificate { certificate_path } =>
			fetch_certificate_grant_token(transport, config, policy, certificate_path.as_path())
				.await,
		// Handled by the fast path in `get_token`.
		AuthMethod::PresuppliedToken { token } => Ok(token.clone()),
	}
}

/// Managed-identity flow against the local metadata endpoint.
///
/// 429/500 are retried with `wait = 2000ms + previous * 2`; each retry's wait seeds
/// the next, so the backoff grows super-linearly under sustained throttling. Any
/// other non-success status fails immediately with diagnostics.
async fn fetch_managed_identity_token(
	transport: &dyn HttpTransport,
	config: &CredentialConfig,
	identity_client_id: Option<&str>,
) -> Result<AccessToken> {
	let mut uri =
		config.metadata_endpoint().join(METADATA_TOKEN_PATH).map_err(TransportError::Uri)?;

	{
		let mut query = uri.query_pairs_mut();

		query.append_pair("api-version", METADATA_API_VERSION);
		query.append_pair("resource", config.base_url().as_str());

		if let Some(client_id) = identity_client_id {
			query.append_pair("client_id", client_id);
		}
	}

	let request = WebRequest::get(uri.as_str()).with_header("Metadata", "true");
	let mut retries = 0_u32;
	let mut wait_ms = 0_u64;

	loop {
		let response = transport.send(&request).await?;

		match response.status_code {
			200 => return parse_token_body(&response),
			status @ (429 | 500) => {
				if retries >= METADATA_RETRY_LIMIT {
					return Err(TokenEndpointError::ManagedIdentityThrottled {
						retries,
						status,
						message: response.status_message,
					}
					.into());
				}

				retries += 1;
				wait_ms = METADATA_BASE_WAIT_MS + wait_ms * 2;

				#[cfg(feature = "tracing")]
				tracing::debug!(status, wait_ms, retries, "Metadata endpoint throttled; backing off.");

				tokio::time::sleep(Duration::from_millis(wait_ms)).await;
			},
			status =>
				return Err(TokenEndpointError::ManagedIdentityRejected {
					status,
					message: response.status_message,
				}
				.into()),
		}
	}
}

async fn fetch_secret_grant_token(
	transport: &dyn HttpTransport,
	config: &CredentialConfig,
	policy: Option<&RetryPolicy>,
	secret: &Secret,
) -> Result<AccessToken> {
	let uri = format!("{}{}/oauth2/token/", config.authority_url(), config.tenant_id());
	let body = url::form_urlencoded::Serializer::new(String::new())
		.append_pair("resource", config.resource_id().as_str())
		.append_pair("client_id", spn_client_id(config))
		.append_pair("grant_type", "client_credentials")
		.append_pair("client_secret", secret.expose())
		.finish();
	let default_policy = RetryPolicy::secret_grant();

	post_token_request(transport, uri, body, policy.unwrap_or(&default_policy)).await
}

async fn fetch_certificate_grant_token(
	transport: &dyn HttpTransport,
	config: &CredentialConfig,
	policy: Option<&RetryPolicy>,
	certificate_path: &Path,
) -> Result<AccessToken> {
	let client_id = spn_client_id(config);
	let assertion = assertion::sign_client_assertion(
		config.authority_url(),
		client_id,
		config.tenant_id(),
		certificate_path,
		config.adfs_enabled(),
	)
	.await?;
	// ADFS authorities carry no tenant segment in the token URI.
	let tenant = if config.adfs_enabled() { "" } else { config.tenant_id() };
	let uri = format!("{}{tenant}/oauth2/token/", config.authority_url());
	let body = url::form_urlencoded::Serializer::new(String::new())
		.append_pair("resource", config.resource_id().as_str())
		.append_pair("client_id", client_id)
		.append_pair("grant_type", "client_credentials")
		.append_pair("client_assertion", &assertion)
		.append_pair("client_assertion_type", JWT_BEARER_ASSERTION_TYPE)
		.finish();
	let default_policy = RetryPolicy::certificate_grant();

	post_token_request(transport, uri, body, policy.unwrap_or(&default_policy)).await
}

/// Client id for service-principal grants.
///
/// [`CredentialConfigBuilder::build`](crate::credential::CredentialConfigBuilder::build)
/// rejects service-principal methods without a client id, so the value is always
/// present here.
fn spn_client_id(config: &CredentialConfig) -> &str {
	debug_assert!(
		config.client_id().is_some(),
		"Service-principal configurations carry a validated client id.",
	);

	config.client_id().unwrap_or_default()
}

/// Posts the form-encoded grant and maps the endpoint's verdict.
///
/// {400, 401, 403} after the transport-level retries means the principal itself is
/// invalid or expired; no amount of retrying helps, so the fixed actionable message is
/// surfaced instead.
async fn post_token_request(
	transport: &dyn HttpTransport,
	uri: String,
	body: String,
	policy: &RetryPolicy,
) -> Result<AccessToken> {
	let request = WebRequest::post(uri)
		.with_header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
		.with_body(RequestBody::Text(body));
	let response = retry::execute(transport, &request, policy).await?;

	match response.status_code {
		200 => parse_token_body(&response),
		status @ (400 | 401 | 403) =>
			Err(TokenEndpointError::InvalidServicePrincipal { status }.into()),
		status =>
			Err(TokenEndpointError::Rejected { status, message: response.status_message }.into()),
	}
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
}

fn parse_token_body(response: &WebResponse) -> Result<AccessToken> {
	let mut deserializer = serde_json::Deserializer::from_str(&response.body);
	let parsed: TokenEndpointResponse = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TokenEndpointError::MalformedResponse {
			source,
			status: response.status_code,
		})?;

	Ok(AccessToken::new(parsed.access_token))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_body_parses_access_token_field() {
		let response = WebResponse {
			status_code: 200,
			body: "{\"access_token\":\"tok-1\",\"expires_in\":\"3599\"}".into(),
			..Default::default()
		};
		let token = parse_token_body(&response).expect("Well-formed body should parse.");

		assert_eq!(token.expose(), "tok-1");
	}

	#[test]
	fn malformed_token_body_is_rejected_with_status() {
		let response =
			WebResponse { status_code: 200, body: "{\"token\":\"nope\"}".into(), ..Default::default() };
		let error = parse_token_body(&response).expect_err("Missing access_token must fail.");

		assert!(matches!(
			error,
			Error::TokenEndpoint(TokenEndpointError::MalformedResponse { status: 200, .. }),
		));
	}
}
