//! Authenticated request dispatch for resource-management APIs.
//!
//! [`ServiceClient`] attaches bearer tokens to outbound requests, retries transient
//! failures through [`crate::retry`], and recovers exactly once from a server-side
//! token expiry. [`SubscriptionClient`] layers subscription-scoped URI building on
//! top. Neither type owns connection state beyond its shared transport, so both are
//! cheap to clone behind an `Arc`.

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
// self
use crate::{
	_prelude::*,
	credential::TokenCredentials,
	error::{ApiError, AzureError, CredentialError},
	http::{HttpTransport, WebRequest, WebResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	retry::{self, RetryPolicy},
};

/// Header carrying the service-issued correlation id, logged for supportability.
pub const CORRELATION_ID_HEADER: &str = "x-ms-correlation-request-id";
/// Error marker emitted in response bodies when the bearer token has expired.
pub const EXPIRED_TOKEN_CODE: &str = "ExpiredAuthenticationToken";
/// Resource group naming constraint, surfaced verbatim in validation errors.
const RESOURCE_GROUP_CONSTRAINT: &str =
	"1-90 characters; alphanumerics, hyphens, underscores, periods, and parentheses only";

/// Characters escaped when substituting a value into a URI template segment.
///
/// Everything but alphanumerics and `- _ . ! ~ * ' ( )` is percent-encoded, so
/// substituted values can never introduce path separators or query delimiters.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'!')
	.remove(b'~')
	.remove(b'*')
	.remove(b'\'')
	.remove(b'(')
	.remove(b')');

/// Removes duplicate forward slashes while preserving scheme separators.
///
/// A `/` run is collapsed to one unless it immediately follows `:` (as in `https://`).
pub(crate) fn collapse_duplicate_slashes(input: &str) -> String {
	let mut out = String::with_capacity(input.len());

	for c in input.chars() {
		if c == '/' {
			let mut tail = out.chars().rev();

			if tail.next() == Some('/') && tail.next() != Some(':') {
				continue;
			}
		}

		out.push(c);
	}

	out
}

/// Maps a failed response body to a structured [`AzureError`].
///
/// The body is expected to carry an `{ "error": { "code", "message", "details" } }`
/// envelope; anything else becomes the message verbatim so diagnostics are never lost.
pub fn to_error(response: &WebResponse) -> AzureError {
	match serde_json::from_str::<ErrorEnvelope>(&response.body) {
		Ok(envelope) => AzureError {
			code: envelope.error.code,
			message: envelope.error.message.unwrap_or_else(|| response.body.clone()),
			status_code: Some(response.status_code),
			details: envelope.error.details,
		},
		Err(_) => AzureError {
			code: None,
			message: response.body.clone(),
			status_code: Some(response.status_code),
			details: None,
		},
	}
}

/// True when the body's error envelope carries the expired-token code.
///
/// Only a parsed `error.code` counts; a body that merely mentions the code (a
/// resource name in a successful listing, say) must not trigger a replay, since the
/// replay re-executes mutations.
fn is_expired_token_response(response: &WebResponse) -> bool {
	serde_json::from_str::<ErrorEnvelope>(&response.body)
		.is_ok_and(|envelope| envelope.error.code.as_deref() == Some(EXPIRED_TOKEN_CODE))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
	error: ErrorBody,
}
#[derive(Debug, Deserialize)]
struct ErrorBody {
	code: Option<String>,
	message: Option<String>,
	details: Option<serde_json::Value>,
}

/// Bearer-authenticated dispatcher for one resource-management endpoint.
#[derive(Clone)]
pub struct ServiceClient {
	credentials: Arc<TokenCredentials>,
	transport: Arc<dyn HttpTransport>,
	policy: RetryPolicy,
	api_version: Option<String>,
}
impl ServiceClient {
	/// Creates a dispatcher sharing `transport` with its credential provider.
	pub fn new(credentials: Arc<TokenCredentials>, transport: Arc<dyn HttpTransport>) -> Self {
		Self { credentials, transport, policy: RetryPolicy::default(), api_version: None }
	}

	/// Sets the default `api-version` applied when a call supplies none.
	pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
		self.api_version = Some(api_version.into());

		self
	}

	/// Overrides the retry policy applied to dispatched requests.
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Credential provider backing this dispatcher.
	pub fn credentials(&self) -> &Arc<TokenCredentials> {
		&self.credentials
	}

	/// Base URI of the management endpoint.
	pub fn base_uri(&self) -> &Url {
		self.credentials.config().base_url()
	}

	/// Dispatches `request` with a bearer token attached.
	///
	/// Transient failures retry per the configured policy. When the service reports an
	/// expired token, one forced token refresh is performed and the request is replayed
	/// exactly once; a second expiry report is returned to the caller as-is rather than
	/// looping.
	pub async fn send(&self, request: WebRequest) -> Result<WebResponse> {
		let span = FlowSpan::new(FlowKind::Request, "send");

		obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Attempt);

		let result = span.instrument(self.send_inner(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Failure),
		}

		result
	}

	async fn send_inner(&self, mut request: WebRequest) -> Result<WebResponse> {
		let token = self.credentials.get_token(false).await?;

		request.set_header("Authorization", format!("Bearer {}", token.expose()));

		if request.header("Content-Type").is_none() {
			request.set_header("Content-Type", "application/json; charset=utf-8");
		}

		let response = retry::execute(self.transport.as_ref(), &request, &self.policy).await?;
		let response = if is_expired_token_response(&response) {
			let token = self.credentials.get_token(true).await?;

			request.set_header("Authorization", format!("Bearer {}", token.expose()));

			retry::execute(self.transport.as_ref(), &request, &self.policy).await?
		} else {
			response
		};

		#[cfg(feature = "tracing")]
		{
			if let Some(correlation_id) = response.header(CORRELATION_ID_HEADER) {
				tracing::debug!(correlation_id, status = response.status_code, "Correlation ID.");
			}
			if let Some(continuation) = response.continuation() {
				tracing::debug!(continuation, "Long-running operation continuation URI.");
			}
		}

		Ok(response)
	}

	/// Builds a request URI from `template` against an explicit base URI.
	///
	/// Each `parameters` key is replaced with its percent-encoded value, duplicate
	/// slashes are collapsed, and `api-version` is appended as the final query pair.
	/// `api_version` falls back to the client default; absence of both is an error.
	pub fn request_uri_for_base(
		&self,
		base_uri: &str,
		template: &str,
		parameters: &[(&str, &str)],
		queries: &[(&str, &str)],
		api_version: Option<&str>,
	) -> Result<String> {
		let api_version = api_version
			.or(self.api_version.as_deref())
			.ok_or(ApiError::MissingApiVersion)?;
		let mut uri = format!("{base_uri}{template}");

		for (key, value) in parameters {
			uri = uri.replace(key, &utf8_percent_encode(value, URI_COMPONENT).to_string());
		}

		uri = collapse_duplicate_slashes(&uri);

		let query = queries
			.iter()
			.map(|(key, value)| {
				format!("{key}={}", utf8_percent_encode(value, URI_COMPONENT))
			})
			.chain([format!(
				"api-version={}",
				utf8_percent_encode(api_version, URI_COMPONENT)
			)])
			.collect::<Vec<_>>()
			.join("&");

		Ok(format!("{uri}?{query}"))
	}

	/// Builds a request URI from `template` against the configured base URI.
	pub fn request_uri(
		&self,
		template: &str,
		parameters: &[(&str, &str)],
		queries: &[(&str, &str)],
		api_version: Option<&str>,
	) -> Result<String> {
		self.request_uri_for_base(
			self.base_uri().as_str(),
			template,
			parameters,
			queries,
			api_version,
		)
	}
}
impl Debug for ServiceClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceClient")
			.field("credentials", &self.credentials)
			.field("policy", &self.policy)
			.field("api_version", &self.api_version)
			.finish()
	}
}

/// Dispatcher scoped to one subscription.
///
/// URI templates may reference `{subscriptionId}`; the configured subscription id is
/// substituted before the remaining template parameters.
#[derive(Clone, Debug)]
pub struct SubscriptionClient {
	client: ServiceClient,
	subscription_id: String,
}
impl SubscriptionClient {
	/// Creates a subscription-scoped dispatcher.
	pub fn new(
		client: ServiceClient,
		subscription_id: impl Into<String>,
	) -> Result<Self, CredentialError> {
		let subscription_id = subscription_id.into();

		if subscription_id.trim().is_empty() {
			return Err(CredentialError::EmptySubscription);
		}

		Ok(Self { client, subscription_id })
	}

	/// Subscription id injected into URI templates.
	pub fn subscription_id(&self) -> &str {
		&self.subscription_id
	}

	/// Underlying dispatcher.
	pub fn client(&self) -> &ServiceClient {
		&self.client
	}

	/// Dispatches `request` through the underlying client.
	pub async fn send(&self, request: WebRequest) -> Result<WebResponse> {
		self.client.send(request).await
	}

	/// Builds a request URI, substituting `{subscriptionId}` before other parameters.
	pub fn request_uri(
		&self,
		template: &str,
		parameters: &[(&str, &str)],
		queries: &[(&str, &str)],
		api_version: Option<&str>,
	) -> Result<String> {
		let mut all = vec![("{subscriptionId}", self.subscription_id.as_str())];

		all.extend_from_slice(parameters);

		self.client.request_uri(template, &all, queries, api_version)
	}
}

/// Validates a resource group name against the service's naming constraint.
///
/// Names must be 1-90 characters of alphanumerics, `-`, `_`, `.`, `(`, or `)`.
pub fn validate_resource_group_name(name: &str) -> Result<(), ApiError> {
	let valid_len = (1..=90).contains(&name.len());
	let valid_chars =
		name.chars().all(|c| c.is_ascii_alphanumeric() || "-_.()".contains(c));

	if valid_len && valid_chars {
		Ok(())
	} else {
		Err(ApiError::InvalidResourceGroupName { constraint: RESOURCE_GROUP_CONSTRAINT })
	}
}
