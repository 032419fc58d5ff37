//! Transport primitives for resource-management API calls.
//!
//! The module exposes [`HttpTransport`] alongside [`WebRequest`] and [`WebResponse`] so
//! downstream crates can integrate custom HTTP clients. A transport performs exactly one
//! round trip; retry orchestration lives in [`crate::retry`] and authentication in
//! [`crate::credential`]. The default [`ReqwestTransport`] is configured through an
//! explicit [`TransportConfig`] instead of process-wide state.

// crates.io
use http::Method;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::TransportErrorCode;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<WebResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of one request/response round trip.
///
/// The trait is the crate's only dependency on an HTTP client. Implementations must be
/// `Send + Sync` so a single transport can be shared between a
/// [`TokenCredentials`](crate::credential::TokenCredentials) instance and the dispatcher
/// without additional wrappers, and the returned future must be `Send` so callers can box
/// it across executor hops.
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Performs one HTTP round trip, capturing the body fully as text.
	fn send<'a>(&'a self, request: &'a WebRequest) -> TransportFuture<'a>;
}

/// Outbound HTTP request, constructed fresh per call.
///
/// Headers keep insertion order and the exact names supplied; lookups and replacements
/// match names case-insensitively.
#[derive(Clone, Debug)]
pub struct WebRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URI.
	pub uri: String,
	/// Ordered header pairs.
	pub headers: Vec<(String, String)>,
	/// Optional request body.
	pub body: Option<RequestBody>,
}
impl WebRequest {
	/// Creates a request for the provided method and URI.
	pub fn new(method: Method, uri: impl Into<String>) -> Self {
		Self { method, uri: uri.into(), headers: Vec::new(), body: None }
	}

	/// Creates a GET request.
	pub fn get(uri: impl Into<String>) -> Self {
		Self::new(Method::GET, uri)
	}

	/// Creates a POST request.
	pub fn post(uri: impl Into<String>) -> Self {
		Self::new(Method::POST, uri)
	}

	/// Appends a header, builder style.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Attaches a body, builder style.
	pub fn with_body(mut self, body: RequestBody) -> Self {
		self.body = Some(body);

		self
	}

	/// Replaces the first header matching `name` case-insensitively, appending otherwise.
	pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		if let Some(entry) =
			self.headers.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
		{
			entry.1 = value;
		} else {
			self.headers.push((name, value));
		}
	}

	/// Returns the first header value matching `name` case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Request payload, either text or raw bytes.
#[derive(Clone)]
pub enum RequestBody {
	/// UTF-8 text payload (form-encoded or JSON).
	Text(String),
	/// Opaque binary payload.
	Binary(Vec<u8>),
}
impl RequestBody {
	/// Returns the payload bytes regardless of variant.
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Self::Text(text) => text.as_bytes(),
			Self::Binary(bytes) => bytes,
		}
	}
}
impl Debug for RequestBody {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
			Self::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
		}
	}
}

/// Inbound HTTP response with the body captured fully as text.
#[derive(Clone, Debug, Default)]
pub struct WebResponse {
	/// HTTP status code.
	pub status_code: u16,
	/// HTTP status message (canonical reason phrase).
	pub status_message: String,
	/// Ordered header pairs as received.
	pub headers: Vec<(String, String)>,
	/// Response body text.
	pub body: String,
}
impl WebResponse {
	/// Returns the first header value matching `name` case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Returns the long-running-operation continuation URI, when present.
	///
	/// `azure-asyncoperation` wins over `location`; polling the returned URI is the
	/// caller's responsibility.
	pub fn continuation(&self) -> Option<&str> {
		self.header("azure-asyncoperation").or_else(|| self.header("location"))
	}
}

/// Explicit transport configuration replacing module-global proxy/TLS state.
#[derive(Clone, Debug, Default)]
pub struct TransportConfig {
	/// Proxy URL for all outbound requests.
	pub proxy_url: Option<Url>,
	/// Proxy basic-auth user name.
	pub proxy_username: Option<String>,
	/// Proxy basic-auth password.
	pub proxy_password: Option<String>,
	/// Accepts invalid TLS certificates when true (self-signed endpoints).
	pub ignore_ssl_errors: bool,
	/// Total per-request timeout.
	pub timeout: Option<Duration>,
	/// Custom `User-Agent` header value.
	pub user_agent: Option<String>,
}

/// Default transport backed by [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport {
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport from an explicit [`TransportConfig`].
	pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
		let mut builder = ReqwestClient::builder();

		if let Some(timeout) = config.timeout {
			builder = builder.timeout(timeout);
		}
		if config.ignore_ssl_errors {
			builder = builder.danger_accept_invalid_certs(true).danger_accept_invalid_hostnames(true);
		}
		if let Some(agent) = &config.user_agent {
			builder = builder.user_agent(agent.clone());
		}
		if let Some(proxy_url) = &config.proxy_url {
			let mut proxy = reqwest::Proxy::all(proxy_url.clone())
				.map_err(|source| TransportError::ClientBuild { source: Box::new(source) })?;

			if let (Some(username), Some(password)) =
				(&config.proxy_username, &config.proxy_password)
			{
				proxy = proxy.basic_auth(username, password);
			}

			builder = builder.proxy(proxy);
		}

		let client = builder
			.build()
			.map_err(|source| TransportError::ClientBuild { source: Box::new(source) })?;

		Ok(Self { client })
	}

	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client }
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a WebRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let mut builder = self.client.request(request.method.clone(), &request.uri);

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = &request.body {
				builder = builder.body(body.as_bytes().to_vec());
			}

			let response = builder.send().await.map_err(classify_reqwest_error)?;
			let status = response.status();
			let headers = response
				.headers()
				.iter()
				.map(|(name, value)| {
					(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
				})
				.collect();
			let body = response.text().await.map_err(classify_reqwest_error)?;

			Ok(WebResponse {
				status_code: status.as_u16(),
				status_message: status.canonical_reason().unwrap_or_default().to_owned(),
				headers,
				body,
			})
		})
	}
}

#[cfg(feature = "reqwest")]
fn classify_reqwest_error(err: ReqwestError) -> TransportError {
	if chain_mentions(&err, "certificate") {
		return TransportError::CertificateValidation { source: Box::new(err) };
	}

	let code = reqwest_error_code(&err);

	TransportError::Network { code, source: Box::new(err) }
}

#[cfg(feature = "reqwest")]
fn reqwest_error_code(err: &ReqwestError) -> TransportErrorCode {
	if err.is_timeout() {
		return TransportErrorCode::SocketTimeout;
	}
	if let Some(io) = find_io_error(err) {
		return match io.kind() {
			std::io::ErrorKind::TimedOut => TransportErrorCode::ConnectionTimedOut,
			std::io::ErrorKind::ConnectionReset => TransportErrorCode::ConnectionReset,
			std::io::ErrorKind::ConnectionRefused => TransportErrorCode::ConnectionRefused,
			std::io::ErrorKind::HostUnreachable => TransportErrorCode::HostUnreachable,
			std::io::ErrorKind::BrokenPipe => TransportErrorCode::BrokenPipe,
			std::io::ErrorKind::WouldBlock => TransportErrorCode::ResourceTemporarilyUnavailable,
			_ => TransportErrorCode::Other,
		};
	}
	if err.is_connect() && chain_mentions(err, "dns") {
		return TransportErrorCode::HostNotFound;
	}

	TransportErrorCode::Other
}

#[cfg(feature = "reqwest")]
fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a std::io::Error> {
	let mut current: Option<&(dyn StdError + 'static)> = err.source();

	while let Some(cause) = current {
		if let Some(io) = cause.downcast_ref::<std::io::Error>() {
			return Some(io);
		}

		current = cause.source();
	}

	None
}

#[cfg(feature = "reqwest")]
fn chain_mentions(err: &(dyn StdError + 'static), needle: &str) -> bool {
	let mut current: Option<&(dyn StdError + 'static)> = Some(err);

	while let Some(cause) = current {
		if cause.to_string().to_lowercase().contains(needle) {
			return true;
		}

		current = cause.source();
	}

	false
}
