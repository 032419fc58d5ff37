//! Crate-level error types shared across credentials, transports, and the dispatcher.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential configuration rejected at construction.
	#[error(transparent)]
	Credential(#[from] CredentialError),
	/// Token endpoint rejected the grant after transport-level retries.
	#[error(transparent)]
	TokenEndpoint(#[from] TokenEndpointError),
	/// Transport failure (DNS, TCP, TLS) after exhausting the retry budget.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Certificate inspection or assertion signing failure.
	#[error(transparent)]
	Cert(#[from] CertError),
	/// Resource-management API failure surfaced to the caller.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Failure of a shared in-flight token fetch, observed by every waiter.
	#[error(transparent)]
	SharedFetch(#[from] SharedFetchError),
}

/// Credential configuration and validation failures.
///
/// Raised once at construction; a [`crate::credential::CredentialConfig`] that
/// builds successfully never produces these afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum CredentialError {
	/// Tenant/directory identifier was empty.
	#[error("Tenant identifier must be a non-empty string.")]
	EmptyTenant,
	/// Client identifier was empty for a service-principal method.
	#[error("Client identifier must be a non-empty string.")]
	EmptyClient,
	/// Client secret was empty for the secret grant.
	#[error("Client secret must be a non-empty string.")]
	EmptySecret,
	/// Certificate file path was empty for the certificate grant.
	#[error("Certificate file path must be a non-empty path.")]
	EmptyCertificatePath,
	/// User-assigned managed-identity client id was supplied but empty.
	#[error("Managed identity client identifier must be non-empty when supplied.")]
	EmptyIdentityClient,
	/// Pre-supplied access token was empty.
	#[error("Pre-supplied access token must be a non-empty string.")]
	EmptyAccessToken,
	/// Subscription identifier was empty.
	#[error("Subscription identifier must be a non-empty string.")]
	EmptySubscription,
	/// Base resource-management URL is required.
	#[error("Base resource-management URL must be provided.")]
	MissingBaseUrl,
	/// Authority URL is required.
	#[error("Authority URL must be provided.")]
	MissingAuthorityUrl,
	/// Audience/resource URL is required.
	#[error("Active directory resource URL must be provided.")]
	MissingResourceId,
}

/// Token endpoint rejections, raised after any transport-level retries completed.
#[derive(Debug, ThisError)]
pub enum TokenEndpointError {
	/// The endpoint answered {400, 401, 403}; the principal itself is the problem.
	#[error(
		"Could not fetch access token for Azure. Verify the service principal used is valid and \
		 not expired. (CODE: {status})"
	)]
	InvalidServicePrincipal {
		/// HTTP status code returned by the token endpoint.
		status: u16,
	},
	/// Any other non-success token endpoint response.
	#[error("Could not fetch access token for Azure. Status code: {status}, status message: {message}.")]
	Rejected {
		/// HTTP status code returned by the token endpoint.
		status: u16,
		/// Status message returned by the token endpoint.
		message: String,
	},
	/// Metadata endpoint answered with a non-retryable status.
	#[error(
		"Could not fetch access token for the managed identity. Configure Managed Service \
		 Identity (MSI) for the resource. Status code: {status}, status message: {message}."
	)]
	ManagedIdentityRejected {
		/// HTTP status code returned by the metadata endpoint.
		status: u16,
		/// Status message returned by the metadata endpoint.
		message: String,
	},
	/// Metadata endpoint kept throttling past the retry budget.
	#[error(
		"Could not fetch access token for the managed identity after {retries} retries. Status \
		 code: {status}, status message: {message}."
	)]
	ManagedIdentityThrottled {
		/// Retries performed before giving up.
		retries: u32,
		/// HTTP status code returned by the metadata endpoint.
		status: u16,
		/// Status message returned by the metadata endpoint.
		message: String,
	},
	/// Token endpoint answered 200 with a body the token schema rejects.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the malformed response.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request ({code}).")]
	Network {
		/// Classification consumed by retry policies.
		code: TransportErrorCode,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// TLS certificate validation failed.
	#[error(
		"TLS certificate validation failed. If the target uses a self-signed certificate, it must \
		 be signed by a trusted certificate authority; to proceed anyway, enable \
		 `TransportConfig::ignore_ssl_errors`."
	)]
	CertificateValidation {
		/// Transport-specific TLS error.
		#[source]
		source: BoxError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	ClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Request URI could not be constructed.
	#[error("Request URI could not be constructed.")]
	Uri(#[from] url::ParseError),
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Returns the retry classification for this failure, when one applies.
	pub fn code(&self) -> Option<TransportErrorCode> {
		match self {
			Self::Network { code, .. } => Some(*code),
			Self::CertificateValidation { .. } => Some(TransportErrorCode::TlsCertificate),
			_ => None,
		}
	}
}

/// Classification of transport failures, matched against retry policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorCode {
	/// Connection establishment timed out.
	ConnectionTimedOut,
	/// Peer reset the connection.
	ConnectionReset,
	/// Host name could not be resolved.
	HostNotFound,
	/// Socket read/write timed out.
	SocketTimeout,
	/// Peer refused the connection.
	ConnectionRefused,
	/// Host is unreachable.
	HostUnreachable,
	/// Pipe broke mid-transfer.
	BrokenPipe,
	/// Resource temporarily unavailable.
	ResourceTemporarilyUnavailable,
	/// TLS certificate validation failure; never retryable by default.
	TlsCertificate,
	/// Unclassified transport failure.
	Other,
}
impl TransportErrorCode {
	/// Returns a stable label suitable for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ConnectionTimedOut => "connection_timed_out",
			Self::ConnectionReset => "connection_reset",
			Self::HostNotFound => "host_not_found",
			Self::SocketTimeout => "socket_timeout",
			Self::ConnectionRefused => "connection_refused",
			Self::HostUnreachable => "host_unreachable",
			Self::BrokenPipe => "broken_pipe",
			Self::ResourceTemporarilyUnavailable => "resource_temporarily_unavailable",
			Self::TlsCertificate => "tls_certificate",
			Self::Other => "other",
		}
	}
}
impl Display for TransportErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Certificate inspection and assertion signing failures.
#[derive(Debug, ThisError)]
pub enum CertError {
	/// Fingerprint tool exited non-zero; carries its stderr.
	#[error("Certificate fingerprint tool failed: {stderr}")]
	FingerprintToolFailed {
		/// Standard error captured from the tool.
		stderr: String,
	},
	/// Fingerprint tool could not be started.
	#[error("Certificate fingerprint tool could not be invoked.")]
	FingerprintToolSpawn(#[source] std::io::Error),
	/// Fingerprint output was not a colon-delimited hex string.
	#[error("Certificate fingerprint output could not be parsed: {output}.")]
	FingerprintUnparsable {
		/// Raw tool output that failed to parse.
		output: String,
	},
	/// Certificate file could not be read.
	#[error("Certificate file could not be read.")]
	KeyRead(#[source] std::io::Error),
	/// RS256 signing of the client assertion failed.
	#[error("Client assertion could not be signed.")]
	Signing(#[source] jsonwebtoken::errors::Error),
}

/// Resource-management API failures surfaced by the dispatcher.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Structured error returned by the resource-management API.
	#[error("{0}")]
	Azure(#[from] AzureError),
	/// Neither the call nor the client supplied an `api-version`.
	#[error("Could not determine the api-version to use.")]
	MissingApiVersion,
	/// Resource group name violated a naming constraint.
	#[error("Resource group name must satisfy the constraint {constraint}.")]
	InvalidResourceGroupName {
		/// Human-readable constraint that was violated.
		constraint: &'static str,
	},
}

/// Structured error extracted from a resource-management API response body.
#[derive(Clone, Debug, Default, PartialEq, ThisError)]
#[error("{}", self.formatted())]
pub struct AzureError {
	/// Service-issued error code, when the body carried one.
	pub code: Option<String>,
	/// Error message; falls back to the raw response body.
	pub message: String,
	/// HTTP status code of the response.
	pub status_code: Option<u16>,
	/// Additional error details, verbatim.
	pub details: Option<serde_json::Value>,
}
impl AzureError {
	/// Renders the message with the status code appended for log correlation.
	pub fn formatted(&self) -> String {
		match self.status_code {
			Some(status) => format!("{} (CODE: {status})", self.message),
			None => self.message.clone(),
		}
	}
}

/// Clonable wrapper distributing one fetch failure to every concurrent waiter.
#[derive(Clone, Debug, ThisError)]
#[error(transparent)]
pub struct SharedFetchError(pub Arc<Error>);

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn azure_error_formats_status_code() {
		let error = AzureError {
			code: Some("ResourceNotFound".into()),
			message: "The resource was not found.".into(),
			status_code: Some(404),
			details: None,
		};

		assert_eq!(error.formatted(), "The resource was not found. (CODE: 404)");

		let bare = AzureError { message: "boom".into(), ..Default::default() };

		assert_eq!(bare.formatted(), "boom");
	}

	#[test]
	fn transport_error_exposes_retry_code() {
		let error = TransportError::Network {
			code: TransportErrorCode::ConnectionReset,
			source: "reset".into(),
		};

		assert_eq!(error.code(), Some(TransportErrorCode::ConnectionReset));
		assert_eq!(TransportError::Uri(url::ParseError::EmptyHost).code(), None);
	}
}
