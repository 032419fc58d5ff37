//! Immutable credential configuration with construction-time validation.

// std
use std::path::{Path, PathBuf};
// self
use crate::{_prelude::*, error::CredentialError};

/// Well-known instance metadata endpoint serving managed-identity tokens.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254";

/// Redacted bearer token wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a new token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Redacted client-secret wrapper.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Authentication method, carrying its exclusive payload.
///
/// Encoding the secret-or-certificate choice in the variant makes the mutual
/// exclusion unrepresentable rather than validated.
#[derive(Clone, Debug)]
pub enum AuthMethod {
	/// Service principal authenticating with a shared secret.
	ServicePrincipalSecret {
		/// Client secret issued for the service principal.
		secret: Secret,
	},
	/// Service principal proving possession of a certificate's private key.
	ServicePrincipalCertificate {
		/// Path to the PEM file holding the certificate and private key.
		certificate_path: PathBuf,
	},
	/// Ambient managed identity resolved from the local metadata endpoint.
	ManagedIdentity {
		/// User-assigned identity client id; `None` selects the system identity.
		client_id: Option<String>,
	},
	/// Caller-supplied bearer token bypassing the authentication subsystem.
	PresuppliedToken {
		/// Token attached verbatim to outbound requests.
		token: AccessToken,
	},
}
impl AuthMethod {
	/// Whether this method authenticates a service principal.
	pub fn is_service_principal(&self) -> bool {
		matches!(
			self,
			Self::ServicePrincipalSecret { .. } | Self::ServicePrincipalCertificate { .. }
		)
	}
}

/// Validated, immutable credential configuration.
#[derive(Clone, Debug)]
pub struct CredentialConfig {
	method: AuthMethod,
	tenant_id: String,
	client_id: Option<String>,
	base_url: Url,
	authority_url: Url,
	resource_id: Url,
	is_azure_stack: bool,
	adfs_enabled: bool,
	metadata_endpoint: Url,
}
impl CredentialConfig {
	/// Starts a builder for the provided authentication method.
	pub fn builder(method: AuthMethod) -> CredentialConfigBuilder {
		CredentialConfigBuilder::new(method)
	}

	/// Authentication method.
	pub fn method(&self) -> &AuthMethod {
		&self.method
	}

	/// Tenant/directory identifier.
	pub fn tenant_id(&self) -> &str {
		&self.tenant_id
	}

	/// Client identifier; present for service-principal methods.
	pub fn client_id(&self) -> Option<&str> {
		self.client_id.as_deref()
	}

	/// Base URL of the target resource-management API.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Authority base URL for token requests.
	pub fn authority_url(&self) -> &Url {
		&self.authority_url
	}

	/// Target resource/audience URL for token requests.
	pub fn resource_id(&self) -> &Url {
		&self.resource_id
	}

	/// Whether the target is an Azure Stack environment.
	pub fn is_azure_stack(&self) -> bool {
		self.is_azure_stack
	}

	/// Whether ADFS audience construction applies (tenant omitted).
	pub fn adfs_enabled(&self) -> bool {
		self.adfs_enabled
	}

	/// Managed-identity metadata endpoint base.
	pub fn metadata_endpoint(&self) -> &Url {
		&self.metadata_endpoint
	}

	/// Returns the certificate path when the certificate grant is configured.
	pub fn certificate_path(&self) -> Option<&Path> {
		match &self.method {
			AuthMethod::ServicePrincipalCertificate { certificate_path } =>
				Some(certificate_path.as_path()),
			_ => None,
		}
	}
}

/// Builder for [`CredentialConfig`] values; `build` validates every field once.
#[derive(Debug)]
pub struct CredentialConfigBuilder {
	method: AuthMethod,
	tenant_id: Option<String>,
	client_id: Option<String>,
	base_url: Option<Url>,
	authority_url: Option<Url>,
	resource_id: Option<Url>,
	is_azure_stack: bool,
	adfs_enabled: bool,
	metadata_endpoint: Option<Url>,
}
impl CredentialConfigBuilder {
	fn new(method: AuthMethod) -> Self {
		Self {
			method,
			tenant_id: None,
			client_id: None,
			base_url: None,
			authority_url: None,
			resource_id: None,
			is_azure_stack: false,
			adfs_enabled: false,
			metadata_endpoint: None,
		}
	}

	/// Sets the tenant/directory identifier.
	pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
		self.tenant_id = Some(tenant_id.into());

		self
	}

	/// Sets the client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the base resource-management API URL.
	pub fn base_url(mut self, base_url: Url) -> Self {
		self.base_url = Some(base_url);

		self
	}

	/// Sets the authority base URL.
	pub fn authority_url(mut self, authority_url: Url) -> Self {
		self.authority_url = Some(authority_url);

		self
	}

	/// Sets the target resource/audience URL.
	pub fn resource_id(mut self, resource_id: Url) -> Self {
		self.resource_id = Some(resource_id);

		self
	}

	/// Marks the target as an Azure Stack environment (defaults to false).
	pub fn azure_stack(mut self, is_azure_stack: bool) -> Self {
		self.is_azure_stack = is_azure_stack;

		self
	}

	/// Enables ADFS audience construction (defaults to false).
	pub fn adfs_enabled(mut self, adfs_enabled: bool) -> Self {
		self.adfs_enabled = adfs_enabled;

		self
	}

	/// Overrides the managed-identity metadata endpoint (tests, sovereign clouds).
	pub fn metadata_endpoint(mut self, metadata_endpoint: Url) -> Self {
		self.metadata_endpoint = Some(metadata_endpoint);

		self
	}

	/// Consumes the builder, validating the resulting configuration.
	pub fn build(self) -> Result<CredentialConfig, CredentialError> {
		let tenant_id = non_empty(self.tenant_id, CredentialError::EmptyTenant)?;
		let client_id = if self.method.is_service_principal() {
			Some(non_empty(self.client_id, CredentialError::EmptyClient)?)
		} else {
			self.client_id
		};

		validate_method(&self.method)?;

		let base_url = self.base_url.ok_or(CredentialError::MissingBaseUrl)?;
		let authority_url = self.authority_url.ok_or(CredentialError::MissingAuthorityUrl)?;
		let resource_id = self.resource_id.ok_or(CredentialError::MissingResourceId)?;
		let metadata_endpoint = match self.metadata_endpoint {
			Some(endpoint) => endpoint,
			None => default_metadata_endpoint(),
		};

		Ok(CredentialConfig {
			method: self.method,
			tenant_id,
			client_id,
			base_url,
			authority_url,
			resource_id,
			is_azure_stack: self.is_azure_stack,
			adfs_enabled: self.adfs_enabled,
			metadata_endpoint,
		})
	}
}

fn validate_method(method: &AuthMethod) -> Result<(), CredentialError> {
	match method {
		AuthMethod::ServicePrincipalSecret { secret } if secret.expose().trim().is_empty() =>
			Err(CredentialError::EmptySecret),
		AuthMethod::ServicePrincipalCertificate { certificate_path }
			if certificate_path.as_os_str().is_empty() =>
			Err(CredentialError::EmptyCertificatePath),
		AuthMethod::ManagedIdentity { client_id: Some(client_id) }
			if client_id.trim().is_empty() =>
			Err(CredentialError::EmptyIdentityClient),
		AuthMethod::PresuppliedToken { token } if token.expose().trim().is_empty() =>
			Err(CredentialError::EmptyAccessToken),
		_ => Ok(()),
	}
}

fn non_empty(value: Option<String>, err: CredentialError) -> Result<String, CredentialError> {
	match value {
		Some(value) if !value.trim().is_empty() => Ok(value),
		_ => Err(err),
	}
}

fn default_metadata_endpoint() -> Url {
	// The literal is a valid URL; this parse cannot fail.
	Url::parse(DEFAULT_METADATA_ENDPOINT).expect("Default metadata endpoint literal must parse.")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn urls() -> (Url, Url, Url) {
		(
			Url::parse("https://management.azure.com").expect("Base URL fixture must parse."),
			Url::parse("https://login.microsoftonline.com")
				.expect("Authority URL fixture must parse."),
			Url::parse("https://management.core.windows.net")
				.expect("Resource URL fixture must parse."),
		)
	}

	fn secret_builder() -> CredentialConfigBuilder {
		let (base, authority, resource) = urls();

		CredentialConfig::builder(AuthMethod::ServicePrincipalSecret {
			secret: Secret::new("spn-secret"),
		})
		.tenant_id("tenant-1")
		.client_id("client-1")
		.base_url(base)
		.authority_url(authority)
		.resource_id(resource)
	}

	#[test]
	fn build_validates_required_fields() {
		let config = secret_builder().build().expect("Complete configuration should build.");

		assert_eq!(config.tenant_id(), "tenant-1");
		assert_eq!(config.client_id(), Some("client-1"));
		assert!(!config.is_azure_stack());
		assert!(!config.adfs_enabled());
		assert_eq!(config.metadata_endpoint().as_str(), "http://169.254.169.254/");
	}

	#[test]
	fn empty_tenant_is_rejected() {
		let error = secret_builder().tenant_id("  ").build().expect_err("Blank tenant must fail.");

		assert_eq!(error, CredentialError::EmptyTenant);
	}

	#[test]
	fn service_principal_requires_client_id() {
		let (base, authority, resource) = urls();
		let error = CredentialConfig::builder(AuthMethod::ServicePrincipalSecret {
			secret: Secret::new("spn-secret"),
		})
		.tenant_id("tenant-1")
		.base_url(base)
		.authority_url(authority)
		.resource_id(resource)
		.build()
		.expect_err("Missing client id must fail for service principals.");

		assert_eq!(error, CredentialError::EmptyClient);
	}

	#[test]
	fn managed_identity_does_not_require_client_id() {
		let (base, authority, resource) = urls();
		let config =
			CredentialConfig::builder(AuthMethod::ManagedIdentity { client_id: None })
				.tenant_id("tenant-1")
				.base_url(base)
				.authority_url(authority)
				.resource_id(resource)
				.build()
				.expect("Managed identity without client id should build.");

		assert_eq!(config.client_id(), None);
	}

	#[test]
	fn empty_payloads_are_rejected() {
		let (base, authority, resource) = urls();
		let build = |method: AuthMethod| {
			CredentialConfig::builder(method)
				.tenant_id("tenant-1")
				.client_id("client-1")
				.base_url(base.clone())
				.authority_url(authority.clone())
				.resource_id(resource.clone())
				.build()
		};

		assert_eq!(
			build(AuthMethod::ServicePrincipalSecret { secret: Secret::new("") })
				.expect_err("Blank secret must fail."),
			CredentialError::EmptySecret,
		);
		assert_eq!(
			build(AuthMethod::ServicePrincipalCertificate { certificate_path: PathBuf::new() })
				.expect_err("Empty certificate path must fail."),
			CredentialError::EmptyCertificatePath,
		);
		assert_eq!(
			build(AuthMethod::ManagedIdentity { client_id: Some(String::new()) })
				.expect_err("Blank identity client id must fail."),
			CredentialError::EmptyIdentityClient,
		);
		assert_eq!(
			build(AuthMethod::PresuppliedToken { token: AccessToken::new("") })
				.expect_err("Blank pre-supplied token must fail."),
			CredentialError::EmptyAccessToken,
		);
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");
		let token = AccessToken::new("bearer-token");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{token}"), "<redacted>");
		assert!(!format!("{token:?}").contains("bearer-token"));
	}
}
