//! Credential-aware REST plumbing for Azure Resource Manager—service principal, managed
//! identity, and pre-supplied token auth behind one resilient, retry-smart dispatcher.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod credential;
pub mod error;
pub mod http;
pub mod obs;
pub mod retry;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		credential::{AuthMethod, CredentialConfig},
		http::ReqwestTransport,
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Builds a credential configuration whose base, authority, and resource URIs all
	/// point at the provided mock endpoint.
	pub fn test_credential_config(method: AuthMethod, endpoint: &str) -> CredentialConfig {
		let url = Url::parse(endpoint).expect("Mock endpoint must be a valid URL.");

		CredentialConfig::builder(method)
			.tenant_id("tenant-1")
			.client_id("client-1")
			.base_url(url.clone())
			.authority_url(url.clone())
			.resource_id(url.clone())
			.metadata_endpoint(url)
			.build()
			.expect("Test credential configuration must be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::HashSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use arm_rest_client as _;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
