//! Credential configuration, token acquisition, and certificate assertion signing.
//!
//! [`CredentialConfig`] validates once at construction and is immutable afterwards.
//! [`TokenCredentials`] owns the token-fetch memoization: concurrent callers share a
//! single in-flight fetch, and a forced refresh atomically replaces it. The
//! certificate grant builds its signed JWT client assertion in [`assertion`].

pub mod assertion;
pub mod config;
pub mod provider;

pub use config::*;
pub use provider::*;
