//! Signed JWT client assertions for the certificate grant.
//!
//! The token endpoint locates the matching public certificate through the `x5t`
//! (X.509 thumbprint) JWT header, derived from the SHA-1 fingerprint that an external
//! `openssl` invocation reports for the certificate file. The assertion itself is
//! signed RS256 with the private key read from the same file.

// std
use std::path::Path;
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::process::Command;
// self
use crate::{_prelude::*, client::collapse_duplicate_slashes, error::CertError};

/// Clock-skew tolerance subtracted from `nbf`.
const CLOCK_SKEW_SECONDS: i64 = 1_000;
/// Assertion lifetime (100 days). The assertion is single-use per token request, so a
/// long lifetime avoids frequent re-signing without widening exposure.
const ASSERTION_LIFETIME_SECONDS: i64 = 8_640_000;

#[derive(Serialize)]
struct AssertionClaims<'a> {
	aud: String,
	iss: &'a str,
	sub: &'a str,
	jti: String,
	nbf: i64,
	exp: i64,
}

/// Builds the compact-serialized, signed client assertion for the certificate grant.
pub async fn sign_client_assertion(
	authority_url: &Url,
	client_id: &str,
	tenant_id: &str,
	certificate_path: &Path,
	adfs_enabled: bool,
) -> Result<String, CertError> {
	let fingerprint = certificate_fingerprint(certificate_path).await?;
	let x5t = fingerprint_to_x5t(&fingerprint)?;
	let pem = tokio::fs::read(certificate_path).await.map_err(CertError::KeyRead)?;
	let key = EncodingKey::from_rsa_pem(&pem).map_err(CertError::Signing)?;
	let mut header = Header::new(Algorithm::RS256);

	header.x5t = Some(x5t);

	let now = OffsetDateTime::now_utc().unix_timestamp();
	let claims = AssertionClaims {
		aud: assertion_audience(authority_url, tenant_id, adfs_enabled),
		iss: client_id,
		sub: client_id,
		jti: format!("{:032x}", rand::random::<u128>()),
		nbf: now - CLOCK_SKEW_SECONDS,
		exp: now + ASSERTION_LIFETIME_SECONDS,
	};

	jsonwebtoken::encode(&header, &claims, &key).map_err(CertError::Signing)
}

/// Runs the external fingerprint tool and returns its stdout.
async fn certificate_fingerprint(certificate_path: &Path) -> Result<String, CertError> {
	let output = Command::new("openssl")
		.args(["x509", "-noout", "-in"])
		.arg(certificate_path)
		.arg("-fingerprint")
		.output()
		.await
		.map_err(CertError::FingerprintToolSpawn)?;

	if !output.status.success() {
		return Err(CertError::FingerprintToolFailed {
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		});
	}

	Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Converts a `Label=AA:BB:..`-style fingerprint into the base64 `x5t` header value.
fn fingerprint_to_x5t(fingerprint: &str) -> Result<String, CertError> {
	let unparsable = || CertError::FingerprintUnparsable { output: fingerprint.trim().to_owned() };
	let hex = fingerprint.rsplit('=').next().unwrap_or(fingerprint).trim().replace(':', "");

	if hex.is_empty() || hex.len() % 2 != 0 {
		return Err(unparsable());
	}

	let mut bytes = Vec::with_capacity(hex.len() / 2);

	for chunk in hex.as_bytes().chunks(2) {
		let pair = std::str::from_utf8(chunk).map_err(|_| unparsable())?;

		bytes.push(u8::from_str_radix(pair, 16).map_err(|_| unparsable())?);
	}

	Ok(STANDARD.encode(&bytes))
}

/// Audience for the assertion; ADFS drops the tenant segment.
fn assertion_audience(authority_url: &Url, tenant_id: &str, adfs_enabled: bool) -> String {
	let tenant = if adfs_enabled { "" } else { tenant_id };

	collapse_duplicate_slashes(&format!("{authority_url}/{tenant}/oauth2/token"))
}
