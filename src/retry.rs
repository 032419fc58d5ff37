//! Transport-agnostic retry wrapper with super-linear backoff.
//!
//! [`execute`] drives a single [`WebRequest`] through an [`HttpTransport`] until the
//! attempt budget of its [`RetryPolicy`] is spent. Two independent triggers cause a
//! retry: a transport failure whose [`TransportErrorCode`] is in the policy's
//! retryable-error set, and a response whose status code is in the retryable-status
//! set. Everything else returns immediately. The executor is stateless; each call owns
//! its attempt counter and backoff variable.

// self
use crate::{
	_prelude::*,
	error::{TransportError, TransportErrorCode},
	http::{HttpTransport, WebRequest, WebResponse},
};

/// Retry policy evaluated per request.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
	/// Transport error classifications worth another attempt.
	pub retryable_error_codes: HashSet<TransportErrorCode>,
	/// HTTP status codes worth another attempt.
	pub retryable_status_codes: HashSet<u16>,
	/// Total attempt budget, 1-indexed; the capping attempt is returned un-retried.
	pub retry_count: u32,
	/// Base backoff interval in seconds; also the growth factor.
	pub retry_interval_seconds: u64,
}
impl RetryPolicy {
	/// Default attempt budget.
	pub const DEFAULT_RETRY_COUNT: u32 = 5;
	/// Default base backoff interval in seconds.
	pub const DEFAULT_RETRY_INTERVAL_SECONDS: u64 = 2;

	/// Policy for the service-principal secret grant.
	///
	/// 403 is retryable here: a freshly rotated secret can race replication at the
	/// authority and succeed on a later attempt.
	pub fn secret_grant() -> Self {
		Self {
			retryable_status_codes: HashSet::from([400, 403, 408, 409, 500, 502, 503, 504]),
			..Default::default()
		}
	}

	/// Policy for the service-principal certificate grant.
	///
	/// Unlike [`RetryPolicy::secret_grant`], 403 is not retryable: a certificate
	/// rejection never heals on its own.
	pub fn certificate_grant() -> Self {
		Self {
			retryable_status_codes: HashSet::from([400, 408, 409, 500, 502, 503, 504]),
			..Default::default()
		}
	}

	/// Overrides the attempt budget.
	pub fn with_retry_count(mut self, retry_count: u32) -> Self {
		self.retry_count = retry_count;

		self
	}

	/// Overrides the base backoff interval.
	pub fn with_retry_interval(mut self, seconds: u64) -> Self {
		self.retry_interval_seconds = seconds;

		self
	}

	fn is_retryable_status(&self, status: u16) -> bool {
		self.retryable_status_codes.contains(&status)
	}

	fn is_retryable_error(&self, error: &TransportError) -> bool {
		error.code().is_some_and(|code| self.retryable_error_codes.contains(&code))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			retryable_error_codes: HashSet::from([
				TransportErrorCode::ConnectionTimedOut,
				TransportErrorCode::ConnectionReset,
				TransportErrorCode::HostNotFound,
				TransportErrorCode::SocketTimeout,
				TransportErrorCode::ConnectionRefused,
				TransportErrorCode::HostUnreachable,
				TransportErrorCode::BrokenPipe,
				TransportErrorCode::ResourceTemporarilyUnavailable,
			]),
			retryable_status_codes: HashSet::from([408, 409, 500, 502, 503, 504]),
			retry_count: Self::DEFAULT_RETRY_COUNT,
			retry_interval_seconds: Self::DEFAULT_RETRY_INTERVAL_SECONDS,
		}
	}
}

/// Sends `request` through `transport`, retrying per `policy`.
///
/// The backoff weight starts at `retry_interval_seconds` and grows as
/// `w = w * interval + interval` after every sleep, matching the metadata endpoint's
/// throttling profile but parameterized. No sleep follows the final attempt.
pub async fn execute<T>(
	transport: &T,
	request: &WebRequest,
	policy: &RetryPolicy,
) -> Result<WebResponse, TransportError>
where
	T: ?Sized + HttpTransport,
{
	let mut attempt = 1_u32;
	let mut wait_seconds = policy.retry_interval_seconds;

	loop {
		let outcome = transport.send(request).await;
		let retryable = match &outcome {
			Ok(response) => policy.is_retryable_status(response.status_code),
			Err(error) => policy.is_retryable_error(error),
		};

		if !retryable || attempt >= policy.retry_count {
			return outcome;
		}

		#[cfg(feature = "tracing")]
		match &outcome {
			Ok(response) => tracing::debug!(
				attempt,
				wait_seconds,
				status = response.status_code,
				"Encountered a retryable status code; backing off.",
			),
			Err(error) => tracing::debug!(
				attempt,
				wait_seconds,
				error = %error,
				"Encountered a retryable transport error; backing off.",
			),
		}

		tokio::time::sleep(Duration::from_secs(wait_seconds)).await;

		attempt += 1;
		wait_seconds = wait_seconds * policy.retry_interval_seconds + policy.retry_interval_seconds;
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::http::TransportFuture;

	enum Step {
		Status(u16),
		Error(TransportErrorCode),
	}

	struct ScriptedTransport {
		steps: Mutex<Vec<Step>>,
		attempts: AtomicU32,
	}
	impl ScriptedTransport {
		fn new(mut steps: Vec<Step>) -> Self {
			steps.reverse();

			Self { steps: Mutex::new(steps), attempts: AtomicU32::new(0) }
		}

		fn attempts(&self) -> u32 {
			self.attempts.load(Ordering::SeqCst)
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send<'a>(&'a self, _: &'a WebRequest) -> TransportFuture<'a> {
			self.attempts.fetch_add(1, Ordering::SeqCst);

			let step = self.steps.lock().pop().expect("Scripted transport ran out of steps.");

			Box::pin(async move {
				match step {
					Step::Status(status) =>
						Ok(WebResponse { status_code: status, ..Default::default() }),
					Step::Error(code) => Err(TransportError::Network {
						code,
						source: "scripted transport failure".into(),
					}),
				}
			})
		}
	}

	fn request() -> WebRequest {
		WebRequest::get("https://example.com/resource")
	}

	#[tokio::test(start_paused = true)]
	async fn retries_retryable_statuses_with_super_linear_backoff() {
		let transport = ScriptedTransport::new(vec![
			Step::Status(503),
			Step::Status(503),
			Step::Status(200),
		]);
		let started = tokio::time::Instant::now();
		let response = execute(&transport, &request(), &RetryPolicy::default())
			.await
			.expect("Final attempt should succeed.");

		assert_eq!(response.status_code, 200);
		assert_eq!(transport.attempts(), 3);
		// Two sleeps: 2s, then 2*2+2 = 6s.
		assert_eq!(started.elapsed(), Duration::from_secs(8));
	}

	#[tokio::test(start_paused = true)]
	async fn returns_final_response_at_attempt_cap() {
		let transport = ScriptedTransport::new(vec![
			Step::Status(500),
			Step::Status(500),
			Step::Status(500),
		]);
		let policy = RetryPolicy::default().with_retry_count(3);
		let started = tokio::time::Instant::now();
		let response = execute(&transport, &request(), &policy)
			.await
			.expect("Status-code failures surface as responses, not errors.");

		assert_eq!(response.status_code, 500);
		assert_eq!(transport.attempts(), 3);
		// No sleep after the capping attempt.
		assert_eq!(started.elapsed(), Duration::from_secs(8));
	}

	#[tokio::test]
	async fn non_retryable_status_returns_immediately() {
		let transport = ScriptedTransport::new(vec![Step::Status(404)]);
		let response = execute(&transport, &request(), &RetryPolicy::default())
			.await
			.expect("Non-retryable statuses surface as responses.");

		assert_eq!(response.status_code, 404);
		assert_eq!(transport.attempts(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn retryable_transport_errors_surface_after_cap() {
		let transport = ScriptedTransport::new(vec![
			Step::Error(TransportErrorCode::ConnectionReset),
			Step::Error(TransportErrorCode::ConnectionReset),
		]);
		let policy = RetryPolicy::default().with_retry_count(2);
		let error = execute(&transport, &request(), &policy)
			.await
			.expect_err("Exhausting the budget should surface the last error.");

		assert_eq!(error.code(), Some(TransportErrorCode::ConnectionReset));
		assert_eq!(transport.attempts(), 2);
	}

	#[tokio::test]
	async fn non_retryable_error_code_surfaces_immediately() {
		let transport = ScriptedTransport::new(vec![Step::Error(TransportErrorCode::TlsCertificate)]);
		let error = execute(&transport, &request(), &RetryPolicy::default())
			.await
			.expect_err("TLS validation failures must not be retried.");

		assert_eq!(error.code(), Some(TransportErrorCode::TlsCertificate));
		assert_eq!(transport.attempts(), 1);
	}

	#[test]
	fn grant_policies_diverge_on_403() {
		assert!(RetryPolicy::secret_grant().is_retryable_status(403));
		assert!(!RetryPolicy::certificate_grant().is_retryable_status(403));
		assert!(RetryPolicy::certificate_grant().is_retryable_status(400));
	}
}
