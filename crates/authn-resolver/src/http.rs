//! Shared HTTP client construction.

use crate::errors::AuthError;
use std::time::Duration;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the HTTP client used for discovery, JWKS and token endpoint calls.
///
/// Every request made through it is bounded by `timeout`; a timed-out call
/// fails with the caller's typed error instead of hanging.
///
/// # Errors
///
/// Returns `AuthError::Configuration` if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {e}")))
}
