//! OIDC client token manager.
//!
//! Obtains access tokens for outbound calls from the provider's token
//! endpoint, found through discovery. Uses the client credentials grant, or
//! the password grant when a username and password are configured.
//!
//! # Caching
//!
//! Off by default: every [`OidcClientCredentialsManager::get_token`] call
//! requests a new token. When enabled, a token is reused until it is within
//! the refresh threshold plus a clock-drift margin of its `expires_in`.
//! Tokens without `expires_in` are never cached.
//!
//! # Security
//!
//! - Client secret, password and tokens are held as `SecretString`
//! - Token acquisition events are logged without values
//! - Error response bodies are logged at trace level only

use crate::errors::AuthError;
use crate::oidc::discovery::OidcDiscoveryService;
use common::clock::{Clock, SystemClock};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Default refresh threshold (60 seconds before expiration).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

/// Clock drift safety margin (30 seconds).
///
/// Cached tokens are dropped this much earlier than the refresh threshold
/// alone would require, to absorb clock differences with the provider.
const CLOCK_DRIFT_MARGIN_SECS: i64 = 30;

/// OAuth 2.0 grant used at the token endpoint.
#[derive(Clone)]
pub enum Grant {
    /// `grant_type=client_credentials`.
    ClientCredentials,

    /// `grant_type=password` on behalf of a user.
    Password {
        /// Resource owner username.
        username: String,
        /// Resource owner password.
        password: SecretString,
    },
}

impl Grant {
    fn grant_type(&self) -> &'static str {
        match self {
            Grant::ClientCredentials => "client_credentials",
            Grant::Password { .. } => "password",
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::ClientCredentials => f.write_str("ClientCredentials"),
            Grant::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// OAuth 2.0 token response.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

struct CachedToken {
    token: SecretString,
    expires_at: i64,
}

/// Acquires tokens from an OIDC provider's token endpoint.
pub struct OidcClientCredentialsManager {
    issuer_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
    grant: Grant,
    http_client: reqwest::Client,
    discovery: Arc<OidcDiscoveryService>,
    clock: Arc<dyn Clock>,
    refresh_threshold: Duration,
    cache: Option<Mutex<Option<CachedToken>>>,
}

impl fmt::Debug for OidcClientCredentialsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClientCredentialsManager")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("grant", &self.grant)
            .field("caching", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl OidcClientCredentialsManager {
    /// Create a manager using the client credentials grant, caching disabled.
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<SecretString>,
        http_client: reqwest::Client,
        discovery: Arc<OidcDiscoveryService>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret,
            grant: Grant::ClientCredentials,
            http_client,
            discovery,
            clock: Arc::new(SystemClock),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            cache: None,
        }
    }

    /// Use the given grant instead of client credentials.
    #[must_use]
    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grant = grant;
        self
    }

    /// Enable or disable reuse of acquired tokens.
    #[must_use]
    pub fn with_token_caching(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| Mutex::new(None));
        self
    }

    /// Set how long before expiry a cached token is replaced.
    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Time source for cached-token expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get an access token for outbound calls.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenAcquisition` if discovery fails or the token
    /// endpoint does not answer 200 with a non-empty `access_token`.
    pub async fn get_token(&self) -> Result<SecretString, AuthError> {
        let Some(cache) = &self.cache else {
            return self.acquire_token().await.map(|(token, _)| token);
        };

        // Held across acquisition so concurrent callers share one request.
        let mut cached = cache.lock().await;
        if let Some(entry) = cached.as_ref() {
            if !self.needs_refresh(entry.expires_at) {
                tracing::trace!(target: "authn.client.oidc", "Reusing cached token");
                return Ok(entry.token.clone());
            }
        }

        let (token, expires_at) = self.acquire_token().await?;
        *cached = expires_at.map(|expires_at| CachedToken {
            token: token.clone(),
            expires_at,
        });

        Ok(token)
    }

    fn needs_refresh(&self, expires_at: i64) -> bool {
        let threshold_secs = i64::try_from(self.refresh_threshold.as_secs()).unwrap_or(i64::MAX);
        expires_at.saturating_sub(self.clock.now_unix())
            <= threshold_secs.saturating_add(CLOCK_DRIFT_MARGIN_SECS)
    }

    /// Request a new token. Returns the token and its expiration (Unix
    /// timestamp) when the provider sent `expires_in`.
    #[instrument(skip_all, fields(client_id = %self.client_id))]
    async fn acquire_token(&self) -> Result<(SecretString, Option<i64>), AuthError> {
        let discovery = self
            .discovery
            .get_discovery(&self.issuer_url)
            .await
            .map_err(|e| {
                tracing::warn!(target: "authn.client.oidc", error = %e, "Discovery failed, cannot acquire token");
                AuthError::TokenAcquisition("Identity provider discovery failed".to_string())
            })?;

        tracing::debug!(
            target: "authn.client.oidc",
            url = %discovery.token_endpoint,
            grant_type = self.grant.grant_type(),
            "Requesting token"
        );

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", self.grant.grant_type()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }
        if let Grant::Password { username, password } = &self.grant {
            form.push(("username", username.as_str()));
            form.push(("password", password.expose_secret()));
        }

        let response = self
            .http_client
            .post(&discovery.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "authn.client.oidc", error = %e, "Token request failed");
                AuthError::TokenAcquisition("Token endpoint unavailable".to_string())
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            // Read response body for diagnostics, but only log at trace level
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(target: "authn.client.oidc", status = %status, "Token endpoint rejected request");
            tracing::trace!(target: "authn.client.oidc", body = %body, "Token endpoint response body");
            return Err(AuthError::TokenAcquisition(format!("Status {status}")));
        }

        let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
            tracing::warn!(target: "authn.client.oidc", error = %e, "Failed to parse token response");
            AuthError::TokenAcquisition("Invalid token response".to_string())
        })?;

        if token_response.access_token.is_empty() {
            tracing::warn!(target: "authn.client.oidc", "Token response has an empty access_token");
            return Err(AuthError::TokenAcquisition("Invalid token response".to_string()));
        }

        let expires_at = token_response.expires_in.map(|expires_in| {
            self.clock
                .now_unix()
                .saturating_add(i64::try_from(expires_in).unwrap_or(i64::MAX))
        });

        tracing::debug!(
            target: "authn.client.oidc",
            expires_in_secs = ?token_response.expires_in,
            "Token acquired successfully"
        );

        Ok((SecretString::from(token_response.access_token), expires_at))
    }
}
