//! OIDC discovery client.
//!
//! Fetches `{issuer}/.well-known/openid-configuration` and caches the parsed
//! document per issuer. A failed refresh never evicts a previously fetched
//! document; it is served with a logged warning until a refresh succeeds.

use crate::cache::{Refresh, RefreshCache, RetryPolicy};
use crate::errors::AuthError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Path of the discovery document relative to the issuer URL.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Provider metadata needed by the parsers and client managers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    /// Authorization endpoint (interactive flows).
    pub authorization_endpoint: String,

    /// Token endpoint (client credentials / password grants).
    pub token_endpoint: String,

    /// JWKS endpoint publishing the signing keys.
    pub jwks_uri: String,
}

/// Build the discovery URL for `issuer_url`.
pub fn discovery_url(issuer_url: &str) -> String {
    format!("{}{}", issuer_url.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Discovery client with a per-issuer single-flight cache.
pub struct OidcDiscoveryService {
    http_client: reqwest::Client,
    cache: RefreshCache<DiscoveryDocument>,
}

impl OidcDiscoveryService {
    /// Create a discovery service.
    ///
    /// # Arguments
    ///
    /// * `http_client` - Client carrying the request timeout
    /// * `ttl` - Cache TTL; `None` refreshes only after invalidation
    /// * `retry` - Retry policy applied to each refresh
    pub fn new(http_client: reqwest::Client, ttl: Option<Duration>, retry: RetryPolicy) -> Self {
        Self {
            http_client,
            cache: RefreshCache::new("discovery", ttl, retry),
        }
    }

    /// Get the discovery document for `issuer_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Discovery` if no document could be fetched and none
    /// was cached before.
    #[instrument(skip(self), fields(issuer = %issuer_url))]
    pub async fn get_discovery(&self, issuer_url: &str) -> Result<Arc<DiscoveryDocument>, AuthError> {
        let url = discovery_url(issuer_url);
        let lookup = self
            .cache
            .get(issuer_url, Refresh::IfStale, || fetch_discovery(&self.http_client, &url))
            .await?;
        Ok(lookup.value)
    }

    /// Mark the cached document for `issuer_url` stale.
    ///
    /// The next lookup re-fetches; the old document stays available as a
    /// fallback if that fetch fails.
    pub async fn invalidate(&self, issuer_url: &str) {
        self.cache.invalidate(issuer_url).await;
    }
}

/// Fetch and parse one discovery document.
async fn fetch_discovery(http_client: &reqwest::Client, url: &str) -> Result<DiscoveryDocument, AuthError> {
    tracing::debug!(target: "authn.oidc.discovery", url = %url, "Fetching discovery document");

    let response = http_client.get(url).send().await.map_err(|e| {
        tracing::error!(target: "authn.oidc.discovery", error = %e, "Failed to fetch discovery document");
        AuthError::Discovery("Identity provider unavailable".to_string())
    })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        tracing::error!(
            target: "authn.oidc.discovery",
            status = %status,
            "Discovery endpoint returned error"
        );
        return Err(AuthError::Discovery(format!("Unexpected status {status}")));
    }

    let document: DiscoveryDocument = response.json().await.map_err(|e| {
        tracing::error!(target: "authn.oidc.discovery", error = %e, "Failed to parse discovery document");
        AuthError::Discovery("Malformed discovery document".to_string())
    })?;

    tracing::info!(
        target: "authn.oidc.discovery",
        token_endpoint = %document.token_endpoint,
        jwks_uri = %document.jwks_uri,
        "Discovery document refreshed"
    );

    Ok(document)
}
