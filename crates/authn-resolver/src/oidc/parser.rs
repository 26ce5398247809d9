//! OIDC token parser.
//!
//! Turns a bearer token issued by the configured provider into an
//! [`Identity`]: `preferred_username` becomes the subject and the roles are
//! read from `resource_access[client_id].roles`.
//!
//! Network calls happen only on cache misses (discovery, key set).

use crate::errors::AuthError;
use crate::identity::Identity;
use crate::oidc::discovery::OidcDiscoveryService;
use crate::oidc::jwks::JwksKeyResolver;
use crate::oidc::verifier::{verify_token, TokenExpectations};
use common::clock::{Clock, SystemClock};
use common::jwt::{extract_kid, DEFAULT_CLOCK_SKEW};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Resolves OIDC access tokens to identities.
pub struct OidcTokenParser {
    issuer_url: String,
    client_id: String,
    audience: Option<String>,
    clock_skew: Duration,
    discovery: Arc<OidcDiscoveryService>,
    jwks: Arc<JwksKeyResolver>,
    clock: Arc<dyn Clock>,
}

impl OidcTokenParser {
    /// Create a parser for tokens issued by `issuer_url`.
    ///
    /// No audience check, default clock skew, system clock.
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        discovery: Arc<OidcDiscoveryService>,
        jwks: Arc<JwksKeyResolver>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            audience: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            discovery,
            jwks,
            clock: Arc::new(SystemClock),
        }
    }

    /// Require `aud` to contain `audience`.
    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    /// Tolerance for `exp` and `iat`.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Time source for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Client id whose roles are read from `resource_access`.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Resolve a token using the configured client id.
    ///
    /// # Errors
    ///
    /// See [`OidcTokenParser::parse_for_client`].
    pub async fn parse(&self, token: &str) -> Result<Identity, AuthError> {
        self.parse_for_client(token, &self.client_id).await
    }

    /// Resolve a token, reading roles granted for `client_id`.
    ///
    /// # Security Checks
    ///
    /// 1. Size check and `kid` extraction (unverified header)
    /// 2. Discovery document for the configured issuer
    /// 3. Signing key for `kid` (one refetch on miss)
    /// 4. Signature, issuer, audience, `exp` and `iat`
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` / `AuthError::ExpiredToken` - token rejected
    /// - `AuthError::Discovery` - provider metadata unavailable
    /// - `AuthError::KeyRetrieval` / `AuthError::UnknownKey` - no signing key
    #[instrument(skip_all)]
    pub async fn parse_for_client(&self, token: &str, client_id: &str) -> Result<Identity, AuthError> {
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "authn.oidc.parser", error = ?e, "Token kid extraction failed");
            AuthError::from(e)
        })?;

        let discovery = self.discovery.get_discovery(&self.issuer_url).await?;

        let key = match self.jwks.get_signing_key(&discovery.jwks_uri, &kid).await {
            Ok(key) => key,
            Err(err @ AuthError::KeyRetrieval(_)) => {
                // The jwks_uri may have moved; re-discover on the next request.
                tracing::warn!(
                    target: "authn.oidc.parser",
                    error = %err,
                    "Key retrieval failed, invalidating discovery document"
                );
                self.discovery.invalidate(&self.issuer_url).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let expectations = TokenExpectations {
            issuer: &self.issuer_url,
            audience: self.audience.as_deref(),
            clock_skew: self.clock_skew,
        };
        let claims = verify_token(token, &key, &expectations, self.clock.now_unix())?;

        let roles = claims.client_roles(client_id).to_vec();
        let subject = claims
            .preferred_username
            .filter(|username| !username.is_empty())
            .ok_or_else(|| {
                tracing::debug!(target: "authn.oidc.parser", "Token has no preferred_username");
                AuthError::InvalidToken("The access token is invalid or expired".to_string())
            })?;

        tracing::debug!(
            target: "authn.oidc.parser",
            role_count = roles.len(),
            "Token validated successfully"
        );

        Ok(Identity::new(subject, roles))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::RetryPolicy;
    use crate::http::build_http_client;
    use authn_test_utils::{MockOidcProvider, TestKeypair};
    use common::clock::FixedClock;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn parser_for(provider: &MockOidcProvider) -> OidcTokenParser {
        let http = build_http_client(Duration::from_secs(2)).unwrap();
        OidcTokenParser::new(
            provider.issuer(),
            "feast",
            Arc::new(OidcDiscoveryService::new(http.clone(), None, fast_retry())),
            Arc::new(JwksKeyResolver::new(http, None, fast_retry())),
        )
    }

    #[tokio::test]
    async fn test_subject_and_roles() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(None).await;
        provider.mount_jwks(&[provider.keypair()], None).await;

        let token = provider.sign(
            &provider
                .claims()
                .for_user("my-name")
                .with_client_roles("feast", &["reader", "writer"])
                .with_client_roles("account", &["manage-account"])
                .build(),
        );

        let identity = parser_for(&provider).parse(&token).await.unwrap();

        assert_eq!(identity.subject(), "my-name");
        assert_eq!(identity, Identity::new("my-name", ["reader", "writer"]));
    }

    #[tokio::test]
    async fn test_parse_for_other_client() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(None).await;
        provider.mount_jwks(&[provider.keypair()], None).await;

        let token = provider.sign(
            &provider
                .claims()
                .with_client_roles("account", &["manage-account"])
                .build(),
        );

        let parser = parser_for(&provider);
        let feast = parser.parse(&token).await.unwrap();
        let account = parser.parse_for_client(&token, "account").await.unwrap();

        assert!(feast.roles().is_empty());
        assert!(account.has_role("manage-account"));
    }

    #[tokio::test]
    async fn test_missing_username_is_invalid() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(None).await;
        provider.mount_jwks(&[provider.keypair()], None).await;

        let token = provider.sign(&provider.claims().without_username().build());

        let err = parser_for(&provider).parse(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_injected_clock_drives_expiry() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(None).await;
        provider.mount_jwks(&[provider.keypair()], None).await;

        let issued = chrono::Utc::now().timestamp();
        let token = provider.sign(
            &provider
                .claims()
                .issued_at(issued)
                .expires_at(issued + 600)
                .build(),
        );

        let clock = Arc::new(FixedClock::new(issued));
        let parser = parser_for(&provider)
            .with_clock_skew(Duration::from_secs(30))
            .with_clock(clock.clone());

        assert!(parser.parse(&token).await.is_ok());

        clock.advance(600);
        assert!(parser.parse(&token).await.is_ok());

        // One second past exp; the 30s skew does not apply to exp
        clock.advance(1);
        assert_eq!(parser.parse(&token).await.unwrap_err(), AuthError::ExpiredToken);
    }

    #[tokio::test]
    async fn test_token_without_kid_makes_no_network_calls() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(Some(0)).await;

        let err = parser_for(&provider).parse("a.b.c").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_key_retrieval_failure_invalidates_discovery() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(Some(2)).await;
        provider.mount_jwks_failure(500).await;

        let parser = parser_for(&provider);
        let token = provider.sign(&provider.claims().build());

        let first = parser.parse(&token).await.unwrap_err();
        let second = parser.parse(&token).await.unwrap_err();

        assert!(matches!(first, AuthError::KeyRetrieval(_)), "got {first:?}");
        assert!(matches!(second, AuthError::KeyRetrieval(_)), "got {second:?}");
    }

    #[tokio::test]
    async fn test_token_signed_by_unpublished_key() {
        let provider = MockOidcProvider::start().await;
        provider.mount_discovery(None).await;
        provider.mount_jwks(&[provider.keypair()], None).await;

        let rogue = TestKeypair::new(99, "rogue-key");
        let token = rogue.sign(&provider.claims().build());

        let err = parser_for(&provider).parse(&token).await.unwrap_err();
        assert_eq!(err, AuthError::UnknownKey("rogue-key".to_string()));
    }
}
