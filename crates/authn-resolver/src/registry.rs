//! Token parser registry.
//!
//! Holds the single parser chosen at startup and exposes the resolver's
//! public contract: `resolve(bearer_token) -> Identity | AuthError`.

use crate::config::{Backend, BackendConfig, Config};
use crate::errors::AuthError;
use crate::http::build_http_client;
use crate::identity::Identity;
use crate::kubernetes::parser::KubernetesTokenParser;
use crate::oidc::discovery::OidcDiscoveryService;
use crate::oidc::jwks::JwksKeyResolver;
use crate::oidc::parser::OidcTokenParser;
use std::sync::Arc;
use tracing::instrument;

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` if the scheme is not `Bearer` or the
/// token is empty.
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "authn.registry", "Invalid Authorization header format");
        AuthError::InvalidToken("Invalid Authorization header format".to_string())
    })?;

    let token = token.trim();
    if token.is_empty() {
        tracing::debug!(target: "authn.registry", "Empty bearer token");
        return Err(AuthError::InvalidToken("Missing bearer token".to_string()));
    }

    Ok(token)
}

/// The configured token parser.
pub enum TokenParser {
    /// Verified JWTs from an OIDC provider.
    Oidc(OidcTokenParser),
    /// Service-account tokens mapped through RBAC RoleBindings.
    Kubernetes(KubernetesTokenParser),
}

impl TokenParser {
    /// Backend this parser serves.
    pub fn backend(&self) -> Backend {
        match self {
            TokenParser::Oidc(_) => Backend::Oidc,
            TokenParser::Kubernetes(_) => Backend::Kubernetes,
        }
    }
}

/// Dispatches every token to the parser selected at startup.
pub struct TokenParserRegistry {
    parser: TokenParser,
}

impl TokenParserRegistry {
    /// Registry around an already-built parser.
    pub fn new(parser: TokenParser) -> Self {
        Self { parser }
    }

    /// Wire the parser for `config.backend`.
    ///
    /// OIDC: shared HTTP client, discovery and JWKS caches. No network calls
    /// are made until the first token arrives.
    /// Kubernetes: in-cluster API client and operating namespace, both
    /// loaded here.
    ///
    /// # Errors
    ///
    /// - `AuthError::Configuration` - HTTP client could not be built
    /// - `AuthError::ClusterConfig` - not running inside a cluster, or the
    ///   namespace file is unavailable
    pub async fn from_config(config: &Config) -> Result<Self, AuthError> {
        let parser = match &config.backend {
            BackendConfig::Oidc(oidc) => {
                let http_client = build_http_client(config.http_timeout)?;
                let discovery = Arc::new(OidcDiscoveryService::new(
                    http_client.clone(),
                    config.discovery_cache_ttl,
                    config.retry,
                ));
                let jwks = Arc::new(JwksKeyResolver::new(
                    http_client,
                    config.jwks_cache_ttl,
                    config.retry,
                ));

                TokenParser::Oidc(
                    OidcTokenParser::new(oidc.issuer_url.clone(), oidc.client_id.clone(), discovery, jwks)
                        .with_audience(oidc.audience.clone())
                        .with_clock_skew(config.clock_skew),
                )
            }
            BackendConfig::Kubernetes(k8s) => TokenParser::Kubernetes(
                KubernetesTokenParser::in_cluster(k8s.namespace_file.clone(), config.http_timeout).await?,
            ),
        };

        tracing::info!(target: "authn.registry", backend = %parser.backend(), "Token parser registered");

        Ok(Self::new(parser))
    }

    /// Backend of the registered parser.
    pub fn backend(&self) -> Backend {
        self.parser.backend()
    }

    /// Resolve a bearer token to the caller's identity.
    ///
    /// # Errors
    ///
    /// Any request-time `AuthError` from the registered parser.
    #[instrument(skip_all, fields(backend = %self.backend()))]
    pub async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let result = match &self.parser {
            TokenParser::Oidc(parser) => parser.parse(token).await,
            TokenParser::Kubernetes(parser) => parser.parse(token).await,
        };

        if let Err(e) = &result {
            tracing::debug!(target: "authn.registry", error = %e, "Token rejected");
        }

        result
    }

    /// Resolve the token carried in an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidToken` for a malformed header, otherwise as
    /// [`TokenParserRegistry::resolve`].
    pub async fn resolve_authorization_header(&self, header: &str) -> Result<Identity, AuthError> {
        let token = extract_bearer_token(header)?;
        self.resolve(token).await
    }
}
