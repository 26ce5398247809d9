//! Client-side token managers.
//!
//! The counterpart of the token parsers: obtain the token this workload
//! attaches to its own outbound calls under the configured backend.

pub mod kubernetes;
pub mod oidc;

pub use kubernetes::ServiceAccountTokenManager;
pub use oidc::{Grant, OidcClientCredentialsManager};

use crate::config::{BackendConfig, Config};
use crate::errors::AuthError;
use crate::http::build_http_client;
use crate::oidc::discovery::OidcDiscoveryService;
use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Token manager for the configured backend.
#[derive(Debug)]
pub enum AuthClientManager {
    Oidc(OidcClientCredentialsManager),
    Kubernetes(ServiceAccountTokenManager),
}

impl AuthClientManager {
    /// Build the manager matching `config.backend`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        match &config.backend {
            BackendConfig::Oidc(oidc) => {
                let http_client = build_http_client(config.http_timeout)?;
                let discovery = Arc::new(OidcDiscoveryService::new(
                    http_client.clone(),
                    config.discovery_cache_ttl,
                    config.retry,
                ));

                let grant = match (&oidc.username, &oidc.password) {
                    (Some(username), Some(password)) => Grant::Password {
                        username: username.clone(),
                        password: password.clone(),
                    },
                    _ => Grant::ClientCredentials,
                };

                let manager = OidcClientCredentialsManager::new(
                    oidc.issuer_url.clone(),
                    oidc.client_id.clone(),
                    oidc.client_secret.clone(),
                    http_client,
                    discovery,
                )
                .with_grant(grant)
                .with_token_caching(oidc.cache_client_tokens);

                Ok(AuthClientManager::Oidc(manager))
            }
            BackendConfig::Kubernetes(k8s) => Ok(AuthClientManager::Kubernetes(
                ServiceAccountTokenManager::new(k8s.token_file.clone())
                    .with_token_override(k8s.local_token.clone()),
            )),
        }
    }

    /// Get a token for an outbound call.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenAcquisition` if no token can be obtained.
    pub async fn get_token(&self) -> Result<SecretString, AuthError> {
        match self {
            AuthClientManager::Oidc(manager) => manager.get_token().await,
            AuthClientManager::Kubernetes(manager) => manager.get_token().await,
        }
    }

    /// `Authorization` header value (`Bearer <token>`) for an outbound call.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenAcquisition` if no token can be obtained.
    pub async fn authorization_header(&self) -> Result<SecretString, AuthError> {
        let token = self.get_token().await?;
        Ok(SecretString::from(format!("Bearer {}", token.expose_secret())))
    }
}
