//! Service-account token manager.
//!
//! Returns the projected token Kubernetes mounts into the pod. The file is
//! read on every call since the kubelet rotates it in place.

use crate::errors::AuthError;
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;

/// Mounted projected service-account token.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Supplies this workload's service-account token for outbound calls.
pub struct ServiceAccountTokenManager {
    token_file: PathBuf,
    token_override: Option<SecretString>,
}

impl fmt::Debug for ServiceAccountTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountTokenManager")
            .field("token_file", &self.token_file)
            .field("token_override", &self.token_override.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ServiceAccountTokenManager {
    /// Read tokens from `token_file`.
    pub fn new(token_file: impl Into<PathBuf>) -> Self {
        Self {
            token_file: token_file.into(),
            token_override: None,
        }
    }

    /// Return `token` instead of reading the file (for running outside a
    /// cluster). An empty override is ignored.
    #[must_use]
    pub fn with_token_override(mut self, token: Option<SecretString>) -> Self {
        self.token_override = token.filter(|token| !token.expose_secret().trim().is_empty());
        self
    }

    /// Get the current service-account token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenAcquisition` if the token file is missing,
    /// unreadable or empty.
    pub async fn get_token(&self) -> Result<SecretString, AuthError> {
        if let Some(token) = &self.token_override {
            tracing::trace!(target: "authn.client.k8s", "Using token override");
            return Ok(token.clone());
        }

        let contents = tokio::fs::read_to_string(&self.token_file).await.map_err(|e| {
            tracing::warn!(
                target: "authn.client.k8s",
                path = %self.token_file.display(),
                error = %e,
                "Failed to read service account token"
            );
            AuthError::TokenAcquisition("Service account token unavailable".to_string())
        })?;

        let token = contents.trim();
        if token.is_empty() {
            tracing::warn!(
                target: "authn.client.k8s",
                path = %self.token_file.display(),
                "Service account token file is empty"
            );
            return Err(AuthError::TokenAcquisition(
                "Service account token is empty".to_string(),
            ));
        }

        Ok(SecretString::from(token.to_string()))
    }
}
