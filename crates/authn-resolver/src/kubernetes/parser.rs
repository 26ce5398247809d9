//! Kubernetes service-account token parser.
//!
//! Roles come from the RoleBindings in the resolver's own namespace whose
//! subject list names the caller's service account.
//!
//! # Trust model
//!
//! The token signature is NOT verified here. Authenticity is delegated to the
//! cluster: only callers already inside the mesh can present a projected
//! service-account token. The `sub` claim is decoded as-is.

use crate::errors::AuthError;
use crate::identity::Identity;
use crate::kubernetes::rbac::{KubeRoleBindingLister, RoleBindingLister};
use crate::kubernetes::subject::ServiceAccountSubject;
use common::jwt::decode_claims_unverified;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::instrument;

/// Mounted file holding the pod's namespace.
pub const DEFAULT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

#[derive(Deserialize)]
struct ServiceAccountClaims {
    sub: String,
}

/// Resolves service-account tokens to identities through RBAC.
pub struct KubernetesTokenParser {
    lister: Arc<dyn RoleBindingLister>,
    namespace_file: PathBuf,
    namespace: OnceCell<String>,
}

impl KubernetesTokenParser {
    /// Create a parser that reads its namespace lazily from `namespace_file`.
    pub fn new(lister: Arc<dyn RoleBindingLister>, namespace_file: impl Into<PathBuf>) -> Self {
        Self {
            lister,
            namespace_file: namespace_file.into(),
            namespace: OnceCell::new(),
        }
    }

    /// Create a parser with a known operating namespace.
    pub fn with_namespace(lister: Arc<dyn RoleBindingLister>, namespace: impl Into<String>) -> Self {
        Self {
            lister,
            namespace_file: PathBuf::new(),
            namespace: OnceCell::new_with(Some(namespace.into())),
        }
    }

    /// Create a parser for a pod: API client from the in-cluster
    /// configuration, namespace read eagerly.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ClusterConfig` if the cluster configuration or the
    /// namespace file is unavailable.
    pub async fn in_cluster(namespace_file: impl Into<PathBuf>, timeout: Duration) -> Result<Self, AuthError> {
        let lister = KubeRoleBindingLister::in_cluster(timeout)?;
        let parser = Self::new(Arc::new(lister), namespace_file);
        let namespace = parser.namespace().await?;

        tracing::info!(target: "authn.k8s.parser", namespace = %namespace, "Kubernetes token parser ready");

        Ok(parser)
    }

    /// The namespace whose RoleBindings are consulted. Read once, then cached.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ClusterConfig` if the namespace file is missing or
    /// empty. A failed read is retried on the next call.
    pub async fn namespace(&self) -> Result<&str, AuthError> {
        self.namespace
            .get_or_try_init(|| read_namespace_file(&self.namespace_file))
            .await
            .map(String::as_str)
    }

    /// Resolve a service-account token.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` - not a decodable JWT or no `sub` claim
    /// - `AuthError::InvalidSubject` - `sub` is not a service-account identifier
    /// - `AuthError::ClusterConfig` - operating namespace unknown
    /// - `AuthError::RoleLookup` - RoleBinding listing failed
    #[instrument(skip_all)]
    pub async fn parse(&self, token: &str) -> Result<Identity, AuthError> {
        let claims: ServiceAccountClaims = decode_claims_unverified(token).map_err(|e| {
            tracing::debug!(target: "authn.k8s.parser", error = ?e, "Token claims could not be decoded");
            AuthError::from(e)
        })?;
        let account: ServiceAccountSubject = claims.sub.parse()?;

        let namespace = self.namespace().await?;
        let bindings = self.lister.list_role_bindings(namespace).await?;

        let roles: BTreeSet<String> = bindings
            .into_iter()
            .filter(|binding| binding.grants(&account))
            .map(|binding| binding.role_ref)
            .collect();

        tracing::debug!(
            target: "authn.k8s.parser",
            namespace = %namespace,
            role_count = roles.len(),
            "Service account resolved"
        );

        Ok(Identity::new(account.to_string(), roles))
    }
}

async fn read_namespace_file(path: &Path) -> Result<String, AuthError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!(
            target: "authn.k8s.parser",
            path = %path.display(),
            error = %e,
            "Failed to read namespace file"
        );
        AuthError::ClusterConfig("Namespace file unavailable".to_string())
    })?;

    let namespace = contents.trim();
    if namespace.is_empty() {
        tracing::error!(target: "authn.k8s.parser", path = %path.display(), "Namespace file is empty");
        return Err(AuthError::ClusterConfig("Namespace file is empty".to_string()));
    }

    Ok(namespace.to_string())
}
