//! RBAC RoleBinding lookups.
//!
//! [`RoleBindingLister`] is the seam between the Kubernetes token parser and
//! the cluster API. [`KubeRoleBindingLister`] talks to the API server;
//! [`mock::StaticRoleBindings`] serves a fixed list for tests and local runs.

use crate::errors::AuthError;
use crate::kubernetes::subject::ServiceAccountSubject;
use k8s_openapi::api::rbac::v1 as rbac_v1;
use kube::api::{Api, ListParams};
use std::time::Duration;
use tracing::instrument;

/// Subject kind for service accounts in a RoleBinding.
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// One entry of a RoleBinding's `subjects` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSubject {
    /// "ServiceAccount", "User" or "Group".
    pub kind: String,

    /// Subject name.
    pub name: String,

    /// Subject namespace; only meaningful for service accounts.
    pub namespace: Option<String>,
}

impl BindingSubject {
    /// A `ServiceAccount` subject.
    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SERVICE_ACCOUNT_KIND.to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

/// The parts of a RoleBinding the resolver reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    /// Binding name.
    pub name: String,

    /// Namespace the binding lives in.
    pub namespace: String,

    /// Who the binding applies to.
    pub subjects: Vec<BindingSubject>,

    /// Name of the referenced role; becomes an identity role.
    pub role_ref: String,
}

impl RoleBinding {
    /// Build a binding.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        subjects: Vec<BindingSubject>,
        role_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            subjects,
            role_ref: role_ref.into(),
        }
    }

    /// True if one of the subjects is the given service account.
    ///
    /// A ServiceAccount subject without a namespace refers to the binding's
    /// own namespace.
    pub fn grants(&self, account: &ServiceAccountSubject) -> bool {
        self.subjects.iter().any(|subject| {
            subject.kind == SERVICE_ACCOUNT_KIND
                && subject.name == account.name()
                && subject.namespace.as_deref().unwrap_or(&self.namespace) == account.namespace()
        })
    }
}

impl From<rbac_v1::RoleBinding> for RoleBinding {
    fn from(binding: rbac_v1::RoleBinding) -> Self {
        let subjects = binding
            .subjects
            .unwrap_or_default()
            .into_iter()
            .map(|subject| BindingSubject {
                kind: subject.kind,
                name: subject.name,
                namespace: subject.namespace,
            })
            .collect();

        Self {
            name: binding.metadata.name.unwrap_or_default(),
            namespace: binding.metadata.namespace.unwrap_or_default(),
            subjects,
            role_ref: binding.role_ref.name,
        }
    }
}

/// Lists RoleBindings of a namespace.
#[async_trait::async_trait]
pub trait RoleBindingLister: Send + Sync {
    /// List every RoleBinding in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RoleLookup` when the listing fails or times out.
    async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>, AuthError>;
}

/// RoleBinding lister backed by the Kubernetes API server.
pub struct KubeRoleBindingLister {
    client: kube::Client,
    timeout: Duration,
}

impl KubeRoleBindingLister {
    /// Wrap an existing client.
    pub fn new(client: kube::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client from the in-cluster service-account configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ClusterConfig` when not running inside a cluster
    /// (no service-account CA, token or API server environment).
    pub fn in_cluster(timeout: Duration) -> Result<Self, AuthError> {
        let mut config = kube::Config::incluster().map_err(|e| {
            tracing::error!(target: "authn.k8s.rbac", error = %e, "In-cluster configuration unavailable");
            AuthError::ClusterConfig("In-cluster configuration unavailable".to_string())
        })?;
        config.read_timeout = Some(timeout);
        config.connect_timeout = Some(timeout);

        let client = kube::Client::try_from(config).map_err(|e| {
            tracing::error!(target: "authn.k8s.rbac", error = %e, "Failed to build Kubernetes client");
            AuthError::ClusterConfig("Failed to build Kubernetes client".to_string())
        })?;

        tracing::info!(target: "authn.k8s.rbac", "Kubernetes client initialized from in-cluster configuration");

        Ok(Self::new(client, timeout))
    }
}

#[async_trait::async_trait]
impl RoleBindingLister for KubeRoleBindingLister {
    #[instrument(skip(self))]
    async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>, AuthError> {
        let api: Api<rbac_v1::RoleBinding> = Api::namespaced(self.client.clone(), namespace);

        let list = tokio::time::timeout(self.timeout, api.list(&ListParams::default()))
            .await
            .map_err(|_| {
                tracing::error!(target: "authn.k8s.rbac", namespace = %namespace, "RoleBinding list timed out");
                AuthError::RoleLookup("RoleBinding list timed out".to_string())
            })?
            .map_err(|e| {
                tracing::error!(target: "authn.k8s.rbac", namespace = %namespace, error = %e, "RoleBinding list failed");
                AuthError::RoleLookup("RoleBinding list failed".to_string())
            })?;

        let bindings: Vec<RoleBinding> = list.items.into_iter().map(RoleBinding::from).collect();

        tracing::debug!(
            target: "authn.k8s.rbac",
            namespace = %namespace,
            binding_count = bindings.len(),
            "Listed RoleBindings"
        );

        Ok(bindings)
    }
}

/// In-memory RoleBinding lister.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed binding list and counts calls.
    pub struct StaticRoleBindings {
        bindings: Vec<RoleBinding>,
        call_count: AtomicUsize,
        fail: bool,
    }

    impl StaticRoleBindings {
        /// Serve `bindings`, filtered by the requested namespace.
        pub fn new(bindings: Vec<RoleBinding>) -> Self {
            Self {
                bindings,
                call_count: AtomicUsize::new(0),
                fail: false,
            }
        }

        /// A lister whose every call fails with `RoleLookup`.
        pub fn failing() -> Self {
            Self {
                bindings: Vec::new(),
                call_count: AtomicUsize::new(0),
                fail: true,
            }
        }

        /// Number of list calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RoleBindingLister for StaticRoleBindings {
        async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>, AuthError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(AuthError::RoleLookup("Mock RBAC error".to_string()));
            }

            Ok(self
                .bindings
                .iter()
                .filter(|binding| binding.namespace == namespace)
                .cloned()
                .collect())
        }
    }
}
