//! Kubernetes backend: service-account subjects resolved through RBAC.

pub mod parser;
pub mod rbac;
pub mod subject;

pub use parser::{KubernetesTokenParser, DEFAULT_NAMESPACE_FILE};
pub use rbac::{BindingSubject, KubeRoleBindingLister, RoleBinding, RoleBindingLister};
pub use subject::ServiceAccountSubject;
