//! Service-account subject parsing.

use crate::errors::AuthError;
use std::fmt;
use std::str::FromStr;

const SUBJECT_PREFIX: &str = "system";
const SUBJECT_KIND: &str = "serviceaccount";

/// A `system:serviceaccount:<namespace>:<name>` subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAccountSubject {
    namespace: String,
    name: String,
}

impl ServiceAccountSubject {
    /// Build a subject from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace of the service account.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the service account.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ServiceAccountSubject {
    type Err = AuthError;

    /// Parse `system:serviceaccount:<namespace>:<name>`.
    ///
    /// Exactly four non-empty colon-separated segments are required.
    fn from_str(subject: &str) -> Result<Self, Self::Err> {
        let mut parts = subject.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(SUBJECT_PREFIX), Some(SUBJECT_KIND), Some(namespace), Some(name), None)
                if !namespace.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => {
                tracing::debug!(target: "authn.k8s.parser", "Subject is not a service account identifier");
                Err(AuthError::InvalidSubject(
                    "Expected system:serviceaccount:<namespace>:<name>".to_string(),
                ))
            }
        }
    }
}

impl fmt::Display for ServiceAccountSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SUBJECT_PREFIX}:{SUBJECT_KIND}:{}:{}",
            self.namespace, self.name
        )
    }
}
