//! Resolved caller identity.

use serde::Serialize;
use std::collections::BTreeSet;

/// Who the caller is and which roles they hold.
///
/// Produced fresh for every resolved token and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    subject: String,
    roles: BTreeSet<String>,
}

impl Identity {
    /// Build an identity from a subject and any collection of role names.
    pub fn new<I, S>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// The caller's subject (username or service-account identifier).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The caller's role set. May be empty.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Check whether the caller holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
