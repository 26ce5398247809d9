//! OIDC access-token claims.
//!
//! Only the claims the resolver reads are modelled. Usernames are redacted in
//! Debug output to keep them out of logs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-client role grants under `resource_access`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    /// Client roles granted to the token holder.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims of a verified OIDC access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct OidcClaims {
    /// Username; becomes the identity subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Issuer URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Client roles keyed by client id.
    #[serde(default)]
    pub resource_access: HashMap<String, ResourceAccess>,
}

impl fmt::Debug for OidcClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClaims")
            .field("preferred_username", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("clients", &self.resource_access.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OidcClaims {
    /// Roles granted for `client_id`. A missing client entry yields no roles.
    pub fn client_roles(&self, client_id: &str) -> &[String] {
        self.resource_access
            .get(client_id)
            .map(|access| access.roles.as_slice())
            .unwrap_or_default()
    }
}
