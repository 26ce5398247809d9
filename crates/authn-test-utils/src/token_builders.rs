//! Builder patterns for test token construction
//!
//! Provides fluent APIs for OIDC access-token claims and unsigned
//! service-account tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for OIDC access-token claims
///
/// # Example
/// ```rust,ignore
/// let claims = OidcClaimsBuilder::new(&provider.issuer())
///     .for_user("my-name")
///     .with_client_roles("feast", &["reader", "writer"])
///     .expires_in(3600)
///     .build();
/// ```
pub struct OidcClaimsBuilder {
    iss: String,
    preferred_username: Option<String>,
    aud: Option<String>,
    exp: i64,
    iat: i64,
    resource_access: Map<String, Value>,
}

impl OidcClaimsBuilder {
    /// Create a builder with defaults: user `test-user`, no roles, valid for
    /// one hour.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            preferred_username: Some("test-user".to_string()),
            aud: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            resource_access: Map::new(),
        }
    }

    /// Set `preferred_username`
    pub fn for_user(mut self, username: &str) -> Self {
        self.preferred_username = Some(username.to_string());
        self
    }

    /// Drop `preferred_username`
    pub fn without_username(mut self) -> Self {
        self.preferred_username = None;
        self
    }

    /// Grant `roles` under `resource_access[client_id]`
    pub fn with_client_roles(mut self, client_id: &str, roles: &[&str]) -> Self {
        self.resource_access
            .insert(client_id.to_string(), json!({ "roles": roles }));
        self
    }

    /// Set `aud`
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(audience.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "iss": self.iss,
            "exp": self.exp,
            "iat": self.iat,
            "typ": "Bearer",
            "resource_access": self.resource_access,
        });
        if let Some(username) = self.preferred_username {
            claims["preferred_username"] = json!(username);
        }
        if let Some(aud) = self.aud {
            claims["aud"] = json!(aud);
        }
        claims
    }
}

/// Compact JWT with the given claims and a placeholder signature.
///
/// For parsers that do not verify signatures.
pub fn unsigned_token(claims: &Value) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT", "kid": "cluster-key"});
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("not-a-real-signature")
    )
}

/// Projected service-account token for `sub`.
pub fn service_account_token(sub: &str) -> String {
    let now = Utc::now().timestamp();
    unsigned_token(&json!({
        "iss": "https://kubernetes.default.svc.cluster.local",
        "aud": ["https://kubernetes.default.svc.cluster.local"],
        "sub": sub,
        "iat": now,
        "exp": now + 3600,
    }))
}
