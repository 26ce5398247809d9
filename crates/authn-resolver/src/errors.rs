//! Resolver error types.
//!
//! Every request-time variant is terminal for the current request and is
//! surfaced to the serving layer as "unauthenticated". Messages carried in
//! the variants stay generic; the underlying cause is logged where the error
//! is produced.

use common::jwt::JwtValidationError;
use thiserror::Error;

/// Authentication resolver error type.
///
/// Maps to HTTP status codes via [`AuthError::status_code`]:
/// - Configuration, ClusterConfig: 500 Internal Server Error (startup wiring)
/// - everything else: 401 Unauthorized
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Discovery document could not be fetched or parsed.
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    /// JWKS could not be fetched or parsed.
    #[error("Signing key retrieval failed: {0}")]
    KeyRetrieval(String),

    /// The token references a key id absent from the key set, even after a refetch.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Signature, issuer, audience or structural validation failed.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token's `exp` is in the past.
    #[error("The access token has expired")]
    ExpiredToken,

    /// The token subject is not a `system:serviceaccount:<ns>:<name>` identifier.
    #[error("Invalid token subject: {0}")]
    InvalidSubject(String),

    /// RoleBinding listing failed or timed out.
    #[error("Role binding lookup failed: {0}")]
    RoleLookup(String),

    /// In-cluster configuration (service-account CA, API server, namespace) is unavailable.
    #[error("Cluster configuration unavailable: {0}")]
    ClusterConfig(String),

    /// A client manager could not obtain a token for outbound calls.
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Invalid resolver wiring detected at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Returns the HTTP status code the serving layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Configuration(_) | AuthError::ClusterConfig(_) => 500,
            _ => 401,
        }
    }

    /// True for `InvalidToken` and its `ExpiredToken` refinement.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, AuthError::InvalidToken(_) | AuthError::ExpiredToken)
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::Expired => AuthError::ExpiredToken,
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}
