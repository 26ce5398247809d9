//! Signature and standard-claim verification for OIDC access tokens.
//!
//! # Security
//!
//! - Only the algorithms the signing key allows are accepted
//! - Issuer is always checked; audience when one is configured
//! - `exp` and `iat` are checked against an injected clock; skew applies to `iat` only
//! - Generic error messages prevent information leakage

use crate::errors::AuthError;
use crate::oidc::claims::OidcClaims;
use crate::oidc::jwks::SigningKey;
use common::jwt::{validate_exp_at, validate_iat_at};
use jsonwebtoken::{decode, Validation};
use std::time::Duration;

/// What a token must satisfy beyond its signature.
#[derive(Debug, Clone, Copy)]
pub struct TokenExpectations<'a> {
    /// Expected `iss`. A trailing slash difference is tolerated.
    pub issuer: &'a str,

    /// Expected `aud`; `None` skips the audience check.
    pub audience: Option<&'a str>,

    /// Tolerance for a future `iat`.
    pub clock_skew: Duration,
}

/// Verify `token` with `key` and return its claims.
///
/// # Errors
///
/// - `AuthError::ExpiredToken` - signature valid but `exp` has passed
/// - `AuthError::InvalidToken` - any other signature or claim failure
pub fn verify_token(
    token: &str,
    key: &SigningKey,
    expectations: &TokenExpectations<'_>,
    now: i64,
) -> Result<OidcClaims, AuthError> {
    let Some(first_algorithm) = key.algorithms().first() else {
        return Err(AuthError::InvalidToken(
            "The access token is invalid or expired".to_string(),
        ));
    };

    let mut validation = Validation::new(*first_algorithm);
    validation.algorithms = key.algorithms().to_vec();
    // Time claims are checked below against the injected clock.
    validation.validate_exp = false;
    validation.validate_nbf = false;

    let issuer = expectations.issuer.trim_end_matches('/');
    validation.set_issuer(&[issuer.to_string(), format!("{issuer}/")]);

    match expectations.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<OidcClaims>(token, key.decoding_key(), &validation).map_err(|e| {
        tracing::debug!(target: "authn.oidc.parser", error = %e, kid = %key.key_id(), "Token verification failed");
        AuthError::InvalidToken("The access token is invalid or expired".to_string())
    })?;
    let claims = token_data.claims;

    validate_exp_at(claims.exp, now)?;
    if let Some(iat) = claims.iat {
        validate_iat_at(iat, expectations.clock_skew, now)?;
    }

    Ok(claims)
}
