//! JWT utilities shared by the token parsers.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat` validation
//! - Key ID extraction from JWT headers
//! - Unverified claim decoding (for callers that delegate trust elsewhere)
//! - `exp` and `iat` validation against an explicit timestamp
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Nothing here verifies a signature; callers that need authenticity must
//!   verify with a signing key before trusting claims
//! - Error messages are generic; details are logged at debug level

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// cryptographic work. Identity-provider access tokens with a handful of
/// roles are typically 1-2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT structural or time-claim validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token `exp` claim is in the past.
    #[error("The access token has expired")]
    Expired,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn split_compact(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url JWT segment into JSON.
fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = what, error = %e, "Failed to decode JWT base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = what, error = %e, "Failed to parse JWT JSON");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// Used to select the signing key from a JWKS when a provider publishes
/// several keys (e.g. during rotation). The `kid` must only be used for key
/// lookup; the token still has to be verified with the selected key.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON
/// - `MissingKid` - Header has no `kid`, a non-string `kid`, or an empty one
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let (header_part, _, _) = split_compact(token)?;
    let header: serde_json::Value = decode_segment(header_part, "header")?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Decode the JWT payload into `T` WITHOUT verifying the signature.
///
/// Only for trust models where authenticity is established elsewhere, such as
/// service-account tokens presented inside a cluster whose API server already
/// validated them at ingress.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or the payload does not
///   deserialize into `T`
pub fn decode_claims_unverified<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (_, payload_part, _) = split_compact(token)?;
    decode_segment(payload_part, "payload")
}

/// Validate the `iat` (issued-at) claim against `now` with clock skew tolerance.
///
/// Rejects tokens issued more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Validate the `exp` (expiry) claim against `now`.
///
/// A token is expired once `exp < now`. No skew is applied; the tolerance
/// only covers `iat`.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` for expired tokens.
pub fn validate_exp_at(exp: i64, now: i64) -> Result<(), JwtValidationError> {
    if exp < now {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn token_with(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_bounds() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // extract_kid Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_kid_valid_token() {
        let token = token_with(r#"{"alg":"RS256","typ":"JWT","kid":"rsa-key-01"}"#, "{}");
        assert_eq!(extract_kid(&token).unwrap(), "rsa-key-01");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let token = token_with(r#"{"alg":"RS256","typ":"JWT"}"#, "{}");
        assert_eq!(extract_kid(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_extract_kid_rejects_empty_and_non_string_kid() {
        let empty = token_with(r#"{"alg":"RS256","kid":""}"#, "{}");
        let numeric = token_with(r#"{"alg":"RS256","kid":12345}"#, "{}");
        let null = token_with(r#"{"alg":"RS256","kid":null}"#, "{}");

        assert_eq!(extract_kid(&empty), Err(JwtValidationError::MissingKid));
        assert_eq!(extract_kid(&numeric), Err(JwtValidationError::MissingKid));
        assert_eq!(extract_kid(&null), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_extract_kid_malformed_token() {
        assert_eq!(extract_kid(""), Err(JwtValidationError::MalformedToken));
        assert_eq!(extract_kid("single"), Err(JwtValidationError::MalformedToken));
        assert_eq!(extract_kid("only.two"), Err(JwtValidationError::MalformedToken));
        assert_eq!(
            extract_kid("not.a.valid.jwt"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            extract_kid("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_extract_kid_invalid_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not-json");
        let token = format!("{header_b64}.payload.signature");
        assert_eq!(extract_kid(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_extract_kid_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            extract_kid(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_extract_kid_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"EdDSA","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(remaining - payload_len)
        );

        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert_eq!(extract_kid(&token).unwrap(), "key");
    }

    // -------------------------------------------------------------------------
    // decode_claims_unverified Tests
    // -------------------------------------------------------------------------

    #[derive(Debug, Deserialize)]
    struct SubOnly {
        sub: String,
    }

    #[test]
    fn test_decode_claims_unverified_reads_payload() {
        let token = token_with(
            r#"{"alg":"RS256"}"#,
            r#"{"sub":"system:serviceaccount:ns1:sa1","aud":["api"]}"#,
        );

        let claims: SubOnly = decode_claims_unverified(&token).unwrap();
        assert_eq!(claims.sub, "system:serviceaccount:ns1:sa1");
    }

    #[test]
    fn test_decode_claims_unverified_missing_field_is_malformed() {
        let token = token_with(r#"{"alg":"RS256"}"#, r#"{"iss":"kubernetes"}"#);
        let result: Result<SubOnly, _> = decode_claims_unverified(&token);
        assert_eq!(result.unwrap_err(), JwtValidationError::MalformedToken);
    }

    #[test]
    fn test_decode_claims_unverified_bad_payload_base64() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
        let token = format!("{header_b64}.***.signature");
        let result: Result<SubOnly, _> = decode_claims_unverified(&token);
        assert_eq!(result.unwrap_err(), JwtValidationError::MalformedToken);
    }

    #[test]
    fn test_decode_claims_unverified_oversized() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result: Result<SubOnly, _> = decode_claims_unverified(&oversized);
        assert_eq!(result.unwrap_err(), JwtValidationError::TokenTooLarge);
    }

    // -------------------------------------------------------------------------
    // Time claim Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_boundaries() {
        let now = 1_700_000_000;
        let skew = Duration::from_secs(300);

        assert!(validate_iat_at(now, skew, now).is_ok());
        assert!(validate_iat_at(now - 3600, skew, now).is_ok());
        assert!(validate_iat_at(now + 300, skew, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, skew, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_validate_exp_boundaries() {
        let now = 1_700_000_000;

        assert!(validate_exp_at(now + 3600, now).is_ok());
        assert!(validate_exp_at(now, now).is_ok());
        assert_eq!(validate_exp_at(now - 1, now), Err(JwtValidationError::Expired));
        assert_eq!(validate_exp_at(now - 60, now), Err(JwtValidationError::Expired));
    }

    #[test]
    fn test_decode_ed25519_public_key_jwk() {
        let encoded = URL_SAFE_NO_PAD.encode([7u8; 32]);
        assert_eq!(decode_ed25519_public_key_jwk(&encoded).unwrap(), vec![7u8; 32]);
        assert!(decode_ed25519_public_key_jwk("!!!not-base64!!!").is_err());
    }
}
