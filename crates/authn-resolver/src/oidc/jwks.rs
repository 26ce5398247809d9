//! JWKS client for fetching and caching identity-provider signing keys.
//!
//! The key set published at the discovery document's `jwks_uri` is fetched
//! lazily and cached per URI. A lookup for a key id that is not in the cached
//! set triggers exactly one refetch of the whole set (key rotation) before the
//! key is reported unknown.
//!
//! # Security
//!
//! - Keys marked `"use": "enc"` are never used for signature verification
//! - Each key carries the algorithms it may verify; the token header `alg`
//!   must be one of them
//! - Keys that cannot be decoded are skipped with a warning instead of failing
//!   the whole set

use crate::cache::{Refresh, RefreshCache, RetryPolicy};
use crate::errors::AuthError;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS response body.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// A verification key resolved from a JWK.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithms: Vec<Algorithm>,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Key id as published in the key set.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithms this key may verify.
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Key material for `jsonwebtoken::decode`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Convert a JWK into a signing key.
    ///
    /// # Errors
    ///
    /// Returns a short reason when the key is not usable for signature
    /// verification (encryption key, unsupported type or curve, missing or
    /// undecodable components, `alg` not matching the key type).
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let key_id = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or("missing kid")?
            .to_string();

        if jwk.key_use.as_deref() == Some("enc") {
            return Err("encryption key".to_string());
        }

        let (supported, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key missing n")?;
                let e = jwk.e.as_deref().ok_or("RSA key missing e")?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {e}"))?;
                (RSA_ALGORITHMS.to_vec(), key)
            }
            "EC" => {
                let algorithm = match jwk.crv.as_deref() {
                    Some("P-256") => Algorithm::ES256,
                    Some("P-384") => Algorithm::ES384,
                    other => return Err(format!("unsupported EC curve {other:?}")),
                };
                let x = jwk.x.as_deref().ok_or("EC key missing x")?;
                let y = jwk.y.as_deref().ok_or("EC key missing y")?;
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|e| format!("invalid EC components: {e}"))?;
                (vec![algorithm], key)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(format!("unsupported OKP curve {:?}", jwk.crv));
                }
                let x = jwk.x.as_deref().ok_or("OKP key missing x")?;
                let public_key = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| format!("invalid public key encoding: {e}"))?;
                (vec![Algorithm::EdDSA], DecodingKey::from_ed_der(&public_key))
            }
            other => return Err(format!("unsupported key type {other}")),
        };

        let algorithms = match jwk.alg.as_deref() {
            Some(alg) => {
                let algorithm =
                    Algorithm::from_str(alg).map_err(|_| format!("unsupported alg {alg}"))?;
                if !supported.contains(&algorithm) {
                    return Err(format!("alg {alg} does not match key type {}", jwk.kty));
                }
                vec![algorithm]
            }
            None => supported,
        };

        Ok(Self {
            key_id,
            algorithms,
            decoding_key,
        })
    }
}

/// Signing keys of one JWKS document, indexed by key id.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

impl KeySet {
    /// Build a key set, skipping keys that are not usable for verification.
    pub fn from_response(response: JwksResponse) -> Self {
        let mut keys = HashMap::new();
        for jwk in response.keys {
            match SigningKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(key.key_id.clone(), key);
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "authn.oidc.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        reason = %reason,
                        "Skipping unusable JWK"
                    );
                }
            }
        }
        Self { keys }
    }

    /// Look up a key by id.
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no usable key was published.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolves signing keys from JWKS endpoints with a per-URI cache.
pub struct JwksKeyResolver {
    http_client: reqwest::Client,
    cache: RefreshCache<KeySet>,
}

impl JwksKeyResolver {
    /// Create a key resolver.
    ///
    /// # Arguments
    ///
    /// * `http_client` - Client carrying the request timeout
    /// * `ttl` - Cache TTL; `None` refreshes only on unknown key ids
    /// * `retry` - Retry policy applied to each refresh
    pub fn new(http_client: reqwest::Client, ttl: Option<Duration>, retry: RetryPolicy) -> Self {
        Self {
            http_client,
            cache: RefreshCache::new("jwks", ttl, retry),
        }
    }

    /// Get the signing key `kid` published at `jwks_uri`.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeyRetrieval` - key set could not be fetched or parsed
    /// - `AuthError::UnknownKey` - `kid` absent even after one refetch
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_signing_key(&self, jwks_uri: &str, kid: &str) -> Result<SigningKey, AuthError> {
        let fetch = || fetch_key_set(&self.http_client, jwks_uri);

        let lookup = self.cache.get(jwks_uri, Refresh::IfStale, fetch).await?;
        if let Some(key) = lookup.value.get(kid) {
            tracing::debug!(target: "authn.oidc.jwks", kid = %kid, "JWKS cache hit");
            return Ok(key.clone());
        }

        // The set we hold may predate a key rotation.
        if !lookup.refreshed {
            tracing::debug!(target: "authn.oidc.jwks", kid = %kid, "Key not in cached JWKS, refetching");
            let lookup = self.cache.get(jwks_uri, Refresh::Force, fetch).await?;
            if let Some(key) = lookup.value.get(kid) {
                return Ok(key.clone());
            }
        }

        tracing::warn!(target: "authn.oidc.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(AuthError::UnknownKey(kid.to_string()))
    }
}

/// Fetch and parse one key set.
async fn fetch_key_set(http_client: &reqwest::Client, jwks_uri: &str) -> Result<KeySet, AuthError> {
    tracing::debug!(target: "authn.oidc.jwks", url = %jwks_uri, "Fetching JWKS");

    let response = http_client.get(jwks_uri).send().await.map_err(|e| {
        tracing::error!(target: "authn.oidc.jwks", error = %e, "Failed to fetch JWKS");
        AuthError::KeyRetrieval("Identity provider unavailable".to_string())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            target: "authn.oidc.jwks",
            status = %response.status(),
            "JWKS endpoint returned error"
        );
        return Err(AuthError::KeyRetrieval(format!(
            "Unexpected status {}",
            response.status()
        )));
    }

    let jwks: JwksResponse = response.json().await.map_err(|e| {
        tracing::error!(target: "authn.oidc.jwks", error = %e, "Failed to parse JWKS response");
        AuthError::KeyRetrieval("Malformed key set".to_string())
    })?;

    let key_set = KeySet::from_response(jwks);

    tracing::info!(
        target: "authn.oidc.jwks",
        key_count = key_set.len(),
        "JWKS cache refreshed"
    );

    Ok(key_set)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn jwk(json: &str) -> Jwk {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_jwk_deserialization() {
        let jwk = jwk(r#"{
            "kty": "RSA",
            "kid": "rsa-01",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUz",
            "e": "AQAB",
            "alg": "RS256",
            "use": "sig"
        }"#);

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("rsa-01"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_okp_key_accepts_eddsa_only() {
        let jwk = jwk(
            r#"{"kty":"OKP","kid":"ed-01","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#,
        );
        let key = SigningKey::from_jwk(&jwk).unwrap();

        assert_eq!(key.key_id(), "ed-01");
        assert_eq!(key.algorithms(), &[Algorithm::EdDSA]);
    }

    #[test]
    fn test_rsa_key_without_alg_accepts_rsa_family() {
        let jwk = jwk(r#"{
            "kty": "RSA",
            "kid": "rsa-02",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUz",
            "e": "AQAB"
        }"#);
        let key = SigningKey::from_jwk(&jwk).unwrap();

        assert!(key.algorithms().contains(&Algorithm::RS256));
        assert!(key.algorithms().contains(&Algorithm::PS512));
        assert!(!key.algorithms().contains(&Algorithm::HS256));
    }

    #[test]
    fn test_alg_must_match_key_type() {
        let jwk = jwk(
            r#"{"kty":"OKP","kid":"ed-02","crv":"Ed25519","alg":"RS256","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#,
        );
        assert!(SigningKey::from_jwk(&jwk).is_err());
    }

    #[test]
    fn test_unusable_keys_are_rejected() {
        let enc = jwk(
            r#"{"kty":"OKP","kid":"enc","use":"enc","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#,
        );
        let symmetric = jwk(r#"{"kty":"oct","kid":"hmac","k":"c2VjcmV0"}"#);
        let no_kid = jwk(
            r#"{"kty":"OKP","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#,
        );
        let missing_x = jwk(r#"{"kty":"OKP","kid":"ed","crv":"Ed25519"}"#);
        let bad_curve = jwk(r#"{"kty":"EC","kid":"ec","crv":"P-521","x":"AA","y":"AA"}"#);

        assert!(SigningKey::from_jwk(&enc).is_err());
        assert!(SigningKey::from_jwk(&symmetric).is_err());
        assert!(SigningKey::from_jwk(&no_kid).is_err());
        assert!(SigningKey::from_jwk(&missing_x).is_err());
        assert!(SigningKey::from_jwk(&bad_curve).is_err());
    }

    #[test]
    fn test_key_set_skips_unusable_keys() {
        let response: JwksResponse = serde_json::from_str(
            r#"{"keys": [
                {"kty":"OKP","kid":"good","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"},
                {"kty":"oct","kid":"hmac"},
                {"kty":"OKP","kid":"enc","use":"enc","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}
            ]}"#,
        )
        .unwrap();

        let key_set = KeySet::from_response(response);

        assert_eq!(key_set.len(), 1);
        assert!(key_set.get("good").is_some());
        assert!(key_set.get("hmac").is_none());
        assert!(key_set.get("enc").is_none());
    }

    #[test]
    fn test_signing_key_debug_omits_key_material() {
        let jwk = jwk(
            r#"{"kty":"OKP","kid":"ed-03","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#,
        );
        let debug = format!("{:?}", SigningKey::from_jwk(&jwk).unwrap());

        assert!(debug.contains("ed-03"));
        assert!(!debug.contains("11qYAYKx"));
    }
}
