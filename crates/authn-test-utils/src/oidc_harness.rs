//! Mock OIDC identity provider for tests
//!
//! Wraps a wiremock server laid out like a Keycloak realm:
//! discovery document, JWKS and token endpoint under `/realms/test`.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use crate::token_builders::OidcClaimsBuilder;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm path of the mock provider.
pub const REALM_PATH: &str = "/realms/test";

const DISCOVERY_SUFFIX: &str = "/.well-known/openid-configuration";
const JWKS_SUFFIX: &str = "/protocol/openid-connect/certs";
const TOKEN_SUFFIX: &str = "/protocol/openid-connect/token";
const AUTH_SUFFIX: &str = "/protocol/openid-connect/auth";

/// Mock identity provider
///
/// Nothing is mounted on start; each test mounts the endpoints it needs,
/// optionally with an expected call count verified when the provider drops.
///
/// # Example
/// ```rust,ignore
/// let provider = MockOidcProvider::start().await;
/// provider.mount_discovery(Some(1)).await;
/// provider.mount_jwks(&[provider.keypair()], None).await;
///
/// let token = provider.sign(&provider.claims().for_user("my-name").build());
/// ```
pub struct MockOidcProvider {
    server: MockServer,
    keypair: TestKeypair,
}

impl MockOidcProvider {
    /// Start a provider signing with the seed-1 test key (`kid = "test-key-1"`).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            keypair: TestKeypair::new(1, "test-key-1"),
        }
    }

    /// The underlying mock server.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Default signing key.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Issuer URL (`{server}/realms/test`).
    pub fn issuer(&self) -> String {
        format!("{}{REALM_PATH}", self.server.uri())
    }

    /// JWKS endpoint URL advertised by discovery.
    pub fn jwks_uri(&self) -> String {
        format!("{}{JWKS_SUFFIX}", self.issuer())
    }

    /// Token endpoint URL advertised by discovery.
    pub fn token_endpoint(&self) -> String {
        format!("{}{TOKEN_SUFFIX}", self.issuer())
    }

    /// Discovery document body.
    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "authorization_endpoint": format!("{}{AUTH_SUFFIX}", self.issuer()),
            "token_endpoint": self.token_endpoint(),
            "jwks_uri": self.jwks_uri(),
            "grant_types_supported": ["authorization_code", "client_credentials", "password"],
        })
    }

    /// Claims builder preset with this provider's issuer.
    pub fn claims(&self) -> OidcClaimsBuilder {
        OidcClaimsBuilder::new(&self.issuer())
    }

    /// Sign `claims` with the default key.
    pub fn sign(&self, claims: &Value) -> String {
        self.keypair.sign(claims)
    }

    /// Serve the discovery document.
    pub async fn mount_discovery(&self, expected_calls: Option<u64>) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{REALM_PATH}{DISCOVERY_SUFFIX}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(self.discovery_document()),
                ),
            expected_calls,
        )
        .await;
    }

    /// Answer discovery with `status` and an empty body.
    pub async fn mount_discovery_failure(&self, status: u16, expected_calls: Option<u64>) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{REALM_PATH}{DISCOVERY_SUFFIX}")))
                .respond_with(ResponseTemplate::new(status)),
            expected_calls,
        )
        .await;
    }

    /// Serve a JWKS publishing `keypairs`.
    pub async fn mount_jwks(&self, keypairs: &[&TestKeypair], expected_calls: Option<u64>) {
        self.mount_jwks_document(jwks_json(keypairs), expected_calls).await;
    }

    /// Serve `jwks` verbatim at the JWKS endpoint.
    pub async fn mount_jwks_document(&self, jwks: Value, expected_calls: Option<u64>) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{REALM_PATH}{JWKS_SUFFIX}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(jwks)),
            expected_calls,
        )
        .await;
    }

    /// Answer JWKS requests with `status`.
    pub async fn mount_jwks_failure(&self, status: u16) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{REALM_PATH}{JWKS_SUFFIX}")))
                .respond_with(ResponseTemplate::new(status)),
            None,
        )
        .await;
    }

    /// Issue `access_token` for requests whose form body contains
    /// `grant_type=<grant_type>`.
    pub async fn mount_token_endpoint(
        &self,
        grant_type: &str,
        access_token: &str,
        expires_in: Option<u64>,
        expected_calls: Option<u64>,
    ) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
        });
        if let Some(expires_in) = expires_in {
            body["expires_in"] = json!(expires_in);
        }

        self.mount(
            Mock::given(method("POST"))
                .and(path(format!("{REALM_PATH}{TOKEN_SUFFIX}")))
                .and(body_string_contains(format!("grant_type={grant_type}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(body)),
            expected_calls,
        )
        .await;
    }

    /// Answer token requests with `status` and an OAuth error body.
    pub async fn mount_token_failure(&self, status: u16) {
        self.mount(
            Mock::given(method("POST"))
                .and(path(format!("{REALM_PATH}{TOKEN_SUFFIX}")))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": "unauthorized_client",
                    "error_description": "Invalid client credentials",
                }))),
            None,
        )
        .await;
    }

    async fn mount(&self, mock: Mock, expected_calls: Option<u64>) {
        let mock = match expected_calls {
            Some(calls) => mock.expect(calls),
            None => mock,
        };
        mock.mount(&self.server).await;
    }
}
