//! Resolver configuration.
//!
//! Configuration is loaded from environment variables. Client secrets,
//! passwords and local tokens are redacted in Debug output.

use crate::cache::{RetryPolicy, MAX_BACKOFF};
use crate::client::kubernetes::DEFAULT_TOKEN_FILE;
use crate::http::DEFAULT_HTTP_TIMEOUT;
use crate::kubernetes::parser::DEFAULT_NAMESPACE_FILE;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default number of cache refresh attempts.
pub const DEFAULT_REFRESH_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first cache refresh retry, in milliseconds.
pub const DEFAULT_REFRESH_INITIAL_BACKOFF_MS: u64 = 200;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// `AUTH_BACKEND` names no known backend.
    #[error("Unsupported auth backend: {0}")]
    UnsupportedBackend(String),

    /// `JWT_CLOCK_SKEW_SECONDS` is not an integer or exceeds the maximum.
    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    /// A timeout or TTL is not a valid number of seconds.
    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    /// Refresh attempts or backoff out of range.
    #[error("Invalid retry configuration: {0}")]
    InvalidRetry(String),

    /// A flag is not a recognized boolean.
    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),
}

/// Which trust backend resolves inbound tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// OpenID Connect provider.
    Oidc,
    /// Kubernetes service accounts and RBAC.
    Kubernetes,
}

impl Backend {
    /// Lowercase name as accepted by `AUTH_BACKEND`.
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Oidc => "oidc",
            Backend::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oidc" => Ok(Backend::Oidc),
            "kubernetes" => Ok(Backend::Kubernetes),
            _ => Err(ConfigError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// OIDC provider settings.
#[derive(Clone)]
pub struct OidcConfig {
    /// Issuer base URL; discovery is served under it.
    pub issuer_url: String,

    /// Client id whose `resource_access` entry carries the roles, and the
    /// id presented at the token endpoint.
    pub client_id: String,

    /// Client secret for the token endpoint.
    pub client_secret: Option<SecretString>,

    /// Expected `aud` claim. `None` disables the audience check.
    pub audience: Option<String>,

    /// Resource owner username (password grant).
    pub username: Option<String>,

    /// Resource owner password (password grant).
    pub password: Option<SecretString>,

    /// Reuse acquired client tokens until near expiry.
    pub cache_client_tokens: bool,
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("audience", &self.audience)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("cache_client_tokens", &self.cache_client_tokens)
            .finish()
    }
}

/// Kubernetes settings.
#[derive(Clone)]
pub struct KubernetesConfig {
    /// File holding the operating namespace.
    pub namespace_file: PathBuf,

    /// Mounted service-account token used for outbound calls.
    pub token_file: PathBuf,

    /// Token returned instead of reading `token_file`.
    pub local_token: Option<SecretString>,
}

impl fmt::Debug for KubernetesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesConfig")
            .field("namespace_file", &self.namespace_file)
            .field("token_file", &self.token_file)
            .field("local_token", &self.local_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Backend selection with its settings.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// OIDC settings.
    Oidc(OidcConfig),
    /// Kubernetes settings.
    Kubernetes(KubernetesConfig),
}

impl BackendConfig {
    /// Backend these settings belong to.
    pub fn backend(&self) -> Backend {
        match self {
            BackendConfig::Oidc(_) => Backend::Oidc,
            BackendConfig::Kubernetes(_) => Backend::Kubernetes,
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected backend and its settings.
    pub backend: BackendConfig,

    /// Per-request timeout for every network call.
    pub http_timeout: Duration,

    /// JWKS cache TTL. `None` means entries never expire by age.
    pub jwks_cache_ttl: Option<Duration>,

    /// Discovery cache TTL. `None` means entries never expire by age.
    pub discovery_cache_ttl: Option<Duration>,

    /// Tolerance for a future `iat`. `exp` is checked without tolerance.
    pub clock_skew: Duration,

    /// Retry policy for cache refreshes.
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let backend: Backend = required(vars, "AUTH_BACKEND")?.parse()?;

        let backend = match backend {
            Backend::Oidc => BackendConfig::Oidc(oidc_from_vars(vars)?),
            Backend::Kubernetes => BackendConfig::Kubernetes(kubernetes_from_vars(vars)),
        };

        let http_timeout = match parse_seconds(vars, "HTTP_TIMEOUT_SECONDS")? {
            Some(Duration::ZERO) => {
                return Err(ConfigError::InvalidDuration(
                    "HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }
            Some(timeout) => timeout,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        // 0 disables time-based expiry
        let jwks_cache_ttl = parse_seconds(vars, "JWKS_CACHE_TTL_SECONDS")?.filter(|ttl| !ttl.is_zero());
        let discovery_cache_ttl =
            parse_seconds(vars, "DISCOVERY_CACHE_TTL_SECONDS")?.filter(|ttl| !ttl.is_zero());

        // Parse JWT clock skew tolerance with validation
        let clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        // Parse refresh retry policy with validation
        let max_attempts = if let Some(value_str) = vars.get("REFRESH_MAX_ATTEMPTS") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRetry(format!(
                    "REFRESH_MAX_ATTEMPTS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidRetry(
                    "REFRESH_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_REFRESH_MAX_ATTEMPTS
        };

        let initial_backoff_ms = if let Some(value_str) = vars.get("REFRESH_INITIAL_BACKOFF_MS") {
            value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidRetry(format!(
                    "REFRESH_INITIAL_BACKOFF_MS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_REFRESH_INITIAL_BACKOFF_MS
        };

        let retry = RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(initial_backoff_ms).min(MAX_BACKOFF),
            max_backoff: MAX_BACKOFF,
        };

        Ok(Config {
            backend,
            http_timeout,
            jwks_cache_ttl,
            discovery_cache_ttl,
            clock_skew,
            retry,
        })
    }
}

fn oidc_from_vars(vars: &HashMap<String, String>) -> Result<OidcConfig, ConfigError> {
    let issuer_url = required(vars, "OIDC_ISSUER_URL")?;
    let client_id = required(vars, "OIDC_CLIENT_ID")?;

    let cache_client_tokens = match optional(vars, "OIDC_CACHE_CLIENT_TOKENS") {
        Some(value) => parse_bool("OIDC_CACHE_CLIENT_TOKENS", &value)?,
        None => false,
    };

    Ok(OidcConfig {
        issuer_url,
        client_id,
        client_secret: optional(vars, "OIDC_CLIENT_SECRET").map(SecretString::from),
        audience: optional(vars, "OIDC_AUDIENCE"),
        username: optional(vars, "OIDC_USERNAME"),
        password: optional(vars, "OIDC_PASSWORD").map(SecretString::from),
        cache_client_tokens,
    })
}

fn kubernetes_from_vars(vars: &HashMap<String, String>) -> KubernetesConfig {
    KubernetesConfig {
        namespace_file: optional(vars, "K8S_NAMESPACE_FILE")
            .unwrap_or_else(|| DEFAULT_NAMESPACE_FILE.to_string())
            .into(),
        token_file: optional(vars, "K8S_TOKEN_FILE")
            .unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string())
            .into(),
        local_token: optional(vars, "LOCAL_K8S_TOKEN").map(SecretString::from),
    }
}

/// Value of `name`, treating blank values as unset.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_seconds(vars: &HashMap<String, String>, name: &str) -> Result<Option<Duration>, ConfigError> {
    optional(vars, name)
        .map(|value| {
            value.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "{} must be a valid non-negative integer, got '{}': {}",
                    name, value, e
                ))
            })
        })
        .transpose()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn oidc_vars() -> HashMap<String, String> {
        HashMap::from([
            ("AUTH_BACKEND".to_string(), "oidc".to_string()),
            (
                "OIDC_ISSUER_URL".to_string(),
                "https://idp.example.com/realms/feast".to_string(),
            ),
            ("OIDC_CLIENT_ID".to_string(), "feast".to_string()),
        ])
    }

    fn oidc(config: &Config) -> &OidcConfig {
        match &config.backend {
            BackendConfig::Oidc(oidc) => Some(oidc),
            BackendConfig::Kubernetes(_) => None,
        }
        .expect("expected oidc backend")
    }

    fn kubernetes(config: Config) -> KubernetesConfig {
        match config.backend {
            BackendConfig::Kubernetes(k8s) => Some(k8s),
            BackendConfig::Oidc(_) => None,
        }
        .expect("expected kubernetes backend")
    }

    #[test]
    fn test_from_vars_oidc_with_defaults() {
        let config = Config::from_vars(&oidc_vars()).expect("Config should load successfully");

        let oidc = oidc(&config);
        assert_eq!(oidc.issuer_url, "https://idp.example.com/realms/feast");
        assert_eq!(oidc.client_id, "feast");
        assert!(oidc.client_secret.is_none());
        assert!(oidc.audience.is_none());
        assert!(oidc.username.is_none());
        assert!(!oidc.cache_client_tokens);

        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.jwks_cache_ttl, None);
        assert_eq!(config.discovery_cache_ttl, None);
        assert_eq!(config.clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_from_vars_oidc_with_custom_values() {
        let mut vars = oidc_vars();
        vars.insert("OIDC_CLIENT_SECRET".to_string(), "s3cret".to_string());
        vars.insert("OIDC_AUDIENCE".to_string(), "account".to_string());
        vars.insert("OIDC_USERNAME".to_string(), "alice".to_string());
        vars.insert("OIDC_PASSWORD".to_string(), "hunter2".to_string());
        vars.insert("OIDC_CACHE_CLIENT_TOKENS".to_string(), "true".to_string());
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "600".to_string());
        vars.insert("DISCOVERY_CACHE_TTL_SECONDS".to_string(), "3600".to_string());
        vars.insert("HTTP_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "60".to_string());
        vars.insert("REFRESH_MAX_ATTEMPTS".to_string(), "5".to_string());
        vars.insert("REFRESH_INITIAL_BACKOFF_MS".to_string(), "50".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let oidc = oidc(&config);
        assert_eq!(oidc.client_secret.as_ref().unwrap().expose_secret(), "s3cret");
        assert_eq!(oidc.audience.as_deref(), Some("account"));
        assert_eq!(oidc.username.as_deref(), Some("alice"));
        assert_eq!(oidc.password.as_ref().unwrap().expose_secret(), "hunter2");
        assert!(oidc.cache_client_tokens);

        assert_eq!(config.jwks_cache_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.discovery_cache_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.clock_skew, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
    }

    #[test]
    fn test_from_vars_kubernetes_with_defaults() {
        let vars = HashMap::from([("AUTH_BACKEND".to_string(), "kubernetes".to_string())]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let k8s = kubernetes(config);
        assert_eq!(k8s.namespace_file, PathBuf::from(DEFAULT_NAMESPACE_FILE));
        assert_eq!(k8s.token_file, PathBuf::from(DEFAULT_TOKEN_FILE));
        assert!(k8s.local_token.is_none());
    }

    #[test]
    fn test_from_vars_kubernetes_with_custom_paths() {
        let vars = HashMap::from([
            ("AUTH_BACKEND".to_string(), "Kubernetes".to_string()),
            ("K8S_NAMESPACE_FILE".to_string(), "/tmp/ns".to_string()),
            ("K8S_TOKEN_FILE".to_string(), "/tmp/token".to_string()),
            ("LOCAL_K8S_TOKEN".to_string(), "local".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.backend.backend(), Backend::Kubernetes);
        let k8s = kubernetes(config);
        assert_eq!(k8s.namespace_file, PathBuf::from("/tmp/ns"));
        assert_eq!(k8s.token_file, PathBuf::from("/tmp/token"));
        assert_eq!(k8s.local_token.unwrap().expose_secret(), "local");
    }

    #[test]
    fn test_missing_backend() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "AUTH_BACKEND"));
    }

    #[test]
    fn test_unsupported_backend() {
        let vars = HashMap::from([("AUTH_BACKEND".to_string(), "ldap".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::UnsupportedBackend(v)) if v == "ldap"));
    }

    #[test]
    fn test_oidc_requires_issuer_and_client_id() {
        let mut vars = oidc_vars();
        vars.remove("OIDC_ISSUER_URL");
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "OIDC_ISSUER_URL"));

        let mut vars = oidc_vars();
        vars.insert("OIDC_CLIENT_ID".to_string(), "  ".to_string());
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "OIDC_CLIENT_ID"));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let mut vars = oidc_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.jwks_cache_ttl, None);
    }

    #[test]
    fn test_invalid_ttl() {
        let mut vars = oidc_vars();
        vars.insert("DISCOVERY_CACHE_TTL_SECONDS".to_string(), "-5".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let mut vars = oidc_vars();
        vars.insert("HTTP_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn test_clock_skew_rejects_too_large() {
        let mut vars = oidc_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must not exceed")));
    }

    #[test]
    fn test_clock_skew_accepts_max() {
        let mut vars = oidc_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "600".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.clock_skew, MAX_CLOCK_SKEW);
    }

    #[test]
    fn test_refresh_attempts_rejects_zero() {
        let mut vars = oidc_vars();
        vars.insert("REFRESH_MAX_ATTEMPTS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidRetry(msg)) if msg.contains("at least 1")));
    }

    #[test]
    fn test_initial_backoff_capped() {
        let mut vars = oidc_vars();
        vars.insert("REFRESH_INITIAL_BACKOFF_MS".to_string(), "60000".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.retry.initial_backoff, MAX_BACKOFF);
    }

    #[test]
    fn test_invalid_bool() {
        let mut vars = oidc_vars();
        vars.insert("OIDC_CACHE_CLIENT_TOKENS".to_string(), "maybe".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidBool(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = oidc_vars();
        vars.insert("OIDC_CLIENT_SECRET".to_string(), "s3cret".to_string());
        vars.insert("OIDC_PASSWORD".to_string(), "hunter2".to_string());

        let config = Config::from_vars(&vars).unwrap();
        let debug_output = format!("{:?}", config);

        assert!(!debug_output.contains("s3cret"));
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("https://idp.example.com/realms/feast"));
    }

    #[test]
    fn test_backend_display_round_trips() {
        for backend in [Backend::Oidc, Backend::Kubernetes] {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
    }
}
