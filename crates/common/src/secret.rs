//! Redacting wrappers for credentials.
//!
//! Bearer tokens, OAuth client secrets and resource-owner passwords are held
//! as [`SecretString`]. Its `Debug` output is redacted and the value is
//! zeroized on drop, so structs carrying credentials can derive `Debug` and be
//! passed to `tracing` fields safely. Reading the value requires an explicit
//! [`ExposeSecret::expose_secret`] call at the point of use (building a form
//! body or an `Authorization` header).

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let token = SecretString::from("eyJhbGciOiJSUzI1NiJ9.payload.sig");
        let debug_str = format!("{token:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("eyJhbGciOiJSUzI1NiJ9"));
    }

    #[test]
    fn test_client_secret_in_struct_is_redacted() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct ClientCredentials {
            client_id: String,
            client_secret: SecretString,
        }

        let creds = ClientCredentials {
            client_id: "feature-server".to_string(),
            client_secret: SecretString::from("s3cr3t-value"),
        };

        let debug_str = format!("{creds:?}");
        assert!(debug_str.contains("feature-server"));
        assert!(!debug_str.contains("s3cr3t-value"));
    }

    #[test]
    fn test_expose_secret_returns_value() {
        let secret = SecretString::from("client-secret");
        assert_eq!(secret.expose_secret(), "client-secret");
    }
}
