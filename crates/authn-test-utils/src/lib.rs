//! # Authn Test Utilities
//!
//! Shared test utilities for the authentication resolver.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 and RSA keys, JWK output, signing)
//! - Token builders (OIDC claims, unsigned service-account tokens)
//! - A mock OIDC identity provider (discovery, JWKS, token endpoint)
//! - Temporary mounted-file fixtures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authn_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let provider = MockOidcProvider::start().await;
//!     provider.mount_discovery(None).await;
//!     provider.mount_jwks(&[provider.keypair()], None).await;
//!
//!     let token = provider.sign(
//!         &provider
//!             .claims()
//!             .for_user("my-name")
//!             .with_client_roles("feast", &["reader"])
//!             .build(),
//!     );
//! }
//! ```

pub mod crypto_fixtures;
pub mod mounted_files;
pub mod oidc_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mounted_files::*;
pub use oidc_harness::*;
pub use token_builders::*;
