//! OIDC backend: discovery, signing keys, token verification.

pub mod claims;
pub mod discovery;
pub mod jwks;
pub mod parser;
pub mod verifier;

pub use claims::{OidcClaims, ResourceAccess};
pub use discovery::{DiscoveryDocument, OidcDiscoveryService};
pub use jwks::{JwksKeyResolver, SigningKey};
pub use parser::OidcTokenParser;
pub use verifier::{verify_token, TokenExpectations};
