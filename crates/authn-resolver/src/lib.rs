//! Authentication Resolver Library
//!
//! Resolves bearer tokens presented by callers into an [`Identity`]: who the
//! caller is and which roles they hold. Two trust backends sit behind one
//! contract:
//!
//! - **OIDC** - tokens signed by an identity provider, verified against its
//!   JWKS; roles from `resource_access[client_id].roles`
//! - **Kubernetes** - service-account tokens; roles from the RoleBindings in
//!   the resolver's namespace that name the caller
//!
//! The client-side counterpart obtains the token this workload attaches to
//! its own outbound calls.
//!
//! # Architecture
//!
//! ```text
//! registry.rs -> oidc/parser.rs -> oidc/{discovery,jwks,verifier}.rs -> cache.rs
//!             -> kubernetes/parser.rs -> kubernetes/{subject,rbac}.rs
//! client/mod.rs -> client/{oidc,kubernetes}.rs
//! ```
//!
//! # Modules
//!
//! - `cache` - Single-flight refresh cache with bounded retry
//! - `client` - Outbound token managers
//! - `config` - Configuration from environment
//! - `errors` - Error taxonomy with HTTP status code mapping
//! - `http` - Shared HTTP client construction
//! - `identity` - Resolved caller identity
//! - `kubernetes` - Service-account token parser and RBAC lookup
//! - `oidc` - Discovery, JWKS, verification and the OIDC token parser
//! - `registry` - Configured parser dispatch

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod identity;
pub mod kubernetes;
pub mod oidc;
pub mod registry;

pub use client::AuthClientManager;
pub use config::{Backend, Config, ConfigError};
pub use errors::AuthError;
pub use identity::Identity;
pub use registry::{extract_bearer_token, TokenParser, TokenParserRegistry};
