//! # Platform Authentication
//!
//! This crate connects the identity provider to the Relay access-control
//! engine. It owns the access-token claim shape and the verification port,
//! and hands verified role claims to `platform-rbac` for the actual decision.
//!
//! ## Overview
//!
//! - **Claims**: `AccessClaims`, the verified token payload with global and
//!   per-application role ids
//! - **Verification**: the `TokenVerifier` port, plus `StaticTokenVerifier`
//!   for tests and local development
//! - **Authorization**: `RequestAuthorizer`, credential in, allow/deny out
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_auth::{AccessClaims, AuthResult, RequestAuthorizer, StaticTokenVerifier};
//! use platform_rbac::AccessControl;
//! use std::sync::Arc;
//!
//! async fn example() -> AuthResult<()> {
//!     let rbac = AccessControl::in_memory();
//!     let verifier = Arc::new(StaticTokenVerifier::new());
//!     verifier
//!         .insert("credential", AccessClaims::new("user-1", chrono::Duration::hours(1)))
//!         .await;
//!
//!     let authorizer = RequestAuthorizer::new(verifier, rbac.resolver().clone());
//!     let allowed = authorizer.authorize("credential", "junkquit", "recipes:read").await?;
//!     assert!(!allowed);
//!     Ok(())
//! }
//! ```
//!
//! ## Trust Model
//!
//! Role ids in claims are hints. The resolver drops every id the role
//! registry does not know, so a token can never grant more than the stored
//! grants of real roles.

pub mod claims;
pub mod error;
pub mod verifier;

// Re-export main types
pub use claims::AccessClaims;
pub use error::{AuthError, AuthResult};
pub use verifier::{RequestAuthorizer, StaticTokenVerifier, TokenVerifier};
