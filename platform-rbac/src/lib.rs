//! # Platform RBAC (Role-Based Access Control)
//!
//! This crate is the authorization engine shared by every Relay client
//! application. Applications declare the permissions they define, operators
//! organize them into roles, and each request is checked against the roles
//! carried by the user's identity token.
//!
//! ## Overview
//!
//! - **Applications**: clients that own a permission catalog
//! - **Roles**: global, or scoped to one application
//! - **Permissions**: per-application codes (`recipes:read`), versioned and
//!   deprecated rather than deleted
//! - **Grants**: role -> permission, and user -> role assignments
//! - **Authorization**: token roles ∩ known roles -> permission -> any grant?
//!
//! ## Architecture
//!
//! ```text
//!                  AccessControl
//!   ┌──────────┬──────────┬───────────┬──────────┬────────────┐
//!   Applications  Roles   Permissions   Grants     Resolver
//!                          (reconcile)            (DecisionCache)
//!   └──────────┴──────────┴─────┬─────┴──────────┴────────────┘
//!                          dyn RbacStore
//!                         (InMemoryStore)
//! ```
//!
//! ## Permission Lifecycle
//!
//! Each application declares its complete permission set once per version.
//! Codes it stops declaring become deprecated as of that version and keep
//! authorizing through existing grants until revoked. Declaring a deprecated
//! code again reactivates it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_rbac::{AccessControl, DecodedToken, PermissionDeclaration, RbacResult};
//!
//! async fn example() -> RbacResult<()> {
//!     let rbac = AccessControl::in_memory();
//!
//!     rbac.permissions()
//!         .declare_permissions("junkquit", "1.0.0", vec![
//!             PermissionDeclaration::new("recipes:read", "Read recipes"),
//!             PermissionDeclaration::new("users:contact", "Contact users"),
//!         ])
//!         .await?;
//!
//!     let admin = rbac.roles().declare_global_role("Admin", "Full access").await?;
//!     rbac.grants()
//!         .grant_permissions(admin.id, &["recipes:read", "users:contact"], "junkquit")
//!         .await?;
//!
//!     let token = DecodedToken::new("user-1").with_global_role(admin.id.to_string());
//!     assert!(rbac.resolver().authorize(&token, "junkquit", "recipes:read").await?);
//!     Ok(())
//! }
//! ```

pub mod apps;
pub mod authorize;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod grants;
pub mod permissions;
pub mod reconcile;
pub mod retry;
pub mod roles;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod version;

// Re-export main types for convenience
pub use apps::{AppId, Application, ApplicationRegistry};
pub use authorize::AuthorizationResolver;
pub use cache::{CacheStats, DecisionCache, DecisionKey};
pub use catalog::{DeclaredVersion, PermissionRegistry};
pub use config::{ConfigError, EngineConfig};
pub use engine::AccessControl;
pub use error::{EntityKind, RbacError, RbacResult};
pub use grants::GrantManager;
pub use permissions::{Permission, PermissionDeclaration, PermissionId, PermissionState};
pub use reconcile::{ReconciliationPlan, ReconciliationReport};
pub use roles::{Role, RoleId, RoleRegistry, RoleScope, UserId};
pub use store::{CatalogSnapshot, CatalogUpdate, RbacStore};
pub use token::DecodedToken;
pub use version::AppVersion;

#[cfg(feature = "memory")]
pub use store::InMemoryStore;
