//! Persistence port for access-control state.
//!
//! Every service in this crate reads and writes through [`RbacStore`]. The
//! trait carries no policy; it only guarantees that the multi-row writes
//! below are atomic with respect to concurrent readers:
//!
//! - [`RbacStore::insert_grants`] and [`RbacStore::delete_grants`] apply a
//!   whole batch or nothing.
//! - [`RbacStore::apply_catalog_update`] upserts every permission of a
//!   reconciliation and appends the version record in one step, guarded by
//!   an optimistic catalog revision check.

use async_trait::async_trait;

use crate::apps::{AppId, Application};
use crate::catalog::DeclaredVersion;
use crate::error::RbacResult;
use crate::permissions::{Permission, PermissionId};
use crate::roles::{Role, RoleId, UserId};
use crate::version::AppVersion;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::InMemoryStore;

/// Point-in-time view of one application's catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Catalog revision; bumped by every applied update
    pub revision: u64,

    /// Declaration history, oldest first
    pub versions: Vec<DeclaredVersion>,

    /// Every permission of the application, active or deprecated
    pub permissions: Vec<Permission>,
}

impl CatalogSnapshot {
    /// Most recently declared version.
    pub fn latest_version(&self) -> Option<&AppVersion> {
        self.versions.last().map(|record| &record.version)
    }
}

/// One reconciliation, ready to persist.
#[derive(Debug, Clone)]
pub struct CatalogUpdate {
    /// Revision the reconciliation was computed against
    pub expected_revision: u64,

    /// History record for the declared version
    pub record: DeclaredVersion,

    /// Permissions to upsert by `(app_id, code)`
    pub changes: Vec<Permission>,
}

/// Storage contract for applications, roles, permissions, grants and assignments.
#[async_trait]
pub trait RbacStore: Send + Sync {
    /// Insert an application unless its id is taken; returns the stored record.
    async fn insert_application(&self, application: Application) -> RbacResult<Application>;

    /// Get an application by id.
    async fn get_application(&self, app_id: &AppId) -> RbacResult<Option<Application>>;

    /// List applications in registration order.
    async fn list_applications(&self) -> RbacResult<Vec<Application>>;

    /// Insert a newly created role.
    async fn insert_role(&self, role: Role) -> RbacResult<()>;

    /// Get a role by id.
    async fn get_role(&self, role_id: RoleId) -> RbacResult<Option<Role>>;

    /// List every role in creation order.
    async fn list_roles(&self) -> RbacResult<Vec<Role>>;

    /// Return the subset of `role_ids` that exist, preserving input order.
    async fn existing_role_ids(&self, role_ids: &[RoleId]) -> RbacResult<Vec<RoleId>>;

    /// Load an application's catalog; unknown applications yield an empty snapshot.
    async fn load_catalog(&self, app_id: &AppId) -> RbacResult<CatalogSnapshot>;

    /// Apply a reconciliation atomically and return the new revision.
    ///
    /// Fails with [`crate::RbacError::Conflict`] when the catalog revision no
    /// longer matches `update.expected_revision`.
    async fn apply_catalog_update(
        &self,
        app_id: &AppId,
        update: CatalogUpdate,
    ) -> RbacResult<u64>;

    /// Find permissions of an application by code; unknown codes are skipped.
    async fn find_permissions(
        &self,
        app_id: &AppId,
        codes: &[String],
    ) -> RbacResult<Vec<Permission>>;

    /// Grant permissions to a role; returns how many pairs were new.
    async fn insert_grants(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> RbacResult<usize>;

    /// Revoke permissions from a role; returns how many pairs existed.
    async fn delete_grants(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> RbacResult<usize>;

    /// List a role's granted permissions belonging to any of `app_ids`.
    async fn list_role_grants(
        &self,
        role_id: RoleId,
        app_ids: &[AppId],
    ) -> RbacResult<Vec<Permission>>;

    /// Check whether any of `role_ids` holds a grant on `permission_id`.
    async fn has_any_grant(
        &self,
        role_ids: &[RoleId],
        permission_id: PermissionId,
    ) -> RbacResult<bool>;

    /// List distinct permissions of `app_id` granted to any of `role_ids`.
    async fn list_granted_permissions(
        &self,
        role_ids: &[RoleId],
        app_id: &AppId,
    ) -> RbacResult<Vec<Permission>>;

    /// Assign a role to a user; returns `false` if it was already assigned.
    async fn insert_assignment(&self, user_id: &UserId, role_id: RoleId) -> RbacResult<bool>;

    /// Remove a role from a user; returns `false` if it was not assigned.
    async fn delete_assignment(&self, user_id: &UserId, role_id: RoleId) -> RbacResult<bool>;

    /// List roles assigned to a user in role creation order.
    async fn list_assigned_roles(&self, user_id: &UserId) -> RbacResult<Vec<Role>>;
}
