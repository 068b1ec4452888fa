//! In-memory implementation of the persistence port.
//!
//! # Purpose
//! Implements [`RbacStore`] entirely in memory. It backs tests, local
//! development, and single-process deployments that do not need durability.
//!
//! # Consistency
//! All state lives behind a single `tokio::sync::RwLock`. Every trait method
//! takes the lock once, so multi-row writes (grant batches, reconciliation
//! updates) are observed by readers either completely or not at all.
//! Reads proceed concurrently; writes are serialized.
//!
//! # Ordering
//! Applications and roles are kept in insertion order. Catalogs are keyed by
//! code, so permission listings come back sorted by code.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use super::{CatalogSnapshot, CatalogUpdate, RbacStore};
use crate::apps::{AppId, Application};
use crate::catalog::DeclaredVersion;
use crate::error::{RbacError, RbacResult};
use crate::permissions::{Permission, PermissionId};
use crate::roles::{Role, RoleId, UserId};

/// Catalog state of one application.
#[derive(Debug, Default)]
struct Catalog {
    revision: u64,
    versions: Vec<DeclaredVersion>,
    permissions: BTreeMap<String, Permission>,
}

#[derive(Debug, Default)]
struct State {
    /// Applications in registration order
    applications: Vec<Application>,
    /// Roles in creation order
    roles: Vec<Role>,
    /// Role id -> position in `roles`
    role_index: HashMap<RoleId, usize>,
    catalogs: HashMap<AppId, Catalog>,
    /// Permission id -> (application, code)
    permission_index: HashMap<PermissionId, (AppId, String)>,
    grants: HashMap<RoleId, HashSet<PermissionId>>,
    assignments: HashMap<UserId, HashSet<RoleId>>,
}

impl State {
    fn permission(&self, id: &PermissionId) -> Option<&Permission> {
        let (app_id, code) = self.permission_index.get(id)?;
        self.catalogs.get(app_id)?.permissions.get(code)
    }
}

/// In-memory access-control store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RbacStore for InMemoryStore {
    async fn insert_application(&self, application: Application) -> RbacResult<Application> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.applications.iter().find(|a| a.id == application.id) {
            return Ok(existing.clone());
        }
        state.applications.push(application.clone());
        Ok(application)
    }

    async fn get_application(&self, app_id: &AppId) -> RbacResult<Option<Application>> {
        let state = self.state.read().await;
        Ok(state.applications.iter().find(|a| &a.id == app_id).cloned())
    }

    async fn list_applications(&self) -> RbacResult<Vec<Application>> {
        Ok(self.state.read().await.applications.clone())
    }

    async fn insert_role(&self, role: Role) -> RbacResult<()> {
        let mut state = self.state.write().await;
        if state.role_index.contains_key(&role.id) {
            return Err(RbacError::Conflict(format!("role {} already exists", role.id)));
        }
        let position = state.roles.len();
        state.role_index.insert(role.id, position);
        state.roles.push(role);
        Ok(())
    }

    async fn get_role(&self, role_id: RoleId) -> RbacResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .role_index
            .get(&role_id)
            .map(|&position| state.roles[position].clone()))
    }

    async fn list_roles(&self) -> RbacResult<Vec<Role>> {
        Ok(self.state.read().await.roles.clone())
    }

    async fn existing_role_ids(&self, role_ids: &[RoleId]) -> RbacResult<Vec<RoleId>> {
        let state = self.state.read().await;
        Ok(role_ids
            .iter()
            .copied()
            .filter(|id| state.role_index.contains_key(id))
            .collect())
    }

    async fn load_catalog(&self, app_id: &AppId) -> RbacResult<CatalogSnapshot> {
        let state = self.state.read().await;
        Ok(state
            .catalogs
            .get(app_id)
            .map(|catalog| CatalogSnapshot {
                revision: catalog.revision,
                versions: catalog.versions.clone(),
                permissions: catalog.permissions.values().cloned().collect(),
            })
            .unwrap_or_default())
    }

    async fn apply_catalog_update(&self, app_id: &AppId, update: CatalogUpdate) -> RbacResult<u64> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let catalog = state.catalogs.entry(app_id.clone()).or_default();

        if catalog.revision != update.expected_revision {
            return Err(RbacError::Conflict(format!(
                "catalog of application {app_id} changed (expected revision {}, found {})",
                update.expected_revision, catalog.revision
            )));
        }

        for permission in &update.changes {
            if &permission.app_id != app_id {
                return Err(RbacError::Storage(format!(
                    "permission {} belongs to application {}, not {app_id}",
                    permission.code, permission.app_id
                )));
            }
        }

        for permission in update.changes {
            state
                .permission_index
                .insert(permission.id, (app_id.clone(), permission.code.clone()));
            catalog.permissions.insert(permission.code.clone(), permission);
        }
        catalog.versions.push(update.record);
        catalog.revision += 1;
        Ok(catalog.revision)
    }

    async fn find_permissions(
        &self,
        app_id: &AppId,
        codes: &[String],
    ) -> RbacResult<Vec<Permission>> {
        let state = self.state.read().await;
        let Some(catalog) = state.catalogs.get(app_id) else {
            return Ok(Vec::new());
        };
        Ok(codes
            .iter()
            .filter_map(|code| catalog.permissions.get(code).cloned())
            .collect())
    }

    async fn insert_grants(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> RbacResult<usize> {
        let mut state = self.state.write().await;
        if let Some(unknown) = permission_ids
            .iter()
            .find(|id| !state.permission_index.contains_key(id))
        {
            return Err(RbacError::Storage(format!("unknown permission id {unknown}")));
        }
        let granted = state.grants.entry(role_id).or_default();
        Ok(permission_ids
            .iter()
            .filter(|id| granted.insert(**id))
            .count())
    }

    async fn delete_grants(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> RbacResult<usize> {
        let mut state = self.state.write().await;
        let Some(granted) = state.grants.get_mut(&role_id) else {
            return Ok(0);
        };
        Ok(permission_ids
            .iter()
            .filter(|id| granted.remove(*id))
            .count())
    }

    async fn list_role_grants(
        &self,
        role_id: RoleId,
        app_ids: &[AppId],
    ) -> RbacResult<Vec<Permission>> {
        let state = self.state.read().await;
        let Some(granted) = state.grants.get(&role_id) else {
            return Ok(Vec::new());
        };
        Ok(granted
            .iter()
            .filter_map(|id| state.permission(id))
            .filter(|permission| app_ids.contains(&permission.app_id))
            .cloned()
            .collect())
    }

    async fn has_any_grant(
        &self,
        role_ids: &[RoleId],
        permission_id: PermissionId,
    ) -> RbacResult<bool> {
        let state = self.state.read().await;
        Ok(role_ids.iter().any(|role_id| {
            state
                .grants
                .get(role_id)
                .is_some_and(|granted| granted.contains(&permission_id))
        }))
    }

    async fn list_granted_permissions(
        &self,
        role_ids: &[RoleId],
        app_id: &AppId,
    ) -> RbacResult<Vec<Permission>> {
        let state = self.state.read().await;
        let ids: HashSet<PermissionId> = role_ids
            .iter()
            .filter_map(|role_id| state.grants.get(role_id))
            .flatten()
            .copied()
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| state.permission(id))
            .filter(|permission| &permission.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn insert_assignment(&self, user_id: &UserId, role_id: RoleId) -> RbacResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .assignments
            .entry(user_id.clone())
            .or_default()
            .insert(role_id))
    }

    async fn delete_assignment(&self, user_id: &UserId, role_id: RoleId) -> RbacResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .assignments
            .get_mut(user_id)
            .is_some_and(|roles| roles.remove(&role_id)))
    }

    async fn list_assigned_roles(&self, user_id: &UserId) -> RbacResult<Vec<Role>> {
        let state = self.state.read().await;
        let Some(assigned) = state.assignments.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .roles
            .iter()
            .filter(|role| assigned.contains(&role.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::AppVersion;
    use chrono::Utc;

    fn app(id: &str) -> AppId {
        AppId::parse(id).unwrap()
    }

    fn record(version: &str) -> DeclaredVersion {
        DeclaredVersion {
            version: AppVersion::parse(version).unwrap(),
            declared_at: Utc::now(),
            added: 0,
            reactivated: 0,
            updated: 0,
            deprecated: 0,
        }
    }

    fn permission(app_id: &str, code: &str) -> Permission {
        Permission::new(app(app_id), code, "", AppVersion::parse("1").unwrap())
    }

    #[tokio::test]
    async fn test_catalog_revision_check() {
        let store = InMemoryStore::new();
        let junkquit = app("junkquit");

        let revision = store
            .apply_catalog_update(
                &junkquit,
                CatalogUpdate {
                    expected_revision: 0,
                    record: record("1"),
                    changes: vec![permission("junkquit", "recipes:read")],
                },
            )
            .await
            .unwrap();
        assert_eq!(revision, 1);

        let stale = store
            .apply_catalog_update(
                &junkquit,
                CatalogUpdate {
                    expected_revision: 0,
                    record: record("2"),
                    changes: vec![permission("junkquit", "users:contact")],
                },
            )
            .await;
        assert!(matches!(stale, Err(RbacError::Conflict(_))));

        let snapshot = store.load_catalog(&junkquit).await.unwrap();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.permissions.len(), 1);
        assert_eq!(snapshot.latest_version(), Some(&AppVersion::parse("1").unwrap()));
    }

    #[tokio::test]
    async fn test_catalog_update_rejects_foreign_permissions() {
        let store = InMemoryStore::new();
        let result = store
            .apply_catalog_update(
                &app("junkquit"),
                CatalogUpdate {
                    expected_revision: 0,
                    record: record("1"),
                    changes: vec![
                        permission("junkquit", "a"),
                        permission("recipes", "b"),
                    ],
                },
            )
            .await;
        assert!(matches!(result, Err(RbacError::Storage(_))));

        // Nothing from the rejected batch is visible
        let snapshot = store.load_catalog(&app("junkquit")).await.unwrap();
        assert!(snapshot.permissions.is_empty());
        assert!(snapshot.versions.is_empty());
    }

    #[tokio::test]
    async fn test_grants_are_idempotent() {
        let store = InMemoryStore::new();
        let junkquit = app("junkquit");
        let perm = permission("junkquit", "recipes:read");
        store
            .apply_catalog_update(
                &junkquit,
                CatalogUpdate {
                    expected_revision: 0,
                    record: record("1"),
                    changes: vec![perm.clone()],
                },
            )
            .await
            .unwrap();

        let role = RoleId::new();
        assert_eq!(store.insert_grants(role, &[perm.id]).await.unwrap(), 1);
        assert_eq!(store.insert_grants(role, &[perm.id]).await.unwrap(), 0);
        assert!(store.has_any_grant(&[RoleId::new(), role], perm.id).await.unwrap());

        assert_eq!(store.delete_grants(role, &[perm.id]).await.unwrap(), 1);
        assert_eq!(store.delete_grants(role, &[perm.id]).await.unwrap(), 0);
        assert!(!store.has_any_grant(&[role], perm.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_batch_with_unknown_id_is_rejected() {
        let store = InMemoryStore::new();
        let role = RoleId::new();
        let result = store.insert_grants(role, &[PermissionId::new()]).await;
        assert!(matches!(result, Err(RbacError::Storage(_))));
    }

    #[tokio::test]
    async fn test_assignments() {
        let store = InMemoryStore::new();
        let role = Role::new("Admin", "All", crate::roles::RoleScope::Global);
        store.insert_role(role.clone()).await.unwrap();
        let user = UserId::parse("u1").unwrap();

        assert!(store.insert_assignment(&user, role.id).await.unwrap());
        assert!(!store.insert_assignment(&user, role.id).await.unwrap());
        assert_eq!(store.list_assigned_roles(&user).await.unwrap(), vec![role.clone()]);

        assert!(store.delete_assignment(&user, role.id).await.unwrap());
        assert!(!store.delete_assignment(&user, role.id).await.unwrap());
        assert!(store.list_assigned_roles(&user).await.unwrap().is_empty());
    }
}
