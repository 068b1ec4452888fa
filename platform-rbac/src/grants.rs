//! # Grant Manager
//!
//! Maintains the two relations that connect users to permissions:
//! role assignments (user -> role) and grants (role -> permission).
//!
//! Writes are idempotent. Granting a batch is all-or-nothing: if any code
//! fails to resolve, nothing is granted and the error lists every
//! unresolved code. Revoking is best-effort. Grants and revocations drop
//! cached authorization decisions for the affected role.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::apps::{AppId, ApplicationRegistry};
use crate::cache::DecisionCache;
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::permissions::{Permission, PermissionId};
use crate::roles::{Role, RoleId, UserId};
use crate::store::RbacStore;

/// Assigns roles to users and permissions to roles.
#[derive(Clone)]
pub struct GrantManager {
    store: Arc<dyn RbacStore>,
    apps: ApplicationRegistry,
    cache: Option<Arc<DecisionCache>>,
}

impl GrantManager {
    /// Create a manager over the given store.
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self {
            apps: ApplicationRegistry::new(store.clone()),
            store,
            cache: None,
        }
    }

    /// Invalidate this decision cache on every grant change.
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Assign a role to a user. Assigning twice is the same as once.
    ///
    /// # Errors
    ///
    /// - [`RbacError::Validation`] for a blank user id
    /// - [`RbacError::NotFound`] if the role does not exist
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn assign_role(&self, user_id: &str, role_id: RoleId) -> RbacResult<()> {
        let user_id = UserId::parse(user_id)?;
        self.require_role(role_id).await?;

        if self.store.insert_assignment(&user_id, role_id).await? {
            info!(user_id = %user_id, role_id = %role_id, "Role assigned");
        } else {
            debug!(user_id = %user_id, role_id = %role_id, "Role already assigned");
        }
        Ok(())
    }

    /// Remove a role from a user. Revoking an absent assignment succeeds.
    ///
    /// # Errors
    ///
    /// - [`RbacError::Validation`] for a blank user id
    /// - [`RbacError::NotFound`] if the role does not exist
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn revoke_role(&self, user_id: &str, role_id: RoleId) -> RbacResult<()> {
        let user_id = UserId::parse(user_id)?;
        self.require_role(role_id).await?;

        if self.store.delete_assignment(&user_id, role_id).await? {
            info!(user_id = %user_id, role_id = %role_id, "Role revoked");
        } else {
            debug!(user_id = %user_id, role_id = %role_id, "Role was not assigned");
        }
        Ok(())
    }

    /// Grant permissions of one application to a role.
    ///
    /// Codes resolve against the application's whole catalog, so deprecated
    /// permissions can still be granted. The role may be global or scoped to
    /// any application.
    ///
    /// # Arguments
    ///
    /// * `role_id` - Role receiving the grants
    /// * `codes` - Permission codes; duplicates are collapsed
    /// * `app_id` - Application whose catalog the codes belong to
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] for an unknown role or application, or listing
    /// every code that does not resolve. Nothing is granted in either case.
    #[instrument(skip(self, codes), fields(role_id = %role_id, requested = codes.len()))]
    pub async fn grant_permissions(
        &self,
        role_id: RoleId,
        codes: &[&str],
        app_id: &str,
    ) -> RbacResult<()> {
        let app_id = AppId::parse(app_id)?;
        self.require_role(role_id).await?;
        self.apps.require(&app_id).await?;

        let (permissions, missing) = self.resolve_codes(&app_id, codes).await?;
        if !missing.is_empty() {
            warn!(
                app_id = %app_id,
                role_id = %role_id,
                missing = ?missing,
                "Grant rejected, unknown permission codes"
            );
            return Err(RbacError::NotFound {
                kind: EntityKind::Permission,
                ids: missing,
            });
        }

        let ids: Vec<PermissionId> = permissions.iter().map(|p| p.id).collect();
        let inserted = self.store.insert_grants(role_id, &ids).await?;
        self.invalidate(role_id).await;

        info!(
            app_id = %app_id,
            role_id = %role_id,
            granted = inserted,
            already_granted = ids.len() - inserted,
            "Permissions granted"
        );
        Ok(())
    }

    /// Revoke permissions of one application from a role.
    ///
    /// Codes that do not resolve, or were never granted, are ignored.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] if the role does not exist.
    #[instrument(skip(self, codes), fields(role_id = %role_id, requested = codes.len()))]
    pub async fn revoke_permissions(
        &self,
        role_id: RoleId,
        codes: &[&str],
        app_id: &str,
    ) -> RbacResult<()> {
        let app_id = AppId::parse(app_id)?;
        self.require_role(role_id).await?;

        let (permissions, missing) = self.resolve_codes(&app_id, codes).await?;
        if !missing.is_empty() {
            debug!(app_id = %app_id, missing = ?missing, "Ignoring unknown codes on revoke");
        }

        let ids: Vec<PermissionId> = permissions.iter().map(|p| p.id).collect();
        let removed = if ids.is_empty() {
            0
        } else {
            self.store.delete_grants(role_id, &ids).await?
        };
        self.invalidate(role_id).await;

        info!(app_id = %app_id, role_id = %role_id, revoked = removed, "Permissions revoked");
        Ok(())
    }

    /// List a role's granted permissions within the given applications.
    ///
    /// Deprecated permissions are included. Results follow the order of
    /// `app_ids`, then code.
    ///
    /// # Errors
    ///
    /// - [`RbacError::Validation`] if `app_ids` is empty or holds a malformed id
    /// - [`RbacError::NotFound`] if the role does not exist
    pub async fn list_role_permissions(
        &self,
        role_id: RoleId,
        app_ids: &[&str],
    ) -> RbacResult<Vec<Permission>> {
        if app_ids.is_empty() {
            return Err(RbacError::Validation(
                "at least one application id is required".to_string(),
            ));
        }
        let mut apps: Vec<AppId> = Vec::with_capacity(app_ids.len());
        for raw in app_ids {
            let app_id = AppId::parse(raw)?;
            if !apps.contains(&app_id) {
                apps.push(app_id);
            }
        }
        self.require_role(role_id).await?;

        let mut permissions = self.store.list_role_grants(role_id, &apps).await?;
        permissions.sort_by_key(|p| {
            let rank = apps.iter().position(|a| a == &p.app_id).unwrap_or(apps.len());
            (rank, p.code.clone())
        });

        debug!(role_id = %role_id, count = permissions.len(), "Listed role permissions");
        Ok(permissions)
    }

    /// Resolve codes in an application's catalog, splitting off the unknown ones.
    async fn resolve_codes(
        &self,
        app_id: &AppId,
        codes: &[&str],
    ) -> RbacResult<(Vec<Permission>, Vec<String>)> {
        let wanted: Vec<String> = codes
            .iter()
            .map(|code| code.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let found = self.store.find_permissions(app_id, &wanted).await?;
        let resolved: HashSet<&str> = found.iter().map(|p| p.code.as_str()).collect();
        let missing = wanted
            .iter()
            .filter(|code| !resolved.contains(code.as_str()))
            .cloned()
            .collect();
        Ok((found, missing))
    }

    async fn require_role(&self, role_id: RoleId) -> RbacResult<Role> {
        self.store
            .get_role(role_id)
            .await?
            .ok_or_else(|| RbacError::not_found(EntityKind::Role, role_id.to_string()))
    }

    async fn invalidate(&self, role_id: RoleId) {
        if let Some(cache) = &self.cache {
            let dropped = cache.invalidate_role(role_id).await;
            debug!(role_id = %role_id, dropped, "Invalidated cached decisions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PermissionRegistry;
    use crate::permissions::PermissionDeclaration;
    use crate::roles::RoleRegistry;
    use crate::store::InMemoryStore;

    struct Fixture {
        grants: GrantManager,
        roles: RoleRegistry,
        admin: RoleId,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn RbacStore> = Arc::new(InMemoryStore::new());
        let catalog = PermissionRegistry::new(store.clone());
        for (app, codes) in [
            ("junkquit", vec!["recipes:read", "users:contact"]),
            ("recipes", vec!["recipes:write"]),
        ] {
            let batch = codes
                .into_iter()
                .map(|c| PermissionDeclaration::new(c, ""))
                .collect();
            catalog.declare_permissions(app, "1.0.0", batch).await.unwrap();
        }

        let roles = RoleRegistry::new(store.clone());
        let admin = roles.declare_global_role("Admin", "Everything").await.unwrap().id;
        Fixture {
            grants: GrantManager::new(store),
            roles,
            admin,
        }
    }

    fn codes(permissions: &[Permission]) -> Vec<String> {
        permissions
            .iter()
            .map(|p| format!("{}/{}", p.app_id, p.code))
            .collect()
    }

    #[tokio::test]
    async fn test_assign_role_is_idempotent() {
        let f = fixture().await;
        f.grants.assign_role("u1", f.admin).await.unwrap();
        f.grants.assign_role("u1", f.admin).await.unwrap();
        assert_eq!(f.roles.list_user_roles("u1").await.unwrap().len(), 1);

        f.grants.revoke_role("u1", f.admin).await.unwrap();
        f.grants.revoke_role("u1", f.admin).await.unwrap();
        assert!(f.roles.list_user_roles("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let f = fixture().await;
        let ghost = RoleId::new();

        let err = f.grants.assign_role("u1", ghost).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { kind: EntityKind::Role, .. }));
        let err = f.grants.revoke_role("u1", ghost).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { kind: EntityKind::Role, .. }));
        let err = f
            .grants
            .grant_permissions(ghost, &["recipes:read"], "junkquit")
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::NotFound { kind: EntityKind::Role, .. }));
    }

    #[tokio::test]
    async fn test_grant_is_all_or_nothing() {
        let f = fixture().await;
        let err = f
            .grants
            .grant_permissions(f.admin, &["recipes:read", "bogus:code", "also:bogus"], "junkquit")
            .await
            .unwrap_err();

        match err {
            RbacError::NotFound { kind, ids } => {
                assert_eq!(kind, EntityKind::Permission);
                assert_eq!(ids, vec!["also:bogus", "bogus:code"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let granted = f.grants.list_role_permissions(f.admin, &["junkquit"]).await.unwrap();
        assert!(granted.is_empty());
    }

    #[tokio::test]
    async fn test_grant_is_idempotent_and_collapses_duplicates() {
        let f = fixture().await;
        f.grants
            .grant_permissions(f.admin, &["recipes:read", "recipes:read"], "junkquit")
            .await
            .unwrap();
        f.grants
            .grant_permissions(f.admin, &["recipes:read"], "junkquit")
            .await
            .unwrap();

        let granted = f.grants.list_role_permissions(f.admin, &["junkquit"]).await.unwrap();
        assert_eq!(codes(&granted), vec!["junkquit/recipes:read"]);
    }

    #[tokio::test]
    async fn test_revoke_ignores_unknown_codes() {
        let f = fixture().await;
        f.grants
            .grant_permissions(f.admin, &["recipes:read", "users:contact"], "junkquit")
            .await
            .unwrap();
        f.grants
            .revoke_permissions(f.admin, &["users:contact", "bogus"], "junkquit")
            .await
            .unwrap();
        f.grants
            .revoke_permissions(f.admin, &["users:contact"], "never-declared")
            .await
            .unwrap();

        let granted = f.grants.list_role_permissions(f.admin, &["junkquit"]).await.unwrap();
        assert_eq!(codes(&granted), vec!["junkquit/recipes:read"]);
    }

    #[tokio::test]
    async fn test_listing_follows_application_order() {
        let f = fixture().await;
        f.grants
            .grant_permissions(f.admin, &["users:contact", "recipes:read"], "junkquit")
            .await
            .unwrap();
        f.grants
            .grant_permissions(f.admin, &["recipes:write"], "recipes")
            .await
            .unwrap();

        let granted = f
            .grants
            .list_role_permissions(f.admin, &["recipes", "junkquit"])
            .await
            .unwrap();
        assert_eq!(
            codes(&granted),
            vec!["recipes/recipes:write", "junkquit/recipes:read", "junkquit/users:contact"]
        );

        let err = f.grants.list_role_permissions(f.admin, &[]).await.unwrap_err();
        assert!(matches!(err, RbacError::Validation(_)));
    }

    #[tokio::test]
    async fn test_grants_invalidate_cached_decisions() {
        let f = fixture().await;
        let cache = Arc::new(DecisionCache::new(std::time::Duration::from_secs(60), 100));
        let grants = f.grants.clone().with_cache(cache.clone());

        let key = crate::cache::DecisionKey::new(
            [f.admin],
            AppId::parse("junkquit").unwrap(),
            "recipes:read",
        );
        cache.insert(key.clone(), false, cache.generation()).await;

        grants
            .grant_permissions(f.admin, &["recipes:read"], "junkquit")
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await, None);
    }
}
