//! Engine facade.
//!
//! [`AccessControl`] wires every service to one store and, when enabled, one
//! shared decision cache, so that grant and catalog writes invalidate the
//! decisions the resolver serves.

use std::sync::Arc;
use tracing::info;

use crate::apps::ApplicationRegistry;
use crate::authorize::AuthorizationResolver;
use crate::cache::DecisionCache;
use crate::catalog::PermissionRegistry;
use crate::config::{ConfigError, EngineConfig};
use crate::grants::GrantManager;
use crate::roles::RoleRegistry;
use crate::store::RbacStore;

/// All access-control services over a shared store.
///
/// # Example
///
/// ```
/// use platform_rbac::engine::AccessControl;
/// use platform_rbac::permissions::PermissionDeclaration;
/// use platform_rbac::token::DecodedToken;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let rbac = AccessControl::in_memory();
/// rbac.permissions()
///     .declare_permissions("junkquit", "1.0.0", vec![
///         PermissionDeclaration::new("recipes:read", "Read recipes"),
///     ])
///     .await
///     .unwrap();
///
/// let admin = rbac.roles().declare_global_role("Admin", "Everything").await.unwrap();
/// rbac.grants()
///     .grant_permissions(admin.id, &["recipes:read"], "junkquit")
///     .await
///     .unwrap();
///
/// let token = DecodedToken::new("user-1").with_global_role(admin.id.to_string());
/// assert!(rbac.resolver().authorize(&token, "junkquit", "recipes:read").await.unwrap());
/// # });
/// ```
#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn RbacStore>,
    cache: Option<Arc<DecisionCache>>,
    apps: ApplicationRegistry,
    roles: RoleRegistry,
    permissions: PermissionRegistry,
    grants: GrantManager,
    resolver: AuthorizationResolver,
}

impl AccessControl {
    /// Build the engine over a store.
    pub fn new(store: Arc<dyn RbacStore>, config: &EngineConfig) -> Self {
        let cache = config
            .cache_enabled
            .then(|| Arc::new(DecisionCache::new(config.cache_ttl(), config.cache_capacity)));

        let mut permissions =
            PermissionRegistry::new(store.clone()).with_retry(config.reconcile_retry());
        let mut grants = GrantManager::new(store.clone());
        let mut resolver = AuthorizationResolver::new(store.clone());
        if let Some(cache) = &cache {
            permissions = permissions.with_cache(cache.clone());
            grants = grants.with_cache(cache.clone());
            resolver = resolver.with_cache(cache.clone());
        }

        info!(
            cache_enabled = config.cache_enabled,
            cache_ttl_secs = config.cache_ttl_secs,
            cache_capacity = config.cache_capacity,
            "Access control engine ready"
        );

        Self {
            apps: ApplicationRegistry::new(store.clone()),
            roles: RoleRegistry::new(store.clone()),
            store,
            cache,
            permissions,
            grants,
            resolver,
        }
    }

    /// Build the engine with configuration from the environment.
    pub fn from_env(store: Arc<dyn RbacStore>) -> Result<Self, ConfigError> {
        let config = EngineConfig::from_env()?;
        Ok(Self::new(store, &config))
    }

    /// Build the engine over a fresh in-memory store with default configuration.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::store::InMemoryStore::new()),
            &EngineConfig::default(),
        )
    }

    /// Application registry.
    pub fn applications(&self) -> &ApplicationRegistry {
        &self.apps
    }

    /// Role registry.
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// Permission registry.
    pub fn permissions(&self) -> &PermissionRegistry {
        &self.permissions
    }

    /// Grant manager.
    pub fn grants(&self) -> &GrantManager {
        &self.grants
    }

    /// Authorization resolver.
    pub fn resolver(&self) -> &AuthorizationResolver {
        &self.resolver
    }

    /// Shared decision cache, if enabled.
    pub fn cache(&self) -> Option<&Arc<DecisionCache>> {
        self.cache.as_ref()
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }
}
