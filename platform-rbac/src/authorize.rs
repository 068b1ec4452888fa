//! # Authorization Resolver
//!
//! Answers "may the bearer of this token perform `code` in `app_id`?".
//!
//! The token's role ids are intersected with the role registry before any
//! grant is consulted, so a forged or stale role id contributes nothing.
//! Every failure to establish a grant is a plain `false`: unknown
//! application, unknown code, no roles, or no grant all look the same to the
//! caller.
//!
//! ```text
//! token roles (global ∪ app) -> known roles -> permission by code -> any grant?
//! ```

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::apps::AppId;
use crate::cache::{DecisionCache, DecisionKey};
use crate::error::RbacResult;
use crate::permissions::Permission;
use crate::roles::RoleId;
use crate::store::RbacStore;
use crate::token::DecodedToken;

/// Resolves authorization decisions from tokens and stored grants.
#[derive(Clone)]
pub struct AuthorizationResolver {
    store: Arc<dyn RbacStore>,
    cache: Option<Arc<DecisionCache>>,
}

impl AuthorizationResolver {
    /// Create a resolver over the given store.
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store, cache: None }
    }

    /// Serve and remember decisions through this cache.
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Decide whether the token's holder has `permission_code` in `app_id`.
    ///
    /// Deprecated permissions still authorize while granted.
    ///
    /// # Errors
    ///
    /// [`crate::RbacError::Validation`] only when `app_id` is blank or
    /// malformed. Store failures propagate. Every other outcome is a boolean.
    #[instrument(skip(self, token), fields(subject = %token.subject))]
    pub async fn authorize(
        &self,
        token: &DecodedToken,
        app_id: &str,
        permission_code: &str,
    ) -> RbacResult<bool> {
        let app_id = AppId::parse(app_id)?;
        let candidates = token.candidate_roles(&app_id);
        if candidates.is_empty() || permission_code.is_empty() {
            debug!("Denied, nothing to evaluate");
            return Ok(false);
        }

        let Some(cache) = &self.cache else {
            return self.resolve(&candidates, &app_id, permission_code).await;
        };

        let key = DecisionKey::new(candidates.iter().copied(), app_id.clone(), permission_code);
        if let Some(allowed) = cache.get(&key).await {
            debug!(allowed, "Decision served from cache");
            return Ok(allowed);
        }

        let generation = cache.generation();
        let allowed = self.resolve(&candidates, &app_id, permission_code).await?;
        cache.insert(key, allowed, generation).await;
        Ok(allowed)
    }

    /// List the permissions of `app_id` the token's holder currently has.
    ///
    /// Unknown roles are ignored and an unknown application yields an empty
    /// list. Results are ordered by code.
    ///
    /// # Errors
    ///
    /// [`crate::RbacError::Validation`] when `app_id` is blank or malformed.
    #[instrument(skip(self, token), fields(subject = %token.subject))]
    pub async fn effective_permissions(
        &self,
        token: &DecodedToken,
        app_id: &str,
    ) -> RbacResult<Vec<Permission>> {
        let app_id = AppId::parse(app_id)?;
        let roles = self.known_roles(&token.candidate_roles(&app_id)).await?;
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let mut permissions = self.store.list_granted_permissions(&roles, &app_id).await?;
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        debug!(app_id = %app_id, count = permissions.len(), "Resolved effective permissions");
        Ok(permissions)
    }

    async fn resolve(&self, candidates: &[RoleId], app_id: &AppId, code: &str) -> RbacResult<bool> {
        let roles = self.known_roles(candidates).await?;
        if roles.is_empty() {
            debug!(app_id = %app_id, code, "Denied, no known roles");
            return Ok(false);
        }

        let Some(permission) = self
            .store
            .find_permissions(app_id, &[code.to_string()])
            .await?
            .into_iter()
            .next()
        else {
            debug!(app_id = %app_id, code, "Denied, permission does not exist");
            return Ok(false);
        };

        let allowed = self.store.has_any_grant(&roles, permission.id).await?;
        debug!(
            app_id = %app_id,
            code,
            allowed,
            deprecated = permission.is_deprecated(),
            "Decision resolved"
        );
        Ok(allowed)
    }

    /// Intersect token roles with the role registry.
    async fn known_roles(&self, candidates: &[RoleId]) -> RbacResult<Vec<RoleId>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let known = self.store.existing_role_ids(candidates).await?;
        if known.len() < candidates.len() {
            warn!(
                dropped = candidates.len() - known.len(),
                "Ignoring token roles unknown to the registry"
            );
        }
        Ok(known)
    }
}
