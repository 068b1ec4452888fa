//! Roles and the role registry
//!
//! Roles are either global, visible to every application, or scoped to a
//! single application. Roles are created by declaration and never edited or
//! deleted here; only their grants and assignments change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::apps::{AppId, ApplicationRegistry};
use crate::error::{EntityKind, RbacError, RbacResult};
use crate::store::RbacStore;

/// Unique, immutable role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Generate a new role id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse a role id from its string form.
    ///
    /// Returns `None` for anything that is not a UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Parse a user id.
    ///
    /// # Errors
    ///
    /// [`RbacError::Validation`] if the id is blank.
    pub fn parse(s: &str) -> RbacResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RbacError::Validation("user id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the string representation of the user id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        UserId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Visibility scope of a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    /// Visible to every application.
    Global,

    /// Only relevant when resolving permissions for this application.
    Application(AppId),
}

impl RoleScope {
    /// Owning application, for application-scoped roles.
    pub fn app_id(&self) -> Option<&AppId> {
        match self {
            RoleScope::Global => None,
            RoleScope::Application(app_id) => Some(app_id),
        }
    }
}

/// A declared role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role id
    pub id: RoleId,

    /// Human label; not required to be unique
    pub name: String,

    /// Description of what the role is for
    pub description: String,

    /// Global or application-scoped
    pub scope: RoleScope,

    /// When the role was declared
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>, scope: RoleScope) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: description.into(),
            scope,
            created_at: Utc::now(),
        }
    }

    /// Check if this is a global role.
    pub fn is_global(&self) -> bool {
        matches!(self.scope, RoleScope::Global)
    }
}

/// Registry for declaring and listing roles.
#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn RbacStore>,
    apps: ApplicationRegistry,
}

impl RoleRegistry {
    /// Create a registry over the given store.
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        let apps = ApplicationRegistry::new(store.clone());
        Self { store, apps }
    }

    /// Declare a new global role.
    ///
    /// Always creates a new role; names are not deduplicated.
    ///
    /// # Errors
    ///
    /// [`RbacError::Validation`] if the name or description is empty.
    #[instrument(skip(self, description))]
    pub async fn declare_global_role(&self, name: &str, description: &str) -> RbacResult<Role> {
        let (name, description) = validate_labels(name, description)?;
        self.insert(Role::new(name, description, RoleScope::Global)).await
    }

    /// Declare a new role scoped to an application.
    ///
    /// # Errors
    ///
    /// - [`RbacError::Validation`] if the name or description is empty
    /// - [`RbacError::NotFound`] if the application is unknown
    #[instrument(skip(self, description))]
    pub async fn declare_application_role(
        &self,
        app_id: &str,
        name: &str,
        description: &str,
    ) -> RbacResult<Role> {
        let (name, description) = validate_labels(name, description)?;
        let app_id = AppId::parse(app_id)?;
        self.apps.require(&app_id).await?;
        self.insert(Role::new(name, description, RoleScope::Application(app_id)))
            .await
    }

    /// Get a role by id.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] if the role does not exist.
    pub async fn get_role(&self, role_id: RoleId) -> RbacResult<Role> {
        self.store
            .get_role(role_id)
            .await?
            .ok_or_else(|| RbacError::not_found(EntityKind::Role, role_id.to_string()))
    }

    /// List global roles in creation order.
    pub async fn list_global_roles(&self) -> RbacResult<Vec<Role>> {
        let roles: Vec<Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(Role::is_global)
            .collect();
        debug!(count = roles.len(), "Listed global roles");
        Ok(roles)
    }

    /// List roles scoped to an application in creation order.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] if the application is unknown.
    pub async fn list_application_roles(&self, app_id: &str) -> RbacResult<Vec<Role>> {
        let app_id = AppId::parse(app_id)?;
        self.apps.require(&app_id).await?;
        let roles: Vec<Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(|role| role.scope.app_id() == Some(&app_id))
            .collect();
        debug!(app_id = %app_id, count = roles.len(), "Listed application roles");
        Ok(roles)
    }

    /// List the roles assigned to a user.
    ///
    /// Global roles come first in creation order, followed by
    /// application-scoped roles grouped by application. Groups follow
    /// application registration order; roles within a group keep creation
    /// order.
    pub async fn list_user_roles(&self, user_id: &str) -> RbacResult<Vec<Role>> {
        let user_id = UserId::parse(user_id)?;
        let assigned = self.store.list_assigned_roles(&user_id).await?;
        let applications = self.store.list_applications().await?;

        let (mut ordered, scoped): (Vec<Role>, Vec<Role>) =
            assigned.into_iter().partition(Role::is_global);

        for application in &applications {
            ordered.extend(
                scoped
                    .iter()
                    .filter(|role| role.scope.app_id() == Some(&application.id))
                    .cloned(),
            );
        }

        debug!(user_id = %user_id, count = ordered.len(), "Listed user roles");
        Ok(ordered)
    }

    async fn insert(&self, role: Role) -> RbacResult<Role> {
        self.store.insert_role(role.clone()).await?;
        info!(
            role_id = %role.id,
            name = %role.name,
            app_id = role.scope.app_id().map(AppId::as_str).unwrap_or("*"),
            "Role declared"
        );
        Ok(role)
    }
}

fn validate_labels<'a>(name: &'a str, description: &'a str) -> RbacResult<(&'a str, &'a str)> {
    let name = name.trim();
    let description = description.trim();
    if name.is_empty() {
        return Err(RbacError::Validation("role name must not be empty".to_string()));
    }
    if description.is_empty() {
        return Err(RbacError::Validation(
            "role description must not be empty".to_string(),
        ));
    }
    Ok((name, description))
}
