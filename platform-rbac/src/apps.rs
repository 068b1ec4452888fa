//! # Applications
//!
//! Client applications own permission catalogs and application-scoped roles.
//! An application is known once it has been registered explicitly or has
//! declared its permissions for the first time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{EntityKind, RbacError, RbacResult};
use crate::store::RbacStore;

/// Identifier of a client application (e.g. `junkquit`).
///
/// Identifiers are trimmed, non-empty and contain no whitespace. Case is
/// preserved and significant.
///
/// # Example
///
/// ```
/// use platform_rbac::apps::AppId;
///
/// let app = AppId::parse(" junkquit ").unwrap();
/// assert_eq!(app.as_str(), "junkquit");
/// assert!(AppId::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Parse an application identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Validation`] if the identifier is blank or contains whitespace.
    pub fn parse(s: &str) -> RbacResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RbacError::Validation(
                "application id must not be empty".to_string(),
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(RbacError::Validation(format!(
                "application id '{trimmed}' must not contain whitespace"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the string representation of the application id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AppId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A registered client application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Application identifier
    pub id: AppId,

    /// Human-readable name
    pub name: String,

    /// When the application was first registered
    pub registered_at: DateTime<Utc>,
}

impl Application {
    /// Create a new application record registered now.
    pub fn new(id: AppId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            registered_at: Utc::now(),
        }
    }
}

/// Registry of client applications.
#[derive(Clone)]
pub struct ApplicationRegistry {
    store: Arc<dyn RbacStore>,
}

impl ApplicationRegistry {
    /// Create a registry over the given store.
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    /// Register an application.
    ///
    /// Registration is idempotent: registering a known id returns the stored
    /// record unchanged, including its original name.
    ///
    /// # Arguments
    ///
    /// * `app_id` - The application identifier
    /// * `name` - Human-readable name
    ///
    /// # Errors
    ///
    /// [`RbacError::Validation`] for a malformed id or an empty name.
    #[instrument(skip(self))]
    pub async fn register_application(&self, app_id: &str, name: &str) -> RbacResult<Application> {
        let id = AppId::parse(app_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RbacError::Validation(
                "application name must not be empty".to_string(),
            ));
        }

        let stored = self
            .store
            .insert_application(Application::new(id, name))
            .await?;
        info!(app_id = %stored.id, "Application registered");
        Ok(stored)
    }

    /// Get an application by id.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] if the application was never registered.
    pub async fn get_application(&self, app_id: &str) -> RbacResult<Application> {
        let id = AppId::parse(app_id)?;
        self.require(&id).await
    }

    /// List applications in registration order.
    pub async fn list_applications(&self) -> RbacResult<Vec<Application>> {
        let applications = self.store.list_applications().await?;
        debug!(count = applications.len(), "Listed applications");
        Ok(applications)
    }

    /// Fetch an application or fail with not-found.
    pub(crate) async fn require(&self, app_id: &AppId) -> RbacResult<Application> {
        self.store
            .get_application(app_id)
            .await?
            .ok_or_else(|| RbacError::not_found(EntityKind::Application, app_id.as_str()))
    }

    /// Register the application under its own id if it is not known yet.
    pub(crate) async fn ensure(&self, app_id: &AppId) -> RbacResult<Application> {
        if let Some(existing) = self.store.get_application(app_id).await? {
            return Ok(existing);
        }
        let stored = self
            .store
            .insert_application(Application::new(app_id.clone(), app_id.as_str()))
            .await?;
        info!(app_id = %stored.id, "Application registered on first declaration");
        Ok(stored)
    }
}
