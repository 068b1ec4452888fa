//! # Permission Registry
//!
//! Owns every application's permission catalog. Applications declare their
//! full permission set for a version; the registry reconciles the
//! declaration against the stored catalog and persists the outcome in one
//! atomic store write.
//!
//! ## Concurrency
//!
//! Declarations for the same application are serialized by a per-application
//! lock; declarations for different applications proceed in parallel. The
//! store additionally checks the catalog revision each reconciliation was
//! computed against, so writers in other processes cannot interleave. A
//! conflicting write is recomputed from a fresh snapshot and retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::apps::{AppId, ApplicationRegistry};
use crate::cache::DecisionCache;
use crate::error::{RbacError, RbacResult};
use crate::permissions::{Permission, PermissionDeclaration};
use crate::reconcile::{reconcile, validate_batch, ReconciliationReport};
use crate::retry::{with_retry_if, RetryConfig};
use crate::store::{CatalogUpdate, RbacStore};
use crate::version::AppVersion;

/// One entry of an application's declaration history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredVersion {
    /// Declared version
    pub version: AppVersion,

    /// When the declaration was applied
    pub declared_at: DateTime<Utc>,

    /// Number of codes added
    pub added: usize,

    /// Number of codes reactivated
    pub reactivated: usize,

    /// Number of codes whose description changed
    pub updated: usize,

    /// Number of codes deprecated
    pub deprecated: usize,
}

impl DeclaredVersion {
    /// Summarize a reconciliation report.
    pub fn from_report(report: &ReconciliationReport) -> Self {
        Self {
            version: report.version.clone(),
            declared_at: Utc::now(),
            added: report.added.len(),
            reactivated: report.reactivated.len(),
            updated: report.updated.len(),
            deprecated: report.deprecated.len(),
        }
    }
}

/// Registry of versioned permission catalogs.
#[derive(Clone)]
pub struct PermissionRegistry {
    store: Arc<dyn RbacStore>,
    apps: ApplicationRegistry,
    cache: Option<Arc<DecisionCache>>,
    retry: RetryConfig,
    locks: Arc<Mutex<HashMap<AppId, Arc<Mutex<()>>>>>,
}

impl PermissionRegistry {
    /// Create a registry over the given store.
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self {
            apps: ApplicationRegistry::new(store.clone()),
            store,
            cache: None,
            retry: RetryConfig::default(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Invalidate this decision cache after every reconciliation.
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Retry policy for conflicting catalog writes.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Declare an application's complete permission set for a version.
    ///
    /// Codes missing from `batch` that are currently active are deprecated as
    /// of `version`; previously deprecated codes present in `batch` are
    /// reactivated. An unknown application is registered under its own id.
    ///
    /// # Arguments
    ///
    /// * `app_id` - Declaring application
    /// * `version` - Application version, not older than its last declaration
    /// * `batch` - Every permission the application defines at `version`
    ///
    /// # Returns
    ///
    /// The reconciliation report, each list sorted by code
    ///
    /// # Errors
    ///
    /// - [`RbacError::Validation`] for a malformed id, version or code, or a duplicate code
    /// - [`RbacError::VersionOrder`] if `version` is older than the last declared one
    /// - [`RbacError::Conflict`] if concurrent writers exhausted the retry budget
    ///
    /// # Example
    ///
    /// ```
    /// use platform_rbac::catalog::PermissionRegistry;
    /// use platform_rbac::permissions::PermissionDeclaration;
    /// use platform_rbac::store::InMemoryStore;
    /// use std::sync::Arc;
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
    /// let registry = PermissionRegistry::new(Arc::new(InMemoryStore::new()));
    /// let report = registry
    ///     .declare_permissions("junkquit", "1.0.0", vec![
    ///         PermissionDeclaration::new("recipes:read", "Read recipes"),
    ///     ])
    ///     .await
    ///     .unwrap();
    /// assert_eq!(report.added, vec!["recipes:read"]);
    /// # });
    /// ```
    #[instrument(skip(self, batch), fields(declared = batch.len()))]
    pub async fn declare_permissions(
        &self,
        app_id: &str,
        version: &str,
        batch: Vec<PermissionDeclaration>,
    ) -> RbacResult<ReconciliationReport> {
        let app_id = AppId::parse(app_id)?;
        let version = AppVersion::parse(version)?;
        validate_batch(&batch)?;

        self.apps.ensure(&app_id).await?;

        let lock = self.app_lock(&app_id).await;
        let _guard = lock.lock().await;

        let (app_ref, version_ref, batch_ref) = (&app_id, &version, batch.as_slice());
        let report = with_retry_if(
            &self.retry,
            move || self.try_declare(app_ref, version_ref, batch_ref),
            RbacError::is_retryable,
        )
        .await?;

        if let Some(cache) = &self.cache {
            cache.invalidate_app(&app_id).await;
        }

        info!(
            app_id = %app_id,
            version = %version,
            added = report.added.len(),
            reactivated = report.reactivated.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            deprecated = report.deprecated.len(),
            "Permissions reconciled"
        );
        Ok(report)
    }

    async fn try_declare(
        &self,
        app_id: &AppId,
        version: &AppVersion,
        batch: &[PermissionDeclaration],
    ) -> RbacResult<ReconciliationReport> {
        let snapshot = self.store.load_catalog(app_id).await?;
        let plan = reconcile(
            app_id,
            &snapshot.permissions,
            snapshot.latest_version(),
            version,
            batch,
        )?;

        let record = DeclaredVersion::from_report(&plan.report);
        let revision = self
            .store
            .apply_catalog_update(
                app_id,
                CatalogUpdate {
                    expected_revision: snapshot.revision,
                    record,
                    changes: plan.changes,
                },
            )
            .await?;
        debug!(app_id = %app_id, revision, "Catalog update applied");
        Ok(plan.report)
    }

    async fn app_lock(&self, app_id: &AppId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(app_id.clone()).or_default().clone()
    }

    /// List an application's permissions.
    ///
    /// Without a version, returns the whole catalog, active and deprecated.
    /// With a version, returns the permissions that were active at it: last
    /// declared at or before `version` and not deprecated by it.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] for an unknown application.
    #[instrument(skip(self))]
    pub async fn list_permissions(
        &self,
        app_id: &str,
        version: Option<&str>,
    ) -> RbacResult<Vec<Permission>> {
        let app_id = AppId::parse(app_id)?;
        let version = version.map(AppVersion::parse).transpose()?;
        self.apps.require(&app_id).await?;

        let mut permissions = self.store.load_catalog(&app_id).await?.permissions;
        if let Some(version) = &version {
            permissions.retain(|p| p.was_active_at(version));
        }
        permissions.sort_by(|a, b| a.code.cmp(&b.code));

        debug!(app_id = %app_id, count = permissions.len(), "Listed permissions");
        Ok(permissions)
    }

    /// List an application's deprecated permissions, by deprecation version then code.
    ///
    /// # Errors
    ///
    /// [`RbacError::NotFound`] for an unknown application.
    #[instrument(skip(self))]
    pub async fn list_deprecated_permissions(&self, app_id: &str) -> RbacResult<Vec<Permission>> {
        let app_id = AppId::parse(app_id)?;
        self.apps.require(&app_id).await?;

        let mut permissions: Vec<Permission> = self
            .store
            .load_catalog(&app_id)
            .await?
            .permissions
            .into_iter()
            .filter(Permission::is_deprecated)
            .collect();
        permissions.sort_by(|a, b| {
            a.deprecated_since()
                .cmp(&b.deprecated_since())
                .then_with(|| a.code.cmp(&b.code))
        });

        debug!(app_id = %app_id, count = permissions.len(), "Listed deprecated permissions");
        Ok(permissions)
    }

    /// Declaration history of an application, oldest first.
    pub async fn list_declared_versions(&self, app_id: &str) -> RbacResult<Vec<DeclaredVersion>> {
        let app_id = AppId::parse(app_id)?;
        self.apps.require(&app_id).await?;
        Ok(self.store.load_catalog(&app_id).await?.versions)
    }
}
