//! # Permissions
//!
//! Catalog entries declared by client applications. A permission is identified
//! by its application and code (e.g. `recipes:read`), is never deleted, and
//! moves between the active and deprecated states as the application's
//! declarations change over versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::apps::AppId;
use crate::error::{RbacError, RbacResult};
use crate::version::AppVersion;

/// Maximum length of a permission code, in characters.
pub const MAX_CODE_LEN: usize = 128;

/// Unique identifier of a permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(Uuid);

impl PermissionId {
    /// Generate a new permission id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PermissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a permission code.
///
/// Codes are short machine-readable strings: non-empty, at most
/// [`MAX_CODE_LEN`] characters, without whitespace.
///
/// # Example
///
/// ```
/// use platform_rbac::permissions::validate_code;
///
/// assert!(validate_code("recipes:read").is_ok());
/// assert!(validate_code("recipes read").is_err());
/// ```
pub fn validate_code(code: &str) -> RbacResult<()> {
    if code.is_empty() {
        return Err(RbacError::Validation(
            "permission code must not be empty".to_string(),
        ));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(RbacError::Validation(format!(
            "permission code '{code}' exceeds {MAX_CODE_LEN} characters"
        )));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(RbacError::Validation(format!(
            "permission code '{code}' must not contain whitespace"
        )));
    }
    Ok(())
}

/// Lifecycle state of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PermissionState {
    /// Declared in the application's most recent reconciliation.
    Active,

    /// Omitted from a reconciliation; kept with its grants.
    Deprecated {
        /// Version whose declaration first omitted the permission.
        #[serde(rename = "deprecated_since")]
        since: AppVersion,
    },
}

/// A permission in an application's catalog.
///
/// # Example
///
/// ```
/// use platform_rbac::apps::AppId;
/// use platform_rbac::permissions::Permission;
/// use platform_rbac::version::AppVersion;
///
/// let app = AppId::parse("junkquit").unwrap();
/// let v1 = AppVersion::parse("1.0.0").unwrap();
/// let mut perm = Permission::new(app, "recipes:read", "Read recipes", v1);
/// assert!(perm.is_active());
///
/// perm.deprecate(AppVersion::parse("1.1.0").unwrap());
/// assert_eq!(perm.deprecated_since().map(|v| v.to_string()), Some("1.1.0".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission id
    pub id: PermissionId,

    /// Owning application
    pub app_id: AppId,

    /// Machine-readable code, unique within the application
    pub code: String,

    /// Human-readable description
    pub description: String,

    /// Version in which the permission was last declared
    pub active_version: AppVersion,

    /// Active or deprecated
    #[serde(flatten)]
    pub state: PermissionState,

    /// When the permission was first declared
    pub created_at: DateTime<Utc>,

    /// When the record last changed
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new active permission first declared at `version`.
    pub fn new(
        app_id: AppId,
        code: impl Into<String>,
        description: impl Into<String>,
        version: AppVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PermissionId::new(),
            app_id,
            code: code.into(),
            description: description.into(),
            active_version: version,
            state: PermissionState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the permission is currently declared.
    pub fn is_active(&self) -> bool {
        matches!(self.state, PermissionState::Active)
    }

    /// Check if the permission has been deprecated.
    pub fn is_deprecated(&self) -> bool {
        !self.is_active()
    }

    /// Version the permission was deprecated in, if any.
    pub fn deprecated_since(&self) -> Option<&AppVersion> {
        match &self.state {
            PermissionState::Active => None,
            PermissionState::Deprecated { since } => Some(since),
        }
    }

    /// Check whether the permission was active at a point in the version history.
    ///
    /// A permission counts as active at `version` when it was last declared at
    /// or before that version and had not yet been deprecated by it.
    pub fn was_active_at(&self, version: &AppVersion) -> bool {
        if self.active_version > *version {
            return false;
        }
        match self.deprecated_since() {
            None => true,
            Some(since) => since > version,
        }
    }

    /// Mark the permission deprecated as of `version`.
    pub fn deprecate(&mut self, version: AppVersion) {
        self.state = PermissionState::Deprecated { since: version };
        self.updated_at = Utc::now();
    }

    /// Record a fresh declaration at `version`, reactivating if deprecated.
    pub fn redeclare(&mut self, description: &str, version: AppVersion) {
        self.description = description.to_string();
        self.active_version = version;
        self.state = PermissionState::Active;
        self.updated_at = Utc::now();
    }
}

/// One entry of a declaration batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDeclaration {
    /// Permission code
    pub code: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl PermissionDeclaration {
    /// Create a declaration.
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

impl<C: Into<String>, D: Into<String>> From<(C, D)> for PermissionDeclaration {
    fn from((code, description): (C, D)) -> Self {
        Self::new(code, description)
    }
}
