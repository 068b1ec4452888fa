//! Error types for access-control operations
//!
//! Registries surface every variant directly to callers. The grant manager
//! treats repeated grants, assignments and revocations as success, and the
//! authorization resolver reports denials as `false` rather than as errors.

use thiserror::Error;

/// The kind of entity a [`RbacError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A client application.
    Application,
    /// A global or application-scoped role.
    Role,
    /// A permission code within an application catalog.
    Permission,
}

impl EntityKind {
    /// Get the string representation of the entity kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Role => "role",
            EntityKind::Permission => "permission",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access-control error types.
#[derive(Debug, Error)]
pub enum RbacError {
    /// Malformed input (empty names, bad codes, duplicate codes in one batch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// One or more referenced entities do not exist
    #[error("{kind} not found: {}", ids.join(", "))]
    NotFound {
        /// Kind of the missing entity
        kind: EntityKind,
        /// Identifiers (or permission codes) that could not be resolved
        ids: Vec<String>,
    },

    /// A permission declaration went backwards in version
    #[error("Version {requested} of {app_id} is older than last declared version {latest}")]
    VersionOrder {
        /// Application whose catalog was being declared
        app_id: String,
        /// Most recently reconciled version
        latest: String,
        /// Version that was rejected
        requested: String,
    },

    /// Concurrent reconciliation collision that retries could not resolve
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Fatal persistence failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for access-control operations.
pub type RbacResult<T> = Result<T, RbacError>;

impl RbacError {
    /// Build a not-found error for a single identifier.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RbacError::NotFound {
            kind,
            ids: vec![id.into()],
        }
    }

    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, RbacError::Storage(_))
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RbacError::Conflict(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RbacError::Validation(_) => 400,
            RbacError::NotFound { .. } => 404,
            RbacError::VersionOrder { .. } | RbacError::Conflict(_) => 409,
            RbacError::Storage(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RbacError::Validation(_) => "VALIDATION_ERROR",
            RbacError::NotFound { .. } => "NOT_FOUND",
            RbacError::VersionOrder { .. } => "VERSION_ORDER_ERROR",
            RbacError::Conflict(_) => "CONFLICT",
            RbacError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
