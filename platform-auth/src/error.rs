//! Error types for authenticated authorization
//!
//! Covers failures to turn a credential into trusted claims, plus the
//! access-control errors surfaced by the engine behind it.

use platform_rbac::RbacError;
use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token `nbf` lies in the future
    #[error("Token is not yet valid")]
    TokenNotYetValid,

    /// Token is unknown, malformed or failed verification
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token is missing required claims
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// Access-control engine error
    #[error(transparent)]
    Rbac(#[from] RbacError),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Rejected credentials are expected and are not server errors.
    pub fn is_server_error(&self) -> bool {
        match self {
            AuthError::Rbac(e) => e.is_server_error(),
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::InvalidToken(_)
            | AuthError::MissingClaim(_) => 401,

            AuthError::Rbac(e) => e.status_code(),
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::MissingClaim(_) => "MISSING_CLAIM",
            AuthError::Rbac(e) => e.error_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::TokenExpired.status_code(), 401);
        assert_eq!(AuthError::TokenNotYetValid.error_code(), "TOKEN_NOT_YET_VALID");

        let wrapped: AuthError = RbacError::Validation("blank app id".into()).into();
        assert_eq!(wrapped.status_code(), 400);
        assert!(!wrapped.is_server_error());

        let storage: AuthError = RbacError::Storage("down".into()).into();
        assert!(storage.is_server_error());
        assert_eq!(storage.to_string(), "Storage error: down");
    }
}
