//! Access-token claims issued by the identity provider
//!
//! This module defines the payload shape every Relay client application
//! receives after the identity provider has verified a credential. Besides
//! the standard JWT claims it carries the role identifiers the provider
//! believes apply to the user, globally and per application.

use chrono::{DateTime, Duration, Utc};
use platform_rbac::DecodedToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Verified access-token payload.
///
/// Role identifiers are untrusted hints. They become a [`DecodedToken`] for
/// the authorization resolver, which checks each one against the role
/// registry.
///
/// # Example
///
/// ```rust
/// use platform_auth::claims::AccessClaims;
/// use chrono::Duration;
///
/// let claims = AccessClaims::new("user-1", Duration::hours(1))
///     .with_global_role("018f0000-0000-7000-8000-000000000001")
///     .with_app_role("junkquit", "018f0000-0000-7000-8000-000000000002");
///
/// assert!(claims.validate_times().is_ok());
/// let token = claims.into_decoded_token().unwrap();
/// assert_eq!(token.subject, "user-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    // Standard JWT claims (RFC 7519)
    /// Subject (user ID)
    pub sub: String,

    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Audience (applications the token was issued for)
    #[serde(default)]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// JWT ID (unique identifier for this token)
    #[serde(default)]
    pub jti: String,

    /// User email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Role ids that apply to every application
    #[serde(default)]
    pub global_roles: Vec<String>,

    /// Role ids per application id
    #[serde(default)]
    pub app_roles: HashMap<String, Vec<String>>,

    /// Custom claims for extensibility
    #[serde(default, flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl AccessClaims {
    /// Create claims for a subject, valid from now for `duration`.
    pub fn new(subject: impl Into<String>, duration: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: subject.into(),
            iss: "relay-platform".to_string(),
            aud: Vec::new(),
            exp: (now + duration).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            jti: Uuid::now_v7().to_string(),
            email: None,
            global_roles: Vec::new(),
            app_roles: HashMap::new(),
            custom: HashMap::new(),
        }
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Validate `exp` and `nbf` against the current time.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExpired`] once `exp` has passed
    /// - [`AuthError::TokenNotYetValid`] while `nbf` is in the future
    pub fn validate_times(&self) -> AuthResult<()> {
        self.validate_times_at(Utc::now())
    }

    fn validate_times_at(&self, now: DateTime<Utc>) -> AuthResult<()> {
        if self.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }
        if let Some(nbf) = self.nbf {
            if now.timestamp() < nbf {
                return Err(AuthError::TokenNotYetValid);
            }
        }
        Ok(())
    }

    /// Convert the role claims into the resolver's token view.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingClaim`] when the subject is blank.
    pub fn into_decoded_token(self) -> AuthResult<DecodedToken> {
        if self.sub.trim().is_empty() {
            return Err(AuthError::MissingClaim("sub".to_string()));
        }
        Ok(DecodedToken {
            subject: self.sub,
            global_roles: self.global_roles,
            app_roles: self.app_roles,
        })
    }

    /// Add a global role id.
    pub fn with_global_role(mut self, role_id: impl Into<String>) -> Self {
        self.global_roles.push(role_id.into());
        self
    }

    /// Add a role id for one application.
    pub fn with_app_role(mut self, app_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        self.app_roles
            .entry(app_id.into())
            .or_default()
            .push(role_id.into());
        self
    }

    /// Set the not-before time.
    pub fn with_not_before(mut self, nbf: DateTime<Utc>) -> Self {
        self.nbf = Some(nbf.timestamp());
        self
    }
}
