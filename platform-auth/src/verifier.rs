//! Credential verification and request authorization
//!
//! The identity provider sits behind [`TokenVerifier`]: it turns a raw bearer
//! credential into [`AccessClaims`] or rejects it. [`RequestAuthorizer`]
//! chains verification, time-claim checks and the RBAC resolver into the
//! single check a protected endpoint performs.

use async_trait::async_trait;
use platform_rbac::{AuthorizationResolver, Permission};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::claims::AccessClaims;
use crate::error::{AuthError, AuthResult};

/// Port to the identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw credential and return its claims.
    ///
    /// Implementations check signatures and issuers; time claims are checked
    /// by the caller.
    async fn verify(&self, credential: &str) -> AuthResult<AccessClaims>;
}

/// Verifier backed by a fixed credential -> claims table.
///
/// Intended for tests and local development.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: RwLock<HashMap<String, AccessClaims>>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `credential` as a token carrying `claims`.
    pub async fn insert(&self, credential: impl Into<String>, claims: AccessClaims) {
        self.tokens.write().await.insert(credential.into(), claims);
    }

    /// Stop accepting `credential`.
    pub async fn revoke(&self, credential: &str) -> bool {
        self.tokens.write().await.remove(credential).is_some()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> AuthResult<AccessClaims> {
        self.tokens
            .read()
            .await
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown credential".to_string()))
    }
}

/// Authorizes requests carrying a bearer credential.
#[derive(Clone)]
pub struct RequestAuthorizer {
    verifier: Arc<dyn TokenVerifier>,
    resolver: AuthorizationResolver,
}

impl RequestAuthorizer {
    /// Create an authorizer from a verifier and a resolver.
    pub fn new(verifier: Arc<dyn TokenVerifier>, resolver: AuthorizationResolver) -> Self {
        Self { verifier, resolver }
    }

    /// Check whether the credential's holder has `permission_code` in `app_id`.
    ///
    /// # Returns
    ///
    /// `Ok(false)` for every denial the resolver produces
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] or [`AuthError::MissingClaim`] for a rejected credential
    /// - [`AuthError::TokenExpired`] / [`AuthError::TokenNotYetValid`] outside the validity window
    /// - [`AuthError::Rbac`] for a blank application id
    #[instrument(skip(self, credential))]
    pub async fn authorize(
        &self,
        credential: &str,
        app_id: &str,
        permission_code: &str,
    ) -> AuthResult<bool> {
        let claims = self.claims(credential).await?;
        let token = claims.into_decoded_token()?;
        let allowed = self
            .resolver
            .authorize(&token, app_id, permission_code)
            .await?;
        debug!(subject = %token.subject, allowed, "Request authorized");
        Ok(allowed)
    }

    /// List the permissions of `app_id` held by the credential's holder.
    #[instrument(skip(self, credential))]
    pub async fn effective_permissions(
        &self,
        credential: &str,
        app_id: &str,
    ) -> AuthResult<Vec<Permission>> {
        let claims = self.claims(credential).await?;
        let token = claims.into_decoded_token()?;
        Ok(self.resolver.effective_permissions(&token, app_id).await?)
    }

    async fn claims(&self, credential: &str) -> AuthResult<AccessClaims> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::InvalidToken("empty credential".to_string()));
        }

        let claims = self.verifier.verify(credential).await.map_err(|e| {
            warn!(error = %e, "Credential rejected");
            e
        })?;
        if let Err(e) = claims.validate_times() {
            warn!(subject = %claims.sub, error = %e, "Token outside validity window");
            return Err(e);
        }
        Ok(claims)
    }
}
