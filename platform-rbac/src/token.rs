//! Decoded identity-provider tokens.
//!
//! A [`DecodedToken`] is the already verified payload of a user's access
//! token. The role identifiers it carries are hints: the resolver intersects
//! them with the role registry and never trusts a role it does not know.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::apps::AppId;
use crate::roles::RoleId;

/// Role claims of an authenticated user.
///
/// # Example
///
/// ```
/// use platform_rbac::apps::AppId;
/// use platform_rbac::roles::RoleId;
/// use platform_rbac::token::DecodedToken;
///
/// let admin = RoleId::new();
/// let token = DecodedToken::new("user-1")
///     .with_global_role(admin.to_string())
///     .with_app_role("junkquit", "not-a-role-id");
///
/// let junkquit = AppId::parse("junkquit").unwrap();
/// assert_eq!(token.candidate_roles(&junkquit), vec![admin]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedToken {
    /// Subject (user id)
    pub subject: String,

    /// Role ids that apply to every application
    #[serde(default)]
    pub global_roles: Vec<String>,

    /// Role ids keyed by application id
    #[serde(default)]
    pub app_roles: HashMap<String, Vec<String>>,
}

impl DecodedToken {
    /// Create a token without roles.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
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

    /// Roles that may authorize a request to `app_id`.
    ///
    /// Global roles plus the roles listed under `app_id`, parsed, sorted and
    /// deduplicated. Malformed identifiers are dropped.
    pub fn candidate_roles(&self, app_id: &AppId) -> Vec<RoleId> {
        let scoped = self
            .app_roles
            .get(app_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut roles: Vec<RoleId> = self
            .global_roles
            .iter()
            .chain(scoped)
            .filter_map(|raw| RoleId::parse(raw))
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// Check whether the token names any role at all.
    pub fn has_roles(&self) -> bool {
        !self.global_roles.is_empty() || self.app_roles.values().any(|roles| !roles.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> AppId {
        AppId::parse(id).unwrap()
    }

    #[test]
    fn test_candidates_are_scoped_to_application() {
        let (global, junk, other) = (RoleId::new(), RoleId::new(), RoleId::new());
        let token = DecodedToken::new("u1")
            .with_global_role(global.to_string())
            .with_app_role("junkquit", junk.to_string())
            .with_app_role("recipes", other.to_string());

        let mut expected = vec![global, junk];
        expected.sort();
        assert_eq!(token.candidate_roles(&app("junkquit")), expected);
        assert_eq!(token.candidate_roles(&app("unknown")), vec![global]);
    }

    #[test]
    fn test_duplicates_and_garbage_are_dropped() {
        let role = RoleId::new();
        let token = DecodedToken::new("u1")
            .with_global_role(role.to_string())
            .with_global_role("")
            .with_app_role("junkquit", role.to_string())
            .with_app_role("junkquit", "admin");

        assert_eq!(token.candidate_roles(&app("junkquit")), vec![role]);
    }

    #[test]
    fn test_missing_claims_deserialize_empty() {
        let token: DecodedToken = serde_json::from_str(r#"{"subject":"u1"}"#).unwrap();
        assert!(!token.has_roles());
        assert!(token.candidate_roles(&app("junkquit")).is_empty());
    }
}
