//! # Reconciliation
//!
//! Diffs a declared permission batch against an application's current
//! catalog. The diff is a pure function of the previous catalog, the last
//! declared version and the incoming batch; persisting the resulting plan is
//! the permission registry's job.
//!
//! ```text
//! previous catalog + (version, batch)
//!     new code            -> added        (Active, active_version = version)
//!     active, redeclared  -> updated / unchanged
//!     deprecated, back    -> reactivated  (Active again, grants keep working)
//!     active, omitted     -> deprecated   (Deprecated { since: version })
//!     deprecated, omitted -> untouched    (keeps its original marker)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::apps::AppId;
use crate::error::{RbacError, RbacResult};
use crate::permissions::{validate_code, Permission, PermissionDeclaration};
use crate::version::AppVersion;

/// Outcome of one declaration, returned to the declaring application.
///
/// Every list holds permission codes sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Application whose catalog was reconciled
    pub app_id: AppId,

    /// Declared version
    pub version: AppVersion,

    /// Codes declared for the first time
    pub added: Vec<String>,

    /// Previously deprecated codes declared again
    pub reactivated: Vec<String>,

    /// Active codes whose description changed
    pub updated: Vec<String>,

    /// Active codes redeclared with the same description
    pub unchanged: Vec<String>,

    /// Active codes omitted from this declaration
    pub deprecated: Vec<String>,
}

impl ReconciliationReport {
    fn empty(app_id: AppId, version: AppVersion) -> Self {
        Self {
            app_id,
            version,
            added: Vec::new(),
            reactivated: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            deprecated: Vec::new(),
        }
    }

    /// Check whether the declaration changed the catalog's active set or descriptions.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.reactivated.is_empty()
            && self.updated.is_empty()
            && self.deprecated.is_empty()
    }

    /// Number of codes in the declared batch.
    pub fn declared_count(&self) -> usize {
        self.added.len() + self.reactivated.len() + self.updated.len() + self.unchanged.len()
    }
}

/// Records to persist for one declaration, plus its report.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    /// Report for the declaring application
    pub report: ReconciliationReport,

    /// New or modified permission records, to be upserted by `(app_id, code)`
    pub changes: Vec<Permission>,
}

/// Validate a declaration batch on its own.
///
/// # Errors
///
/// [`RbacError::Validation`] if any code is malformed or appears more than once.
pub fn validate_batch(batch: &[PermissionDeclaration]) -> RbacResult<()> {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();

    for declaration in batch {
        validate_code(&declaration.code)?;
        if !seen.insert(declaration.code.as_str()) {
            duplicates.insert(declaration.code.as_str());
        }
    }

    if !duplicates.is_empty() {
        let codes: Vec<&str> = duplicates.into_iter().collect();
        return Err(RbacError::Validation(format!(
            "duplicate permission codes in declaration: {}",
            codes.join(", ")
        )));
    }
    Ok(())
}

/// Compute the reconciliation of `batch` at `version` against `previous`.
///
/// # Arguments
///
/// * `app_id` - Application owning the catalog
/// * `previous` - Every permission currently in the catalog, active or deprecated
/// * `latest` - Most recently declared version, if the application declared before
/// * `version` - Version being declared
/// * `batch` - Declared permissions
///
/// # Errors
///
/// - [`RbacError::Validation`] for malformed or duplicate codes
/// - [`RbacError::VersionOrder`] if `version` is older than `latest`
pub fn reconcile(
    app_id: &AppId,
    previous: &[Permission],
    latest: Option<&AppVersion>,
    version: &AppVersion,
    batch: &[PermissionDeclaration],
) -> RbacResult<ReconciliationPlan> {
    validate_batch(batch)?;

    if let Some(latest) = latest {
        if version < latest {
            return Err(RbacError::VersionOrder {
                app_id: app_id.to_string(),
                latest: latest.to_string(),
                requested: version.to_string(),
            });
        }
    }

    let existing: HashMap<&str, &Permission> =
        previous.iter().map(|p| (p.code.as_str(), p)).collect();
    let declared: HashSet<&str> = batch.iter().map(|d| d.code.as_str()).collect();

    let mut report = ReconciliationReport::empty(app_id.clone(), version.clone());
    let mut changes = Vec::new();

    for declaration in batch {
        let code = declaration.code.as_str();
        match existing.get(code) {
            None => {
                changes.push(Permission::new(
                    app_id.clone(),
                    code,
                    declaration.description.as_str(),
                    version.clone(),
                ));
                report.added.push(code.to_string());
            }
            Some(current) if current.is_active() => {
                let description_changed = current.description != declaration.description;
                if description_changed || current.active_version != *version {
                    let mut next = (*current).clone();
                    next.redeclare(&declaration.description, version.clone());
                    changes.push(next);
                }
                if description_changed {
                    report.updated.push(code.to_string());
                } else {
                    report.unchanged.push(code.to_string());
                }
            }
            Some(current) => {
                let mut next = (*current).clone();
                next.redeclare(&declaration.description, version.clone());
                changes.push(next);
                report.reactivated.push(code.to_string());
            }
        }
    }

    // Diff against the currently active set, not the previous version's batch.
    for permission in previous {
        if permission.is_active() && !declared.contains(permission.code.as_str()) {
            let mut next = permission.clone();
            next.deprecate(version.clone());
            changes.push(next);
            report.deprecated.push(permission.code.clone());
        }
    }

    report.added.sort();
    report.reactivated.sort();
    report.updated.sort();
    report.unchanged.sort();
    report.deprecated.sort();

    Ok(ReconciliationPlan { report, changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> AppVersion {
        AppVersion::parse(s).unwrap()
    }

    fn app() -> AppId {
        AppId::parse("junkquit").unwrap()
    }

    fn decl(codes: &[&str]) -> Vec<PermissionDeclaration> {
        codes
            .iter()
            .map(|c| PermissionDeclaration::new(*c, format!("{c} description")))
            .collect()
    }

    /// Apply a plan the way a store would: upsert by code.
    fn apply(previous: &[Permission], plan: &ReconciliationPlan) -> Vec<Permission> {
        let mut by_code: HashMap<String, Permission> = previous
            .iter()
            .map(|p| (p.code.clone(), p.clone()))
            .collect();
        for change in &plan.changes {
            by_code.insert(change.code.clone(), change.clone());
        }
        let mut all: Vec<Permission> = by_code.into_values().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    fn declare(
        previous: &[Permission],
        latest: Option<&str>,
        version: &str,
        codes: &[&str],
    ) -> (Vec<Permission>, ReconciliationReport) {
        let latest = latest.map(v);
        let plan = reconcile(&app(), previous, latest.as_ref(), &v(version), &decl(codes)).unwrap();
        (apply(previous, &plan), plan.report)
    }

    #[test]
    fn test_first_declaration_adds_everything() {
        let (catalog, report) = declare(&[], None, "1.0.0", &["users:contact", "recipes:read"]);
        assert_eq!(report.added, vec!["recipes:read", "users:contact"]);
        assert!(report.deprecated.is_empty());
        assert!(catalog.iter().all(|p| p.is_active() && p.active_version == v("1.0.0")));
    }

    #[test]
    fn test_omitted_codes_are_deprecated() {
        let (catalog, _) = declare(&[], None, "1.0.0", &["recipes:read", "users:contact"]);
        let (catalog, report) = declare(&catalog, Some("1.0.0"), "1.1.0", &["recipes:read"]);

        assert_eq!(report.deprecated, vec!["users:contact"]);
        assert_eq!(report.unchanged, vec!["recipes:read"]);
        let contact = catalog.iter().find(|p| p.code == "users:contact").unwrap();
        assert_eq!(contact.deprecated_since(), Some(&v("1.1.0")));
        let read = catalog.iter().find(|p| p.code == "recipes:read").unwrap();
        assert_eq!(read.active_version, v("1.1.0"));
    }

    #[test]
    fn test_deprecation_marker_is_not_moved() {
        let (catalog, _) = declare(&[], None, "1", &["a", "b"]);
        let (catalog, _) = declare(&catalog, Some("1"), "2", &["a"]);
        let (catalog, report) = declare(&catalog, Some("2"), "3", &["a"]);

        assert!(report.deprecated.is_empty());
        let b = catalog.iter().find(|p| p.code == "b").unwrap();
        assert_eq!(b.deprecated_since(), Some(&v("2")));
    }

    #[test]
    fn test_reactivation_keeps_identity() {
        let (catalog, _) = declare(&[], None, "1", &["c"]);
        let original_id = catalog[0].id;
        let (catalog, _) = declare(&catalog, Some("1"), "2", &[]);
        assert!(catalog[0].is_deprecated());

        let (catalog, report) = declare(&catalog, Some("2"), "3", &["c"]);
        assert_eq!(report.reactivated, vec!["c"]);
        assert!(catalog[0].is_active());
        assert_eq!(catalog[0].id, original_id);
        assert_eq!(catalog[0].active_version, v("3"));
    }

    #[test]
    fn test_description_change_is_reported() {
        let (catalog, _) = declare(&[], None, "1", &["a"]);
        let batch = vec![PermissionDeclaration::new("a", "new wording")];
        let plan = reconcile(&app(), &catalog, Some(&v("1")), &v("1.0.1"), &batch).unwrap();
        assert_eq!(plan.report.updated, vec!["a"]);
        assert_eq!(plan.changes[0].description, "new wording");
    }

    #[test]
    fn test_same_version_redeclaration_is_noop() {
        let (catalog, _) = declare(&[], None, "1", &["a"]);
        let plan = reconcile(&app(), &catalog, Some(&v("1")), &v("1.0"), &decl(&["a"])).unwrap();
        assert!(plan.report.is_noop());
        assert!(plan.changes.is_empty());
        assert_eq!(plan.report.declared_count(), 1);
    }

    #[test]
    fn test_empty_batch_deprecates_active_catalog() {
        let (catalog, _) = declare(&[], None, "1", &["a", "b"]);
        let (catalog, report) = declare(&catalog, Some("1"), "2", &[]);
        assert_eq!(report.deprecated, vec!["a", "b"]);
        assert!(catalog.iter().all(Permission::is_deprecated));
    }

    #[test]
    fn test_version_regression_is_rejected() {
        let err = reconcile(&app(), &[], Some(&v("1.1.0")), &v("1.0.9"), &[]).unwrap_err();
        assert!(matches!(err, RbacError::VersionOrder { .. }));
    }

    #[test]
    fn test_duplicate_codes_are_rejected() {
        let err = reconcile(&app(), &[], None, &v("1"), &decl(&["a", "b", "a"])).unwrap_err();
        match err {
            RbacError::Validation(msg) => assert!(msg.contains("a")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: declaring S1 at v1 then S2 at v2 deprecates exactly S1 \ S2 at v2.
        #[test]
        fn deprecates_exactly_the_set_difference(
            s1 in prop::collection::btree_set("[a-d]{1,2}:(read|write)", 0..8),
            s2 in prop::collection::btree_set("[a-d]{1,2}:(read|write)", 0..8),
        ) {
            let s1_codes: Vec<&str> = s1.iter().map(String::as_str).collect();
            let s2_codes: Vec<&str> = s2.iter().map(String::as_str).collect();

            let (catalog, _) = declare(&[], None, "1.0.0", &s1_codes);
            let (catalog, report) = declare(&catalog, Some("1.0.0"), "2.0.0", &s2_codes);

            let expected: Vec<String> = s1.difference(&s2).cloned().collect();
            prop_assert_eq!(&report.deprecated, &expected);

            let v2 = v("2.0.0");

            for permission in &catalog {
                if expected.contains(&permission.code) {
                    prop_assert_eq!(permission.deprecated_since(), Some(&v2));
                } else {
                    prop_assert!(permission.is_active());
                }
            }
        }
    }
}
