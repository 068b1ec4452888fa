//! # Application Versions
//!
//! Release identifiers under which applications declare their permission
//! catalogs. Versions are dot-separated numeric components compared
//! numerically, so `1.10.0` is newer than `1.9.3` and `1.1` equals `1.1.0`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::error::{RbacError, RbacResult};

/// A release version of a declaring application.
///
/// # Example
///
/// ```
/// use platform_rbac::version::AppVersion;
///
/// let older = AppVersion::parse("1.9.3").unwrap();
/// let newer = AppVersion::parse("v1.10").unwrap();
/// assert!(older < newer);
/// assert_eq!(newer.to_string(), "v1.10");
/// assert_eq!(AppVersion::parse("1.1").unwrap(), AppVersion::parse("1.1.0").unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct AppVersion {
    /// Version as the application wrote it.
    raw: String,
    /// Numeric components with trailing zeros removed.
    components: Vec<u64>,
}

impl AppVersion {
    /// Parse a version string.
    ///
    /// Accepts an optional leading `v` followed by one or more dot-separated
    /// unsigned integers.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Validation`] for empty or non-numeric versions.
    pub fn parse(s: &str) -> RbacResult<Self> {
        let raw = s.trim();
        let digits = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);

        if digits.is_empty() {
            return Err(RbacError::Validation(format!("invalid version '{s}'")));
        }

        let mut components = digits
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RbacError::Validation(format!("invalid version '{s}'")))?;

        while components.len() > 1 && components.last() == Some(&0) {
            components.pop();
        }

        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }

    /// Get the version as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for AppVersion {}

impl Hash for AppVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing components compare as zero; trailing zeros were stripped on parse.
        self.components.cmp(&other.components)
    }
}

impl std::fmt::Display for AppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for AppVersion {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AppVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
