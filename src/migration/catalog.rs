//! Static migration catalog
//!
//! The catalog is produced at release time and never mutated at runtime. It
//! lists every known schema version in ascending order plus one metadata
//! record per version. Load it once and share it by reference or `Arc`.
//!
//! ```json
//! {
//!   "versionOrder": ["1.0.0", "1.1.0"],
//!   "migrations": {
//!     "1.1.0": {
//!       "migrationFile": "1.1.0_event_attendance.sql",
//!       "description": "Track event attendance",
//!       "estimatedTime": "< 1 minute",
//!       "releaseNotes": "release-notes/1.1.0.md",
//!       "requiresVerification": true,
//!       "verificationScript": "SELECT ... AS verification_passed"
//!     }
//!   }
//! }
//! ```

use crate::migration::VersionGateError;
use crate::version;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

const BUNDLED_CATALOG: &str = include_str!("../../migrations/catalog.json");

/// Metadata describing one schema version's migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMetadata {
    /// Script location, relative to the migrations directory
    pub migration_file: String,
    pub description: String,
    pub estimated_time: String,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub requires_verification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_script: Option<String>,
    /// Opt-in to the "every returned value is true" fallback check
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub permissive_verification: bool,
}

impl MigrationMetadata {
    /// The verification script, when this version mandates one
    ///
    /// `None` when verification is not required or the script is blank.
    #[must_use]
    pub fn required_verification_script(&self) -> Option<&str> {
        if !self.requires_verification {
            return None;
        }
        self.verification_script
            .as_deref()
            .map(str::trim)
            .filter(|script| !script.is_empty())
    }
}

/// Every known schema version and its migration metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCatalog {
    pub version_order: Vec<String>,
    pub migrations: HashMap<String, MigrationMetadata>,
}

impl MigrationCatalog {
    /// Build a catalog from parts
    pub fn new(version_order: Vec<String>, migrations: HashMap<String, MigrationMetadata>) -> Self {
        Self {
            version_order,
            migrations,
        }
    }

    /// Parse a catalog from JSON text
    ///
    /// # Errors
    ///
    /// Returns `VersionGateError::Catalog` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, VersionGateError> {
        serde_json::from_str(json).map_err(|e| VersionGateError::Catalog(e.to_string()))
    }

    /// Load a catalog from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `VersionGateError::Catalog` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, VersionGateError> {
        let content = fs::read_to_string(path)
            .map_err(|e| VersionGateError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
            .map_err(|e| VersionGateError::Catalog(format!("{}: {}", path.display(), e)))
    }

    /// The catalog embedded into this build from `migrations/catalog.json`
    ///
    /// # Errors
    ///
    /// Returns `VersionGateError::Catalog` if the embedded JSON is malformed.
    pub fn bundled() -> Result<Self, VersionGateError> {
        Self::from_json_str(BUNDLED_CATALOG)
    }

    /// Metadata for `version`, matched by exact string
    #[must_use]
    pub fn metadata(&self, version: &str) -> Option<&MigrationMetadata> {
        self.migrations.get(version)
    }

    /// The newest version in `versionOrder`
    #[must_use]
    pub fn latest_version(&self) -> Option<String> {
        version::latest(&self.version_order)
    }

    /// Check the catalog invariants
    ///
    /// Planning does not call this, so an inconsistency only surfaces there
    /// when a broken version is actually pending. This check is for release
    /// tooling and the `validate` command.
    ///
    /// # Errors
    ///
    /// Returns `VersionGateError::Validation` if the version-format pattern
    /// cannot be compiled.
    pub fn validate(&self) -> Result<Vec<CatalogIssue>, VersionGateError> {
        let strict_format = Regex::new(r"^\d+\.\d+\.\d+$")
            .map_err(|e| VersionGateError::Validation(format!("Invalid regex: {}", e)))?;

        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (index, version) in self.version_order.iter().enumerate() {
            if !seen.insert(version.as_str()) {
                issues.push(CatalogIssue::error(version, "listed more than once in versionOrder"));
            }

            if let Some(previous) = index.checked_sub(1).map(|i| &self.version_order[i]) {
                if !version::is_greater(version, previous) {
                    issues.push(CatalogIssue::error(
                        version,
                        format!("not greater than the preceding version {}", previous),
                    ));
                }
            }

            if !strict_format.is_match(version) {
                issues.push(CatalogIssue::warning(
                    version,
                    "not in strict major.minor.patch form; missing or non-numeric parts compare as 0",
                ));
            }

            match self.migrations.get(version) {
                None => issues.push(CatalogIssue::error(version, "no migration metadata")),
                Some(meta) => issues.extend(Self::metadata_issues(version, meta)),
            }
        }

        let mut unlisted: Vec<&String> = self
            .migrations
            .keys()
            .filter(|version| !seen.contains(version.as_str()))
            .collect();
        unlisted.sort_by(|a, b| version::compare(a, b));
        for version in unlisted {
            issues.push(CatalogIssue::warning(
                version,
                "has metadata but is not listed in versionOrder",
            ));
        }

        Ok(issues)
    }

    fn metadata_issues(version: &str, meta: &MigrationMetadata) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        if meta.migration_file.trim().is_empty() {
            issues.push(CatalogIssue::error(version, "migrationFile is empty"));
        }
        if meta.requires_verification && meta.required_verification_script().is_none() {
            issues.push(CatalogIssue::warning(
                version,
                "requiresVerification is set but no verificationScript is present; it will be treated as manually verified",
            ));
        }
        if meta.permissive_verification {
            issues.push(CatalogIssue::warning(
                version,
                "permissiveVerification is enabled; name the result column verification_passed instead",
            ));
        }
        issues
    }
}

/// How serious a catalog finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// One finding from [`MigrationCatalog::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogIssue {
    pub version: String,
    pub severity: IssueSeverity,
    pub message: String,
}

impl CatalogIssue {
    fn error(version: &str, message: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    fn warning(version: &str, message: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
        };
        write!(f, "{}: {} {}", label, self.version, self.message)
    }
}
