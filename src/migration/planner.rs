//! Migration planning
//!
//! Given the version an installation is on and the version it must reach,
//! [`MigrationPlanner::plan`] assembles the SQL an operator runs by hand. The
//! planner never touches the database.

use crate::migration::catalog::MigrationCatalog;
use crate::migration::checksum::calculate_checksum;
use crate::migration::script::{split_apply_section, ScriptSource};
use crate::migration::VersionGateError;
use crate::version;
use serde::{Deserialize, Serialize};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Message returned when the database is already at or past the target
pub const NO_MIGRATIONS_MESSAGE: &str = "No migrations needed";

/// Placeholder verification SQL when no pending version mandates a check
pub const NO_VERIFICATION_PLACEHOLDER: &str =
    "-- No verification scripts required for these migrations";

const BANNER_RULE: &str = "-- ============================================================";

/// Ordered steps shown to the operator alongside a non-empty plan
pub const OPERATOR_INSTRUCTIONS: [&str; 3] = [
    "Apply the combined SQL manually against the database (for example in the SQL editor), in the order given",
    "Run the verification SQL and confirm every check returns true",
    "Return to the application and confirm the migration so each version is verified and recorded",
];

/// One pending migration as listed in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMigration {
    pub version: String,
    pub file: String,
    pub description: String,
    pub estimated_time: String,
    /// SHA-256 of the full script file
    pub checksum: String,
}

/// Everything an operator needs to move the schema from one version to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub message: String,
    pub from: String,
    pub to: String,
    pub versions: Vec<String>,
    pub migrations: Vec<PlannedMigration>,
    #[serde(rename = "combinedSQL")]
    pub combined_sql: String,
    #[serde(rename = "verificationSQL")]
    pub verification_sql: String,
    pub instructions: Vec<String>,
}

impl MigrationPlan {
    fn empty(from: &str, to: &str) -> Self {
        Self {
            message: NO_MIGRATIONS_MESSAGE.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            versions: Vec::new(),
            migrations: Vec::new(),
            combined_sql: String::new(),
            verification_sql: String::new(),
            instructions: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Computes migration plans from a catalog and a script source
pub struct MigrationPlanner<'a> {
    catalog: &'a MigrationCatalog,
    scripts: &'a dyn ScriptSource,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(catalog: &'a MigrationCatalog, scripts: &'a dyn ScriptSource) -> Self {
        Self { catalog, scripts }
    }

    /// Plan the migrations from `from` (exclusive) to `to` (inclusive)
    ///
    /// # Errors
    ///
    /// - `Validation` when either bound is blank
    /// - `CatalogInconsistency` when a pending version has no metadata
    /// - `ScriptLoadFailure` when a pending script cannot be read
    ///
    /// Any error aborts the whole plan.
    pub fn plan(&self, from: &str, to: &str) -> Result<MigrationPlan, VersionGateError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::plan_span(from, to).entered();

        let result = self.build_plan(from.trim(), to.trim());

        #[cfg(feature = "metrics")]
        METRICS.record_plan(match &result {
            Ok(plan) if plan.is_empty() => "empty",
            Ok(_) => "ok",
            Err(_) => "error",
        });

        match &result {
            Ok(plan) => log::info!(
                "planned {} migration(s) from {} to {}",
                plan.versions.len(),
                plan.from,
                plan.to
            ),
            Err(e) => log::warn!("migration plan from {} to {} failed: {}", from, to, e),
        }
        result
    }

    fn build_plan(&self, from: &str, to: &str) -> Result<MigrationPlan, VersionGateError> {
        if from.is_empty() || to.is_empty() {
            return Err(VersionGateError::Validation(
                "Missing required parameters: from and to".to_string(),
            ));
        }

        let pending = version::versions_between(&self.catalog.version_order, from, to);
        if pending.is_empty() {
            return Ok(MigrationPlan::empty(from, to));
        }

        let total = pending.len();
        let mut migrations = Vec::with_capacity(total);
        let mut sections = Vec::with_capacity(total);
        let mut checks = Vec::new();

        for (index, version) in pending.iter().enumerate() {
            let meta = self
                .catalog
                .metadata(version)
                .ok_or_else(|| VersionGateError::CatalogInconsistency {
                    version: version.clone(),
                })?;

            let script = self.scripts.load(&meta.migration_file).map_err(|e| {
                VersionGateError::ScriptLoadFailure {
                    version: version.clone(),
                    file: meta.migration_file.clone(),
                    message: e.to_string(),
                }
            })?;

            sections.push(format!(
                "{rule}\n-- Migration {i}/{n}: {version}\n-- File: {file}\n-- Description: {desc}\n-- Estimated time: {time}\n{rule}\n\n{sql}\n\n-- Migration {version} complete",
                rule = BANNER_RULE,
                i = index + 1,
                n = total,
                version = version,
                file = meta.migration_file,
                desc = meta.description,
                time = meta.estimated_time,
                sql = split_apply_section(&script),
            ));

            if let Some(check) = meta.required_verification_script() {
                checks.push(format!(
                    "-- Verify {}: {}\n{}",
                    version, meta.description, check
                ));
            }

            migrations.push(PlannedMigration {
                version: version.clone(),
                file: meta.migration_file.clone(),
                description: meta.description.clone(),
                estimated_time: meta.estimated_time.clone(),
                checksum: calculate_checksum(&script),
            });
        }

        let verification_sql = if checks.is_empty() {
            NO_VERIFICATION_PLACEHOLDER.to_string()
        } else {
            format!(
                "{rule}\n-- Verification queries ({count})\n-- Run after applying the migrations; each must return verification_passed = true\n{rule}\n\n{body}",
                rule = BANNER_RULE,
                count = checks.len(),
                body = checks.join("\n\n"),
            )
        };

        Ok(MigrationPlan {
            message: format!("{} migration(s) required from {} to {}", total, from, to),
            from: from.to_string(),
            to: to.to_string(),
            versions: pending,
            migrations,
            combined_sql: sections.join("\n\n"),
            verification_sql,
            instructions: OPERATOR_INSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
        })
    }
}
