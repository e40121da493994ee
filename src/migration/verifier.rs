//! Post-apply verification
//!
//! After an operator applies a plan by hand, [`MigrationVerifier::verify`]
//! runs each version's verification script over one privileged session and
//! records the versions that pass. Each version is handled on its own: a
//! failure is reported in that version's result and the rest still run.

use crate::connection::{Connector, Session};
use crate::executor::SqlExecutor;
use crate::migration::catalog::{MigrationCatalog, MigrationMetadata};
use crate::migration::history;
use crate::migration::VersionGateError;
use crate::row::ResultRow;
use crate::transaction::Transaction;
use crate::version;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Outcome for one version in a verify call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub version: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_verification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_inserted: Option<bool>,
}

impl VerificationResult {
    fn manual(version: &str) -> Self {
        Self {
            version: version.to_string(),
            success: true,
            manual_verification: Some(true),
            details: None,
            error: None,
            error_kind: None,
            audit_inserted: None,
        }
    }

    fn passed(version: &str, details: Value, audit_inserted: bool) -> Self {
        Self {
            version: version.to_string(),
            success: true,
            manual_verification: None,
            details: Some(details),
            error: None,
            error_kind: None,
            audit_inserted: Some(audit_inserted),
        }
    }

    fn failed(error: &VersionGateError, details: Option<Value>) -> Self {
        let version = match error {
            VersionGateError::CatalogInconsistency { version }
            | VersionGateError::VerificationExecutionFailure { version, .. }
            | VersionGateError::VerificationFailed { version }
            | VersionGateError::RecordApplicationFailure { version, .. }
            | VersionGateError::ScriptLoadFailure { version, .. } => version.clone(),
            _ => String::new(),
        };
        Self {
            version,
            success: false,
            manual_verification: None,
            details,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            audit_inserted: None,
        }
    }
}

/// Results of one verify call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub run_id: String,
    pub checked_at: String,
    pub success: bool,
    pub message: String,
    pub results: Vec<VerificationResult>,
}

impl VerificationReport {
    fn new(run_id: Uuid, checked_at: DateTime<Utc>, results: Vec<VerificationResult>) -> Self {
        let failed = results.iter().filter(|r| !r.success).count();
        let success = failed == 0;
        let message = if success {
            format!("All {} migration(s) verified successfully", results.len())
        } else {
            format!("{} of {} migration(s) failed verification", failed, results.len())
        };
        Self {
            run_id: run_id.to_string(),
            checked_at: checked_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            success,
            message,
            results,
        }
    }

    /// Results that did not pass
    pub fn failures(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Whether a JSON value counts as SQL true (`true`, `'t'` or `'true'`)
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "t" || s == "true",
        _ => false,
    }
}

/// Interpret a verification script's result rows
///
/// The first row decides. It passes when its `verification_passed` or its
/// `verified` column is true. Only with `permissive` set does a row without
/// either column pass, and then only when every value in every row is true.
/// No rows never passes.
#[must_use]
pub fn verification_passed(rows: &[ResultRow], permissive: bool) -> bool {
    let Some(first) = rows.first() else {
        return false;
    };

    let passed = first.get("verification_passed");
    let verified = first.get("verified");
    if passed.is_some() || verified.is_some() {
        return passed.is_some_and(is_truthy) || verified.is_some_and(is_truthy);
    }

    permissive && rows.iter().all(|row| !row.is_empty() && row.values().all(is_truthy))
}

/// Runs verification scripts and records passing versions
pub struct MigrationVerifier<'a> {
    catalog: &'a MigrationCatalog,
    connector: &'a dyn Connector,
}

impl<'a> MigrationVerifier<'a> {
    pub fn new(catalog: &'a MigrationCatalog, connector: &'a dyn Connector) -> Self {
        Self { catalog, connector }
    }

    /// Verify and record `versions`
    ///
    /// Versions are checked in ascending order with exact duplicates removed.
    ///
    /// # Errors
    ///
    /// - `Validation` when `versions` is empty
    /// - `Connection` when the privileged session cannot be opened
    ///
    /// Per-version failures are reported in the returned report instead.
    pub fn verify(&self, versions: &[String]) -> Result<VerificationReport, VersionGateError> {
        if versions.is_empty() {
            return Err(VersionGateError::Validation(
                "versions must be a non-empty list of version strings".to_string(),
            ));
        }
        let mut ordered: Vec<String> = versions.iter().map(|v| v.trim().to_string()).collect();
        ordered.sort_by(|a, b| version::compare(a, b));
        let mut seen = std::collections::HashSet::new();
        ordered.retain(|v| seen.insert(v.clone()));

        let run_id = Uuid::new_v4();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::verify_span(&run_id.to_string(), ordered.len()).entered();

        log::info!("[{}] verifying {} version(s): {}", run_id, ordered.len(), ordered.join(", "));

        let session = Session::open(self.connector, "verification").map_err(|e| {
            log::error!("[{}] could not open verification session: {}", run_id, e);
            VersionGateError::from(e)
        })?;

        let results: Vec<VerificationResult> = ordered
            .iter()
            .map(|version| self.verify_version(&session, version, &run_id))
            .collect();

        let report = VerificationReport::new(run_id, Utc::now(), results);
        if report.success {
            log::info!("[{}] {}", run_id, report.message);
        } else {
            log::warn!("[{}] {}", run_id, report.message);
        }
        Ok(report)
    }

    fn verify_version(
        &self,
        session: &Session,
        version: &str,
        run_id: &Uuid,
    ) -> VerificationResult {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::verify_version_span(version).entered();

        let result = match self.catalog.metadata(version) {
            None => VerificationResult::failed(
                &VersionGateError::CatalogInconsistency {
                    version: version.to_string(),
                },
                None,
            ),
            Some(meta) => match meta.required_verification_script() {
                None => {
                    log::info!("[{}] {} requires manual verification", run_id, version);
                    VerificationResult::manual(version)
                }
                Some(script) => self.run_check(session, version, meta, script, run_id),
            },
        };

        #[cfg(feature = "metrics")]
        METRICS.record_verification(match (&result.error_kind, result.manual_verification) {
            (None, Some(true)) => "manual",
            (None, _) => "passed",
            (Some(kind), _) => kind.as_str(),
        });

        result
    }

    fn run_check(
        &self,
        session: &Session,
        version: &str,
        meta: &MigrationMetadata,
        script: &str,
        run_id: &Uuid,
    ) -> VerificationResult {
        let rows = match session.query_all(script, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("[{}] verification script for {} raised: {}", run_id, version, e);
                return VerificationResult::failed(
                    &VersionGateError::VerificationExecutionFailure {
                        version: version.to_string(),
                        message: e.to_string(),
                    },
                    None,
                );
            }
        };

        let details = rows.first().map(ResultRow::to_json).unwrap_or(Value::Null);

        if !verification_passed(&rows, meta.permissive_verification) {
            log::warn!("[{}] verification for {} did not pass", run_id, version);
            return VerificationResult::failed(
                &VersionGateError::VerificationFailed {
                    version: version.to_string(),
                },
                Some(details),
            );
        }

        match record_success(session, version, meta, &details) {
            Ok(audit_inserted) => {
                log::info!(
                    "[{}] {} verified and recorded{}",
                    run_id,
                    version,
                    if audit_inserted { "" } else { " (already audited)" }
                );
                VerificationResult::passed(version, details, audit_inserted)
            }
            Err(e) => {
                log::error!("[{}] {}", run_id, e);
                VerificationResult::failed(&e, Some(details))
            }
        }
    }
}

/// Record a passed version and its audit row in one transaction
fn record_success(
    executor: &dyn SqlExecutor,
    version: &str,
    meta: &MigrationMetadata,
    details: &Value,
) -> Result<bool, VersionGateError> {
    let record_failure = |message: String| VersionGateError::RecordApplicationFailure {
        version: version.to_string(),
        message,
    };

    let tx = Transaction::begin(executor).map_err(|e| record_failure(e.to_string()))?;

    history::record_version_application(&tx, version, &meta.release_notes, &meta.description)
        .map_err(|e| record_failure(e.to_string()))?;

    let inserted = history::insert_audit_row(&tx, version, &meta.migration_file, true, details)
        .map_err(|e| record_failure(format!("audit insert failed: {}", e)))?;

    tx.commit().map_err(|e| record_failure(e.to_string()))?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_catalog, MockDatabase};
    use serde_json::json;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_verification_passed_named_columns() {
        let row = ResultRow::new().with("verification_passed", true).with("note", "x");
        assert!(verification_passed(&[row], false));

        let row = ResultRow::new().with("verified", "t");
        assert!(verification_passed(&[row], false));

        let row = ResultRow::new().with("verification_passed", false).with("verified", true);
        assert!(verification_passed(&[row], false));

        let row = ResultRow::new().with("verification_passed", false).with("verified", "f");
        assert!(!verification_passed(&[row], true));
    }

    #[test]
    fn test_verification_passed_mixed_row_uses_named_column() {
        let row = ResultRow::new()
            .with("table_count", 3)
            .with("verification_passed", "true");
        assert!(verification_passed(&[row], false));
    }

    #[test]
    fn test_all_true_row_needs_permissive_opt_in() {
        let rows = vec![ResultRow::new().with("has_table", true).with("has_index", "t")];
        assert!(!verification_passed(&rows, false));
        assert!(verification_passed(&rows, true));

        let rows = vec![ResultRow::new().with("has_table", true).with("has_index", false)];
        assert!(!verification_passed(&rows, true));
    }

    #[test]
    fn test_zero_rows_never_pass() {
        assert!(!verification_passed(&[], false));
        assert!(!verification_passed(&[], true));
    }

    #[test]
    fn test_verify_records_passing_version() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", true));
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0"]))
            .unwrap();

        assert!(report.success);
        assert_eq!(report.results[0].audit_inserted, Some(true));
        assert_eq!(db.recorded_versions(), vec!["1.1.0"]);
        assert_eq!(
            db.audit_rows(),
            vec![("1.1.0".to_string(), "1.1.0_attendance.sql".to_string())]
        );
        assert_eq!(db.control_statements(), vec!["BEGIN", "COMMIT"]);
        assert!(Uuid::parse_str(&report.run_id).is_ok());
        assert!(DateTime::parse_from_rfc3339(&report.checked_at).is_ok());
    }

    #[test]
    fn test_reverification_is_idempotent() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", true));
        let connector = db.connector();
        let verifier = MigrationVerifier::new(&catalog, &connector);

        verifier.verify(&versions(&["1.1.0"])).unwrap();
        let second = verifier.verify(&versions(&["1.1.0"])).unwrap();

        assert!(second.success);
        assert_eq!(second.results[0].audit_inserted, Some(false));
        assert_eq!(db.audit_rows().len(), 1);
    }

    #[test]
    fn test_manual_verification_skips_database() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.2.0"]))
            .unwrap();

        assert!(report.success);
        assert_eq!(report.results[0].manual_verification, Some(true));
        assert!(db.statements().is_empty());
        assert!(db.recorded_versions().is_empty());
    }

    #[test]
    fn test_failures_are_isolated_per_version() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", false));
        db.fail_check("1.3.0", "relation \"outreach\" does not exist");
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.3.0", "9.9.9", "1.2.0", "1.1.0"]))
            .unwrap();

        assert!(!report.success);
        let order: Vec<&str> = report.results.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(order, vec!["1.1.0", "1.2.0", "1.3.0", "9.9.9"]);

        assert_eq!(report.results[0].error_kind.as_deref(), Some("verification_failed"));
        assert_eq!(report.results[0].error.as_deref(), Some("verification did not pass"));
        assert_eq!(report.results[0].details, Some(json!({"verification_passed": false})));
        assert!(report.results[1].success);
        assert_eq!(report.results[2].error_kind.as_deref(), Some("verification_execution_failure"));
        assert!(report.results[2].error.as_deref().unwrap().contains("outreach"));
        assert_eq!(report.results[3].error_kind.as_deref(), Some("catalog_inconsistency"));
        assert_eq!(
            report.results[3].error.as_deref(),
            Some("migration metadata not found for version 9.9.9")
        );
        assert!(db.recorded_versions().is_empty());
        assert_eq!(db.sessions_opened(), 1);
        assert_eq!(db.sessions_released(), 1);
    }

    #[test]
    fn test_later_version_recorded_after_earlier_failure() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", false));
        db.respond_to_check(
            "1.3.0",
            ResultRow::new().with("verification_passed", true).with("outreach_rows", 4),
        );
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0", "1.3.0"]))
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.results.len(), 2);
        assert!(!report.results[0].success);
        assert!(report.results[1].success);
        assert_eq!(
            report.results[1].details,
            Some(json!({"verification_passed": true, "outreach_rows": 4}))
        );
        assert_eq!(db.recorded_versions(), vec!["1.3.0"]);
        assert_eq!(db.audit_rows().len(), 1);
    }

    #[test]
    fn test_verified_column_passes_when_verification_passed_is_false() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check(
            "1.1.0",
            ResultRow::new().with("verification_passed", false).with("verified", true),
        );
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0"]))
            .unwrap();

        assert!(report.success);
        assert_eq!(db.recorded_versions(), vec!["1.1.0"]);
    }

    #[test]
    fn test_blank_entries_get_their_own_result() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["", "1.2.0"]))
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].version, "");
        assert_eq!(report.results[0].error_kind.as_deref(), Some("catalog_inconsistency"));
        assert!(report.results[1].success);
    }

    #[test]
    fn test_duplicates_are_removed() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.2.0", "1.2.0"]))
            .unwrap();
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn test_record_failure_rolls_back_and_skips_audit() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", true));
        db.fail_record_for("1.1.0");
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0"]))
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.results[0].error_kind.as_deref(), Some("record_application_failure"));
        assert!(db.audit_rows().is_empty());
        assert_eq!(db.control_statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_audit_failure_rolls_back() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", true));
        db.fail_audit_inserts();
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0"]))
            .unwrap();

        assert_eq!(report.results[0].error_kind.as_deref(), Some("record_application_failure"));
        assert!(report.results[0].error.as_deref().unwrap().contains("audit insert failed"));
        assert_eq!(db.control_statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_empty_input_is_validation_error() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        let connector = db.connector();

        let err = MigrationVerifier::new(&catalog, &connector).verify(&[]).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(db.sessions_opened(), 0);
    }

    #[test]
    fn test_session_failure_aborts_call() {
        let catalog = sample_catalog();
        let db = MockDatabase::new();
        db.refuse_connections();
        let connector = db.connector();

        let err = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.1.0"]))
            .unwrap_err();
        assert_eq!(err.kind(), "connection_error");
    }

    #[test]
    fn test_permissive_entry_accepts_all_true_row() {
        let mut catalog = sample_catalog();
        if let Some(meta) = catalog.migrations.get_mut("1.3.0") {
            meta.permissive_verification = true;
        }
        let db = MockDatabase::new();
        db.respond_to_check(
            "1.3.0",
            ResultRow::new().with("has_table", true).with("has_rls", true),
        );
        let connector = db.connector();

        let report = MigrationVerifier::new(&catalog, &connector)
            .verify(&versions(&["1.3.0"]))
            .unwrap();
        assert!(report.success);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = VerificationReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![VerificationResult::manual("1.2.0")],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("runId").is_some());
        assert!(json.get("checkedAt").is_some());
        assert_eq!(json["results"][0]["manualVerification"], json!(true));
        assert!(json["results"][0].get("errorKind").is_none());
    }
}
