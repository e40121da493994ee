//! Schema version state owned by the database
//!
//! The database keeps the authoritative record of which versions have been
//! applied. Three objects make up the contract:
//!
//! - `record_version_application(version, notes_path, version_description)`
//!   marks a version as applied (privileged procedure)
//! - `get_current_schema_version()` returns the current version as text, or
//!   `NULL` when nothing is recorded
//! - `migration_history` is the append-only audit table, unique per
//!   `(version, migration_name)`

use crate::executor::{query_text, DbError, SqlExecutor};
use crate::row::ResultRow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const RECORD_VERSION_SQL: &str = "SELECT record_version_application($1, $2, $3)";

pub const INSERT_AUDIT_SQL: &str = "INSERT INTO migration_history \
     (version, migration_name, verification_passed, verification_details) \
     VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING";

pub const CURRENT_VERSION_SQL: &str = "SELECT get_current_schema_version()";

const LIST_HISTORY_SQL: &str = "SELECT version, migration_name, verification_passed, \
     verification_details, applied_at::text AS applied_at FROM migration_history";

/// Version reported when the database has no recorded version
pub const BASELINE_VERSION: &str = "0.0.0";

/// Mark `version` as applied through the privileged procedure
///
/// # Errors
///
/// Returns `DbError` when the procedure raises.
pub fn record_version_application(
    executor: &dyn SqlExecutor,
    version: &str,
    notes_path: &str,
    description: &str,
) -> Result<(), DbError> {
    let version = version.to_string();
    let notes_path = notes_path.to_string();
    let description = description.to_string();
    executor.execute(RECORD_VERSION_SQL, &[&version, &notes_path, &description])?;
    Ok(())
}

/// Append a verification audit row
///
/// Returns `false` when a row for `(version, migration_name)` already
/// exists; the insert is then a no-op.
///
/// # Errors
///
/// Returns `DbError` when the insert fails for any other reason.
pub fn insert_audit_row(
    executor: &dyn SqlExecutor,
    version: &str,
    migration_name: &str,
    verification_passed: bool,
    details: &Value,
) -> Result<bool, DbError> {
    let version = version.to_string();
    let migration_name = migration_name.to_string();
    let affected = executor.execute(
        INSERT_AUDIT_SQL,
        &[&version, &migration_name, &verification_passed, details],
    )?;
    Ok(affected > 0)
}

/// The database's current schema version, `"0.0.0"` when none is recorded
///
/// # Errors
///
/// Returns `DbError` when the function call fails.
pub fn current_schema_version(executor: &dyn SqlExecutor) -> Result<String, DbError> {
    let version = query_text(executor, CURRENT_VERSION_SQL, &[])?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    Ok(version.unwrap_or_else(|| BASELINE_VERSION.to_string()))
}

/// One row of the `migration_history` audit table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationHistoryRecord {
    pub version: String,
    pub migration_name: String,
    pub verification_passed: bool,
    pub verification_details: Value,
    pub applied_at: DateTime<Utc>,
}

impl MigrationHistoryRecord {
    /// Build a record from a `migration_history` row
    ///
    /// # Errors
    ///
    /// Returns `DbError::ParseError` if a column is missing or the timestamp
    /// is in an unrecognized format.
    pub fn from_row(row: &ResultRow) -> Result<Self, DbError> {
        let text = |column: &str| -> Result<String, DbError> {
            match row.get(column) {
                Some(Value::String(s)) => Ok(s.clone()),
                other => Err(DbError::ParseError(format!(
                    "column '{column}' is not text: {other:?}"
                ))),
            }
        };

        let verification_passed = match row.get("verification_passed") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "t" || s == "true",
            _ => false,
        };

        Ok(Self {
            version: text("version")?,
            migration_name: text("migration_name")?,
            verification_passed,
            verification_details: row.get("verification_details").cloned().unwrap_or(Value::Null),
            applied_at: parse_timestamp(&text("applied_at")?)?,
        })
    }
}

/// Parse a timestamp as rendered by `timestamptz::text` or `timestamp::text`
///
/// # Errors
///
/// Returns `DbError::ParseError` when no known format matches.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    // timestamptz::text renders offsets as "+00" or "+05:30"
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(DbError::ParseError(format!(
        "Failed to parse timestamp '{value}': unrecognized format"
    )))
}

/// List audit rows ordered by application time, optionally for one version
///
/// # Errors
///
/// Returns `DbError` when the query fails or a row cannot be parsed.
pub fn list_history(
    executor: &dyn SqlExecutor,
    version: Option<&str>,
) -> Result<Vec<MigrationHistoryRecord>, DbError> {
    let rows = match version {
        Some(version) => {
            let version = version.to_string();
            executor.query_all(
                &format!("{LIST_HISTORY_SQL} WHERE version = $1 ORDER BY applied_at, version"),
                &[&version],
            )?
        }
        None => {
            executor.query_all(&format!("{LIST_HISTORY_SQL} ORDER BY applied_at, version"), &[])?
        }
    };

    rows.iter().map(MigrationHistoryRecord::from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockDatabase;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_current_version_defaults_to_baseline() {
        let db = MockDatabase::new();
        db.set_current_version(None);
        assert_eq!(current_schema_version(&db.executor()).unwrap(), BASELINE_VERSION);

        db.set_current_version(Some("1.2.0"));
        assert_eq!(current_schema_version(&db.executor()).unwrap(), "1.2.0");
    }

    #[test]
    fn test_audit_insert_is_idempotent() {
        let db = MockDatabase::new();
        let executor = db.executor();
        let details = json!({"verification_passed": true});

        let insert =
            || insert_audit_row(&executor, "1.1.0", "1.1.0_attendance.sql", true, &details);

        assert!(insert().unwrap());
        assert!(!insert().unwrap());
        assert_eq!(db.audit_rows().len(), 1);
    }

    #[test]
    fn test_record_version_failure_propagates() {
        let db = MockDatabase::new();
        db.fail_record_for("1.2.0");
        let executor = db.executor();

        let record = |version: &str, notes: &str, description: &str| {
            record_version_application(&executor, version, notes, description)
        };

        assert!(record("1.1.0", "notes/1.1.0.md", "Attendance").is_ok());
        assert!(record("1.2.0", "notes/1.2.0.md", "Budget").is_err());
        assert_eq!(db.recorded_versions(), vec!["1.1.0"]);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2024-01-20 12:30:45.123456+00").unwrap();
        assert_eq!((ts.year(), ts.hour(), ts.minute()), (2024, 12, 30));

        let ts = parse_timestamp("2024-01-20 12:30:45+02").unwrap();
        assert_eq!(ts.hour(), 10);

        assert!(parse_timestamp("2024-01-20T12:30:45Z").is_ok());
        assert!(parse_timestamp("2024-01-20 12:30:45").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_list_history_reads_audit_rows() {
        let db = MockDatabase::new();
        let executor = db.executor();
        let details = json!({"ok": true});
        insert_audit_row(&executor, "1.1.0", "1.1.0_attendance.sql", true, &details).unwrap();
        insert_audit_row(&executor, "1.3.0", "1.3.0_outreach.sql", true, &Value::Null).unwrap();

        let all = list_history(&executor, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].version, "1.1.0");
        assert!(all[0].verification_passed);

        let one = list_history(&executor, Some("1.3.0")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].migration_name, "1.3.0_outreach.sql");
    }
}
