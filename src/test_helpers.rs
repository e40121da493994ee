//! In-memory collaborators for tests
//!
//! [`MockDatabase`] stands in for Postgres behind the [`SqlExecutor`] and
//! [`Connector`] seams. It understands the version-record procedure, the
//! audit table, the current-version function and transaction control. Any
//! other query is answered from scripted responses.
//!
//! Enabled for this crate's unit tests and, through the `test-helpers`
//! feature, for integration tests and the CLI crate.

use crate::connection::{ConnectionError, Connector};
use crate::executor::{DbError, SqlExecutor, SqlParams};
use crate::migration::catalog::{MigrationCatalog, MigrationMetadata};
use crate::migration::script::ScriptSource;
use crate::row::ResultRow;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Verification SQL used for `version` by [`sample_catalog`]
pub fn sample_check_sql(version: &str) -> String {
    format!(
        "SELECT verification_passed FROM release_checks WHERE version = '{}'",
        version
    )
}

/// Metadata for `version`; verification is required when `script` is given
pub fn metadata(version: &str, script: Option<&str>) -> MigrationMetadata {
    MigrationMetadata {
        migration_file: format!("{}.sql", version),
        description: format!("Schema changes for {}", version),
        estimated_time: "< 1 minute".to_string(),
        release_notes: format!("release-notes/{}.md", version),
        requires_verification: script.is_some(),
        verification_script: script.map(str::to_string),
        permissive_verification: false,
    }
}

/// Four-version catalog used across tests
///
/// | version | file | verification |
/// |---|---|---|
/// | 1.0.0 | `1.0.0_baseline.sql` | none |
/// | 1.1.0 | `1.1.0_attendance.sql` | [`sample_check_sql`] |
/// | 1.2.0 | `1.2.0_budget.sql` | none |
/// | 1.3.0 | `1.3.0_outreach.sql` | [`sample_check_sql`] |
pub fn sample_catalog() -> MigrationCatalog {
    let entries = [
        ("1.0.0", "1.0.0_baseline.sql", false),
        ("1.1.0", "1.1.0_attendance.sql", true),
        ("1.2.0", "1.2.0_budget.sql", false),
        ("1.3.0", "1.3.0_outreach.sql", true),
    ];

    let mut migrations = HashMap::new();
    for (version, file, verified) in entries {
        let check = sample_check_sql(version);
        let mut meta = metadata(version, verified.then_some(check.as_str()));
        meta.migration_file = file.to_string();
        migrations.insert(version.to_string(), meta);
    }

    MigrationCatalog::new(
        entries.iter().map(|(v, _, _)| v.to_string()).collect(),
        migrations,
    )
}

/// Script source backed by a map of file name to text
#[derive(Debug, Clone, Default)]
pub struct StaticScriptSource {
    scripts: HashMap<String, String>,
}

impl StaticScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: &str, text: &str) -> Self {
        self.scripts.insert(file.to_string(), text.to_string());
        self
    }
}

impl ScriptSource for StaticScriptSource {
    fn load(&self, file: &str) -> io::Result<String> {
        self.scripts.get(file).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{}: No such file or directory", file))
        })
    }
}

#[derive(Debug, Clone)]
struct AuditRow {
    version: String,
    migration_name: String,
    details: String,
}

#[derive(Debug, Default)]
struct MockState {
    current_version: Option<String>,
    responses: HashMap<String, Result<Vec<ResultRow>, String>>,
    failing_records: Vec<String>,
    fail_audit: bool,
    refuse_connections: bool,
    statements: Vec<String>,
    control: Vec<String>,
    in_transaction: bool,
    recorded: Vec<String>,
    audit: Vec<AuditRow>,
    pending_recorded: Vec<String>,
    pending_audit: Vec<AuditRow>,
    sessions_opened: usize,
    sessions_released: usize,
}

impl MockState {
    fn has_audit(&self, version: &str, migration_name: &str) -> bool {
        self.audit
            .iter()
            .chain(self.pending_audit.iter())
            .any(|row| row.version == version && row.migration_name == migration_name)
    }
}

/// Shared in-memory database state
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

fn param_text(params: SqlParams<'_>, index: usize) -> String {
    params
        .get(index)
        .map(|p| format!("{:?}", p).trim_matches('"').to_string())
        .unwrap_or_default()
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Executor that is not tied to a session
    pub fn executor(&self) -> MockExecutor {
        MockExecutor {
            db: self.clone(),
            session: false,
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector { db: self.clone() }
    }

    /// Value returned by `get_current_schema_version()`
    pub fn set_current_version(&self, version: Option<&str>) {
        self.lock().current_version = version.map(str::to_string);
    }

    /// Answer `sql` with `rows`
    pub fn respond(&self, sql: &str, rows: Vec<ResultRow>) {
        self.lock().responses.insert(sql.trim().to_string(), Ok(rows));
    }

    /// Make `sql` raise `message`
    pub fn fail(&self, sql: &str, message: &str) {
        self.lock()
            .responses
            .insert(sql.trim().to_string(), Err(message.to_string()));
    }

    /// Answer the sample check for `version` with a single row
    pub fn respond_to_check(&self, version: &str, row: ResultRow) {
        self.respond(&sample_check_sql(version), vec![row]);
    }

    /// Make the sample check for `version` raise
    pub fn fail_check(&self, version: &str, message: &str) {
        self.fail(&sample_check_sql(version), message);
    }

    /// Make `record_version_application` raise for `version`
    pub fn fail_record_for(&self, version: &str) {
        self.lock().failing_records.push(version.to_string());
    }

    pub fn fail_audit_inserts(&self) {
        self.lock().fail_audit = true;
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// Every statement seen, in order
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// `BEGIN`/`COMMIT`/`ROLLBACK` statements seen, in order
    pub fn control_statements(&self) -> Vec<String> {
        self.lock().control.clone()
    }

    /// Committed version records
    pub fn recorded_versions(&self) -> Vec<String> {
        self.lock().recorded.clone()
    }

    /// Committed audit rows as `(version, migration_name)`
    pub fn audit_rows(&self) -> Vec<(String, String)> {
        self.lock()
            .audit
            .iter()
            .map(|row| (row.version.clone(), row.migration_name.clone()))
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_released(&self) -> usize {
        self.lock().sessions_released
    }
}

/// [`SqlExecutor`] over a [`MockDatabase`]
#[derive(Debug)]
pub struct MockExecutor {
    db: MockDatabase,
    session: bool,
}

impl MockExecutor {
    fn control(&self, statement: &str) {
        let mut state = self.db.lock();
        state.control.push(statement.to_string());
        match statement {
            "BEGIN" => state.in_transaction = true,
            "COMMIT" => {
                let records = std::mem::take(&mut state.pending_recorded);
                let audit = std::mem::take(&mut state.pending_audit);
                state.recorded.extend(records);
                state.audit.extend(audit);
                state.in_transaction = false;
            }
            _ => {
                state.pending_recorded.clear();
                state.pending_audit.clear();
                state.in_transaction = false;
            }
        }
    }
}

impl SqlExecutor for MockExecutor {
    fn execute(&self, query: &str, params: SqlParams<'_>) -> Result<u64, DbError> {
        let sql = query.trim();
        self.db.lock().statements.push(sql.to_string());

        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            self.control(sql);
            return Ok(0);
        }

        let mut state = self.db.lock();
        if sql.contains("record_version_application") {
            let version = param_text(params, 0);
            if state.failing_records.contains(&version) {
                return Err(DbError::QueryError(format!(
                    "permission denied for function record_version_application ({})",
                    version
                )));
            }
            if state.in_transaction {
                state.pending_recorded.push(version);
            } else {
                state.recorded.push(version);
            }
            return Ok(1);
        }

        if sql.starts_with("INSERT INTO migration_history") {
            if state.fail_audit {
                return Err(DbError::QueryError(
                    "permission denied for table migration_history".to_string(),
                ));
            }
            let row = AuditRow {
                version: param_text(params, 0),
                migration_name: param_text(params, 1),
                details: param_text(params, 3),
            };
            if state.has_audit(&row.version, &row.migration_name) {
                return Ok(0);
            }
            if state.in_transaction {
                state.pending_audit.push(row);
            } else {
                state.audit.push(row);
            }
            return Ok(1);
        }

        match state.responses.get(sql) {
            Some(Err(message)) => Err(DbError::QueryError(message.clone())),
            Some(Ok(rows)) => Ok(rows.len() as u64),
            None => Ok(0),
        }
    }

    fn query_all(&self, query: &str, params: SqlParams<'_>) -> Result<Vec<ResultRow>, DbError> {
        let sql = query.trim();
        let mut state = self.db.lock();
        state.statements.push(sql.to_string());

        if sql.contains("get_current_schema_version()") {
            let value = state
                .current_version
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null);
            return Ok(vec![ResultRow::new().with("get_current_schema_version", value)]);
        }

        if sql.contains("FROM migration_history") {
            let filter = (!params.is_empty()).then(|| param_text(params, 0));
            return Ok(state
                .audit
                .iter()
                .enumerate()
                .filter(|(_, row)| filter.as_ref().map_or(true, |v| &row.version == v))
                .map(|(i, row)| {
                    ResultRow::new()
                        .with("version", row.version.clone())
                        .with("migration_name", row.migration_name.clone())
                        .with("verification_passed", true)
                        .with("verification_details", row.details.clone())
                        .with("applied_at", format!("2024-01-20 12:00:{:02}.000000+00", i % 60))
                })
                .collect());
        }

        match state.responses.get(sql) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(DbError::QueryError(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for MockExecutor {
    fn drop(&mut self) {
        if self.session {
            self.db.lock().sessions_released += 1;
        }
    }
}

/// [`Connector`] handing out session executors over a [`MockDatabase`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    db: MockDatabase,
}

impl Connector for MockConnector {
    fn open(&self) -> Result<Box<dyn SqlExecutor>, ConnectionError> {
        let mut state = self.db.lock();
        if state.refuse_connections {
            return Err(ConnectionError::Other("connection refused".to_string()));
        }
        state.sessions_opened += 1;
        drop(state);
        Ok(Box::new(MockExecutor {
            db: self.db.clone(),
            session: true,
        }))
    }
}
