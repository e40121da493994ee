//! End-to-end flow over the bundled catalog and migration scripts
//!
//! status → plan → (operator applies SQL) → verify → status

use std::path::PathBuf;
use teamforge::migration::{
    check_status, DirectoryScriptSource, MigrationCatalog, MigrationPlanner, MigrationVerifier,
};
use teamforge::row::ResultRow;
use teamforge::test_helpers::MockDatabase;

fn migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

fn check_sql(catalog: &MigrationCatalog, version: &str) -> String {
    catalog
        .metadata(version)
        .and_then(|meta| meta.required_verification_script())
        .map(str::to_string)
        .unwrap()
}

#[test]
fn test_bundled_scripts_exist_for_every_version() {
    let catalog = MigrationCatalog::bundled().unwrap();
    let scripts = DirectoryScriptSource::new(migrations_dir());

    let plan = MigrationPlanner::new(&catalog, &scripts)
        .plan("0.0.0", &catalog.latest_version().unwrap())
        .unwrap();

    assert_eq!(plan.versions, catalog.version_order);
    assert!(!plan.combined_sql.contains("DROP TABLE"), "rollback sections must not be served");
    assert!(plan.combined_sql.contains("CREATE OR REPLACE FUNCTION record_version_application"));
    assert!(plan.verification_sql.contains("-- Verify 1.3.0"));
    assert!(!plan.verification_sql.contains("-- Verify 1.2.0"));
}

#[test]
fn test_full_gate_cycle() {
    let catalog = MigrationCatalog::bundled().unwrap();
    let scripts = DirectoryScriptSource::new(migrations_dir());
    let db = MockDatabase::new();
    db.set_current_version(Some("1.1.0"));
    let app_version = catalog.latest_version().unwrap();

    let status = check_status(&catalog, &app_version, &db.executor()).unwrap();
    assert!(status.needs_migration);
    assert_eq!(status.pending_versions, vec!["1.2.0", "1.3.0"]);

    let plan = MigrationPlanner::new(&catalog, &scripts)
        .plan(&status.database_version, &status.app_version)
        .unwrap();
    assert_eq!(plan.versions, status.pending_versions);

    // 1.3.0 answers through the `verified` column
    db.respond(
        &check_sql(&catalog, "1.3.0"),
        vec![ResultRow::new().with("verified", true).with("relname", "outreach_hours")],
    );
    let connector = db.connector();
    let report = MigrationVerifier::new(&catalog, &connector)
        .verify(&plan.versions)
        .unwrap();

    assert!(report.success, "{:?}", report.results);
    assert_eq!(report.results[0].manual_verification, Some(true));
    assert_eq!(report.results[1].audit_inserted, Some(true));
    assert_eq!(db.recorded_versions(), vec!["1.3.0"]);
    assert_eq!(
        db.audit_rows(),
        vec![("1.3.0".to_string(), "1.3.0_outreach_hours.sql".to_string())]
    );

    db.set_current_version(Some("1.3.0"));
    let status = check_status(&catalog, &app_version, &db.executor()).unwrap();
    assert!(!status.needs_migration);
}

#[test]
fn test_failed_verification_leaves_state_untouched() {
    let catalog = MigrationCatalog::bundled().unwrap();
    let db = MockDatabase::new();
    db.respond(
        &check_sql(&catalog, "1.1.0"),
        vec![ResultRow::new().with("verification_passed", "f")],
    );
    db.fail(&check_sql(&catalog, "1.0.0"), "function to_regprocedure(unknown) does not exist");
    let connector = db.connector();

    let report = MigrationVerifier::new(&catalog, &connector)
        .verify(&["1.1.0".to_string(), "1.0.0".to_string()])
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.results[0].version, "1.0.0");
    assert_eq!(
        report.results[0].error_kind.as_deref(),
        Some("verification_execution_failure")
    );
    assert_eq!(report.results[1].error_kind.as_deref(), Some("verification_failed"));
    assert!(db.recorded_versions().is_empty());
    assert!(db.audit_rows().is_empty());
    assert!(db.control_statements().is_empty());
}
