//! Tests for CLI output formatting

use teamforge::migration::{MigrationPlanner, MigrationVerifier, VersionStatus};
use teamforge::row::ResultRow;
use teamforge::test_helpers::{sample_catalog, MockDatabase, StaticScriptSource};
use teamforge_migrate::render;

fn plain() {
    colored::control::set_override(false);
}

#[test]
fn test_status_lists_pending_versions() {
    plain();
    let status = VersionStatus {
        app_version: "1.3.0".to_string(),
        database_version: "1.1.0".to_string(),
        needs_migration: true,
        pending_versions: vec!["1.2.0".to_string(), "1.3.0".to_string()],
        latest_known_version: Some("1.3.0".to_string()),
    };

    let text = render::status(&status);
    assert!(text.contains("Pending Migrations (2)"));
    assert!(text.contains("⏳ 1.2.0"));
    assert!(text.contains("Database:    1.1.0"));
}

#[test]
fn test_status_up_to_date() {
    plain();
    let status = VersionStatus {
        app_version: "1.3.0".to_string(),
        database_version: "1.3.0".to_string(),
        needs_migration: false,
        pending_versions: Vec::new(),
        latest_known_version: None,
    };
    assert!(render::status(&status).contains("Database is up to date"));
}

#[test]
fn test_plan_summary_includes_checksums_and_steps() {
    plain();
    let catalog = sample_catalog();
    let scripts = StaticScriptSource::new()
        .with("1.1.0_attendance.sql", "CREATE TABLE attendance (id int);")
        .with("1.2.0_budget.sql", "ALTER TABLE teams ADD COLUMN budget numeric;");
    let plan = MigrationPlanner::new(&catalog, &scripts).plan("1.0.0", "1.2.0").unwrap();

    let text = render::plan_summary(&plan);
    assert!(text.contains("1. 1.1.0"));
    assert!(text.contains("2. 1.2.0"));
    assert!(text.contains(&format!("sha256:{}", plan.migrations[0].checksum)));
    assert!(text.contains("Next steps:"));
}

#[test]
fn test_report_marks_failures() {
    plain();
    let catalog = sample_catalog();
    let db = MockDatabase::new();
    db.respond_to_check("1.1.0", ResultRow::new().with("verification_passed", true));
    let connector = db.connector();

    let report = MigrationVerifier::new(&catalog, &connector)
        .verify(&["1.1.0".to_string(), "1.2.0".to_string(), "1.3.0".to_string()])
        .unwrap();

    let text = render::report(&report);
    assert!(text.contains("✓ 1.1.0"));
    assert!(text.contains("✓ 1.2.0 (manual verification)"));
    assert!(text.contains("✗ 1.3.0 [verification_failed] verification did not pass"));
    assert!(text.contains("1 of 3 migration(s) failed verification"));
}

#[test]
fn test_issues_summary() {
    plain();
    let mut catalog = sample_catalog();
    catalog.version_order.push("1.1.0".to_string());

    let issues = catalog.validate().unwrap();
    let text = render::issues(&issues);
    assert!(text.contains("error: 1.1.0"));
    assert!(text.contains("error(s)"));

    assert!(render::issues(&[]).contains("Catalog is consistent"));
}

#[test]
fn test_history_empty() {
    assert_eq!(render::history(&[]), "No verified migrations recorded\n");
}
