//! The version API served over a real socket, driven by the client

use std::sync::Arc;
use std::time::Duration;
use teamforge::client::{GateState, VersionCheckClient, VersionGate};
use teamforge::http::{VersionApi, VersionService};
use teamforge::row::ResultRow;
use teamforge::test_helpers::{sample_catalog, MockDatabase, StaticScriptSource};

fn start(db: &MockDatabase, port: u16) -> VersionCheckClient {
    let scripts = StaticScriptSource::new()
        .with("1.1.0_attendance.sql", "CREATE TABLE attendance (id int);")
        .with("1.2.0_budget.sql", "ALTER TABLE teams ADD COLUMN budget numeric;")
        .with("1.3.0_outreach.sql", "CREATE TABLE outreach (id int);");
    let api = VersionApi::new(
        Arc::new(sample_catalog()),
        Arc::new(scripts),
        Arc::new(db.connector()),
        None,
    );

    let addr = format!("127.0.0.1:{}", port);
    // Left running until the test process exits
    let _server = may_minihttp::HttpServer(VersionService::new(Arc::new(api)))
        .start(&addr)
        .unwrap();

    VersionCheckClient::with_timeout(&format!("http://{}", addr), Duration::from_secs(5))
}

#[test]
fn test_gate_cycle_over_http() {
    let db = MockDatabase::new();
    db.set_current_version(Some("1.1.0"));
    let client = start(&db, 38411);
    let mut gate = VersionGate::new();

    let state = client.check(&mut gate).clone();
    let GateState::Blocked { status, .. } = state else {
        panic!("expected blocked gate, got {:?}", state);
    };
    assert_eq!(status.pending_versions, vec!["1.2.0", "1.3.0"]);

    let plan = client.fetch_plan(&status.database_version, &status.app_version).unwrap();
    assert_eq!(plan.versions, status.pending_versions);
    assert!(plan.combined_sql.contains("-- Migration 2/2: 1.3.0"));

    // 1.3.0 has no scripted answer, so it fails
    let report = client.submit_verification(&plan.versions).unwrap();
    assert!(!report.success);
    gate.apply_report(&report);
    assert!(matches!(gate.state(), GateState::Blocked { unresolved, .. } if unresolved.len() == 1));

    db.respond_to_check("1.3.0", ResultRow::new().with("verification_passed", true));
    let report = client.submit_verification(&["1.3.0".to_string()]).unwrap();
    assert!(report.success);
    assert_eq!(gate.apply_report(&report), &GateState::AwaitingRecheck);

    db.set_current_version(Some("1.3.0"));
    assert_eq!(client.check(&mut gate), &GateState::UpToDate);
}

#[test]
fn test_client_surfaces_error_bodies() {
    let db = MockDatabase::new();
    db.refuse_connections();
    let client = start(&db, 38412);

    let err = client.submit_verification(&["1.1.0".to_string()]).unwrap_err();
    assert!(err.to_string().contains("Verification failed"), "{}", err);

    let err = client.submit_verification(&[]).unwrap_err();
    assert!(err.to_string().contains("HTTP 400"), "{}", err);

    // Status failure degrades instead of blocking
    let mut gate = VersionGate::new();
    assert_eq!(client.check(&mut gate), &GateState::UpToDate);
}
