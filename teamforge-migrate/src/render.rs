//! Human-readable output for CLI commands

use colored::Colorize;
use std::fmt::Write;
use teamforge::migration::{
    CatalogIssue, IssueSeverity, MigrationHistoryRecord, MigrationPlan, VerificationReport,
    VersionStatus,
};

pub fn status(status: &VersionStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n📊 Schema Version Status\n");
    let _ = writeln!(out, "  Application: {}", status.app_version);
    let _ = writeln!(out, "  Database:    {}", status.database_version);
    if let Some(latest) = &status.latest_known_version {
        let _ = writeln!(out, "  Latest:      {}", latest);
    }
    let _ = writeln!(out);

    if status.needs_migration {
        let _ = writeln!(
            out,
            "{}",
            format!("⏳ Pending Migrations ({}):", status.pending_versions.len()).yellow()
        );
        for version in &status.pending_versions {
            let _ = writeln!(out, "  ⏳ {}", version);
        }
    } else {
        let _ = writeln!(out, "{}", "✅ Database is up to date".green());
    }
    out
}

pub fn plan_summary(plan: &MigrationPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n📋 {} ({} → {})\n", plan.message, plan.from, plan.to);
    for (i, migration) in plan.migrations.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} {} ({})",
            i + 1,
            migration.version.bold(),
            migration.description,
            migration.estimated_time
        );
        let _ = writeln!(out, "     {} sha256:{}", migration.file, migration.checksum);
    }
    if !plan.instructions.is_empty() {
        let _ = writeln!(out, "\nNext steps:");
        for (i, step) in plan.instructions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
    }
    out
}

pub fn report(report: &VerificationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n🔍 Verification run {} at {}\n", report.run_id, report.checked_at);
    for result in &report.results {
        let line = if result.success {
            let note = if result.manual_verification == Some(true) {
                " (manual verification)"
            } else if result.audit_inserted == Some(false) {
                " (already recorded)"
            } else {
                ""
            };
            format!("  ✓ {}{}", result.version, note).green().to_string()
        } else {
            format!(
                "  ✗ {} [{}] {}",
                result.version,
                result.error_kind.as_deref().unwrap_or("unknown"),
                result.error.as_deref().unwrap_or_default()
            )
            .red()
            .to_string()
        };
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "\n{}", report.message);
    out
}

pub fn issues(issues: &[CatalogIssue]) -> String {
    if issues.is_empty() {
        return format!("{}\n", "✅ Catalog is consistent".green());
    }
    let mut out = String::new();
    for issue in issues {
        let line = match issue.severity {
            IssueSeverity::Error => format!("  ✗ {}", issue).red(),
            IssueSeverity::Warning => format!("  ⚠ {}", issue).yellow(),
        };
        let _ = writeln!(out, "{}", line);
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    let _ = writeln!(
        out,
        "\n📈 Summary: {} error(s), {} warning(s)",
        errors,
        issues.len() - errors
    );
    out
}

pub fn history(records: &[MigrationHistoryRecord]) -> String {
    if records.is_empty() {
        return "No verified migrations recorded\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "\n📜 Migration History ({}):", records.len());
    for record in records {
        let mark = if record.verification_passed { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "  {} {} {} ({})",
            mark,
            record.version,
            record.migration_name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}
