//! Schema migration gating
//!
//! This module provides everything needed to keep the database schema in step
//! with the application release:
//! - the static migration catalog
//! - planning of pending migrations as operator-run SQL
//! - verification and recording of applied versions
//! - status and audit history reads
//!
//! # Example
//!
//! ```rust,no_run
//! use teamforge::migration::{DirectoryScriptSource, MigrationCatalog, MigrationPlanner};
//!
//! let catalog = MigrationCatalog::bundled()?;
//! let scripts = DirectoryScriptSource::new("migrations");
//! let plan = MigrationPlanner::new(&catalog, &scripts).plan("1.0.0", "1.3.0")?;
//! println!("{}", plan.combined_sql);
//! # Ok::<(), teamforge::migration::VersionGateError>(())
//! ```

pub mod catalog;
pub mod checksum;
pub mod error;
pub mod history;
pub mod planner;
pub mod script;
pub mod status;
pub mod verifier;

pub use catalog::{CatalogIssue, IssueSeverity, MigrationCatalog, MigrationMetadata};
pub use checksum::calculate_checksum;
pub use error::VersionGateError;
pub use history::{list_history, MigrationHistoryRecord};
pub use planner::{MigrationPlan, MigrationPlanner, PlannedMigration};
pub use script::{split_apply_section, DirectoryScriptSource, ScriptSource};
pub use status::{check_status, VersionStatus};
pub use verifier::{verification_passed, MigrationVerifier, VerificationReport, VerificationResult};
