//! # TeamForge
//!
//! Schema version gate for the TeamForge team-management application, on the
//! `may` coroutine runtime.
//!
//! The gate keeps the Postgres schema in step with the application release:
//! it computes which migrations are pending, hands operators the combined SQL
//! to apply, then verifies and records each applied version.
//!
//! - [`version`]: numeric semantic-version ordering
//! - [`migration`]: catalog, planner, verifier, status and history
//! - [`http`]: `may_minihttp` endpoints
//! - [`client`]: blocking client and the UI gate state machine

pub mod client;
pub mod config;
pub mod connection;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod migration;
pub mod row;
pub mod transaction;
pub mod version;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use crate::client::{GateState, VersionCheckClient, VersionGate};
pub use crate::config::Settings;
pub use crate::connection::{Connector, PostgresConnector, Session};
pub use crate::executor::{DbError, SqlExecutor};
pub use crate::migration::{
    MigrationCatalog, MigrationPlan, MigrationPlanner, MigrationVerifier, VerificationReport,
    VersionGateError, VersionStatus,
};
pub use crate::version::SchemaVersion;
