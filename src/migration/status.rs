//! Application vs. database version status

use crate::executor::SqlExecutor;
use crate::migration::catalog::MigrationCatalog;
use crate::migration::history;
use crate::migration::VersionGateError;
use crate::version;
use serde::{Deserialize, Serialize};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Where the database stands relative to the running application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    pub app_version: String,
    pub database_version: String,
    pub needs_migration: bool,
    pub pending_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_known_version: Option<String>,
}

/// Compare `app_version` with the version recorded in the database
///
/// # Errors
///
/// Returns `VersionGateError::Database` if the current version cannot be read.
pub fn check_status(
    catalog: &MigrationCatalog,
    app_version: &str,
    executor: &dyn SqlExecutor,
) -> Result<VersionStatus, VersionGateError> {
    let database_version = history::current_schema_version(executor)?;
    let needs_migration = version::is_greater(app_version, &database_version);
    let pending_versions = if needs_migration {
        version::versions_between(&catalog.version_order, &database_version, app_version)
    } else {
        Vec::new()
    };

    #[cfg(feature = "metrics")]
    METRICS.record_status_check();

    log::debug!(
        "status: app {} database {} pending [{}]",
        app_version,
        database_version,
        pending_versions.join(", ")
    );

    Ok(VersionStatus {
        app_version: app_version.to_string(),
        database_version,
        needs_migration,
        pending_versions,
        latest_known_version: catalog.latest_version(),
    })
}
