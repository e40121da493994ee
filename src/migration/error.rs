//! Version-gate error taxonomy

use crate::connection::ConnectionError;
use crate::executor::DbError;

/// Errors raised while planning or verifying schema migrations
///
/// Planning errors abort the whole call. The per-version verification
/// variants are never returned from `verify` itself. They are recorded in
/// that version's result, and the remaining versions are still processed.
#[derive(Debug)]
pub enum VersionGateError {
    /// Caller omitted or malformed required input
    Validation(String),
    /// A version in `versionOrder` has no metadata entry
    CatalogInconsistency { version: String },
    /// A migration script could not be read
    ScriptLoadFailure {
        version: String,
        file: String,
        message: String,
    },
    /// A verification script raised an error
    VerificationExecutionFailure { version: String, message: String },
    /// A verification script ran but did not prove the migration
    VerificationFailed { version: String },
    /// Verification passed but recording the version failed
    RecordApplicationFailure { version: String, message: String },
    /// No privileged session could be opened
    Connection(ConnectionError),
    /// Database error outside per-version isolation
    Database(DbError),
    /// The catalog artifact could not be read or parsed
    Catalog(String),
}

impl VersionGateError {
    /// Stable snake_case tag for this variant, used as `errorKind` on the wire
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            VersionGateError::Validation(_) => "validation_error",
            VersionGateError::CatalogInconsistency { .. } => "catalog_inconsistency",
            VersionGateError::ScriptLoadFailure { .. } => "script_load_failure",
            VersionGateError::VerificationExecutionFailure { .. } => {
                "verification_execution_failure"
            }
            VersionGateError::VerificationFailed { .. } => "verification_failed",
            VersionGateError::RecordApplicationFailure { .. } => "record_application_failure",
            VersionGateError::Connection(_) => "connection_error",
            VersionGateError::Database(_) => "database_error",
            VersionGateError::Catalog(_) => "catalog_error",
        }
    }

    /// Whether the caller supplied bad input (maps to a 400 response)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, VersionGateError::Validation(_))
    }
}

impl std::fmt::Display for VersionGateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionGateError::Validation(msg) => write!(f, "{}", msg),
            VersionGateError::CatalogInconsistency { version } => {
                write!(f, "migration metadata not found for version {}", version)
            }
            VersionGateError::ScriptLoadFailure { version, file, message } => {
                write!(
                    f,
                    "Failed to load migration script '{}' for version {}: {}",
                    file, version, message
                )
            }
            VersionGateError::VerificationExecutionFailure { message, .. } => {
                write!(f, "{}", message)
            }
            VersionGateError::VerificationFailed { .. } => write!(f, "verification did not pass"),
            VersionGateError::RecordApplicationFailure { version, message } => {
                write!(f, "Failed to record version {} as applied: {}", version, message)
            }
            VersionGateError::Connection(e) => write!(f, "{}", e),
            VersionGateError::Database(e) => write!(f, "{}", e),
            VersionGateError::Catalog(msg) => write!(f, "Invalid migration catalog: {}", msg),
        }
    }
}

impl std::error::Error for VersionGateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VersionGateError::Connection(e) => Some(e),
            VersionGateError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for VersionGateError {
    fn from(error: ConnectionError) -> Self {
        VersionGateError::Connection(error)
    }
}

impl From<DbError> for VersionGateError {
    fn from(error: DbError) -> Self {
        VersionGateError::Database(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_version() {
        let err = VersionGateError::CatalogInconsistency {
            version: "1.4.0".to_string(),
        };
        assert!(err.to_string().contains("1.4.0"));
        assert!(err.to_string().contains("metadata not found"));

        let err = VersionGateError::ScriptLoadFailure {
            version: "1.2.0".to_string(),
            file: "1.2.0_budget_categories.sql".to_string(),
            message: "No such file or directory".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("1.2.0"));
        assert!(text.contains("1.2.0_budget_categories.sql"));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(
            VersionGateError::VerificationFailed { version: "1.0.0".into() }.kind(),
            "verification_failed"
        );
        assert_eq!(
            VersionGateError::RecordApplicationFailure {
                version: "1.0.0".into(),
                message: "permission denied".into()
            }
            .kind(),
            "record_application_failure"
        );
        assert!(VersionGateError::Validation("x".into()).is_client_error());
        assert!(!VersionGateError::Catalog("x".into()).is_client_error());
    }

    #[test]
    fn test_connection_error_converts() {
        let err: VersionGateError = ConnectionError::MissingConnectionString.into();
        assert_eq!(err.kind(), "connection_error");
    }
}
