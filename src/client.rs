//! Client side of the version gate
//!
//! [`VersionCheckClient`] talks to the version endpoints over blocking HTTP.
//! [`VersionGate`] is the state machine a UI drives with what the client
//! returns: it decides whether the application must stay blocked behind the
//! migration prompt.

use crate::http::api::{MIGRATE_PATH, STATUS_PATH, VERIFY_PATH};
use crate::migration::{MigrationPlan, VerificationReport, VerificationResult, VersionStatus};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Client error type
#[derive(Debug)]
pub enum ClientError {
    /// The request never produced an HTTP response
    Transport(String),
    /// The server answered with an error status
    Status { status: u16, message: String },
    /// The response body was not what the endpoint promises
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(s) => write!(f, "Request failed: {}", s),
            ClientError::Status { status, message } => write!(f, "HTTP {}: {}", status, message),
            ClientError::Decode(s) => write!(f, "Invalid response: {}", s),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ureq::Error> for ClientError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| {
                        let error = v.get("error")?.as_str()?.to_string();
                        Some(match v.get("message").and_then(Value::as_str) {
                            Some(detail) => format!("{}: {}", error, detail),
                            None => error,
                        })
                    })
                    .unwrap_or(body);
                ClientError::Status { status, message }
            }
            ureq::Error::Transport(t) => ClientError::Transport(t.to_string()),
        }
    }
}

/// Blocking client for the version endpoints
#[derive(Debug, Clone)]
pub struct VersionCheckClient {
    agent: ureq::Agent,
    base_url: String,
}

impl VersionCheckClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ClientError> {
        let body = response
            .into_string()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// `GET /api/version/status`
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on transport failure, an error status or an
    /// undecodable body.
    pub fn fetch_status(&self) -> Result<VersionStatus, ClientError> {
        let response = self.agent.get(&self.url(STATUS_PATH)).call()?;
        Self::decode(response)
    }

    /// `GET /api/version/migrate?from=..&to=..`
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on transport failure, an error status or an
    /// undecodable body.
    pub fn fetch_plan(&self, from: &str, to: &str) -> Result<MigrationPlan, ClientError> {
        let response = self
            .agent
            .get(&self.url(MIGRATE_PATH))
            .query("from", from)
            .query("to", to)
            .call()?;
        Self::decode(response)
    }

    /// `POST /api/version/verify`
    ///
    /// A 400 carrying a report is a completed run with failures and is
    /// returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` when no report was produced.
    pub fn submit_verification(
        &self,
        versions: &[String],
    ) -> Result<VerificationReport, ClientError> {
        let body = json!({ "versions": versions }).to_string();
        let result = self
            .agent
            .post(&self.url(VERIFY_PATH))
            .set("Content-Type", "application/json")
            .send_string(&body);

        match result {
            Ok(response) => Self::decode(response),
            Err(ureq::Error::Status(400, response)) => {
                let text = response
                    .into_string()
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                match serde_json::from_str::<VerificationReport>(&text) {
                    Ok(report) => Ok(report),
                    Err(_) => Err(ClientError::Status {
                        status: 400,
                        message: serde_json::from_str::<Value>(&text)
                            .ok()
                            .and_then(|v| {
                                v.get("error").and_then(Value::as_str).map(str::to_string)
                            })
                            .unwrap_or(text),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll status and feed it into `gate`
    ///
    /// A status failure never blocks the application.
    pub fn check<'g>(&self, gate: &'g mut VersionGate) -> &'g GateState {
        gate.apply_status(self.fetch_status())
    }
}

/// Where the gate stands
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    /// Schema matches the application; nothing to do
    UpToDate,
    /// Migrations are pending; `unresolved` holds failures from the last report
    Blocked {
        status: VersionStatus,
        unresolved: Vec<VerificationResult>,
    },
    /// Every version verified; waiting for a status poll to confirm
    AwaitingRecheck,
}

/// Modal state machine driven by status polls and verification reports
#[derive(Debug, Clone, PartialEq)]
pub struct VersionGate {
    state: GateState,
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::UpToDate,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Whether the application must stay behind the migration prompt
    pub fn is_blocking(&self) -> bool {
        !matches!(self.state, GateState::UpToDate)
    }

    /// Apply a status poll result
    pub fn apply_status(&mut self, status: Result<VersionStatus, ClientError>) -> &GateState {
        self.state = match status {
            Ok(status) if status.needs_migration => {
                let unresolved = match std::mem::replace(&mut self.state, GateState::UpToDate) {
                    GateState::Blocked { unresolved, .. } => unresolved,
                    _ => Vec::new(),
                };
                GateState::Blocked { status, unresolved }
            }
            Ok(_) => GateState::UpToDate,
            Err(e) => {
                log::warn!("version status unavailable, continuing without blocking: {}", e);
                GateState::UpToDate
            }
        };
        &self.state
    }

    /// Apply a completed verification report
    pub fn apply_report(&mut self, report: &VerificationReport) -> &GateState {
        if report.success {
            self.state = GateState::AwaitingRecheck;
            return &self.state;
        }

        match &mut self.state {
            GateState::Blocked { unresolved, .. } => {
                *unresolved = report.failures().cloned().collect();
            }
            other => {
                log::warn!(
                    "verification run {} failed while the gate was {:?}",
                    report.run_id,
                    other
                );
            }
        }
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(needs_migration: bool) -> VersionStatus {
        VersionStatus {
            app_version: "1.3.0".to_string(),
            database_version: if needs_migration { "1.1.0" } else { "1.3.0" }.to_string(),
            needs_migration,
            pending_versions: if needs_migration {
                vec!["1.2.0".to_string(), "1.3.0".to_string()]
            } else {
                Vec::new()
            },
            latest_known_version: Some("1.3.0".to_string()),
        }
    }

    fn report(results: Vec<VerificationResult>) -> VerificationReport {
        VerificationReport {
            run_id: "00000000-0000-4000-8000-000000000000".to_string(),
            checked_at: "2024-01-20T12:00:00.000Z".to_string(),
            success: results.iter().all(|r| r.success),
            message: String::new(),
            results,
        }
    }

    fn result(version: &str, success: bool) -> VerificationResult {
        VerificationResult {
            version: version.to_string(),
            success,
            manual_verification: None,
            details: None,
            error: (!success).then(|| "verification did not pass".to_string()),
            error_kind: (!success).then(|| "verification_failed".to_string()),
            audit_inserted: success.then_some(true),
        }
    }

    #[test]
    fn test_status_failure_degrades_to_up_to_date() {
        let mut gate = VersionGate::new();
        gate.apply_status(Ok(status(true)));
        assert!(gate.is_blocking());

        let state = gate.apply_status(Err(ClientError::Transport("connection refused".into())));
        assert_eq!(state, &GateState::UpToDate);
    }

    #[test]
    fn test_failed_report_keeps_gate_blocked() {
        let mut gate = VersionGate::new();
        gate.apply_status(Ok(status(true)));

        gate.apply_report(&report(vec![result("1.2.0", true), result("1.3.0", false)]));
        match gate.state() {
            GateState::Blocked { unresolved, .. } => {
                assert_eq!(unresolved.len(), 1);
                assert_eq!(unresolved[0].version, "1.3.0");
            }
            other => panic!("unexpected state: {other:?}"),
        }

        // A later poll keeps the failures visible for retry
        gate.apply_status(Ok(status(true)));
        assert!(matches!(
            gate.state(),
            GateState::Blocked { unresolved, .. } if unresolved.len() == 1
        ));
    }

    #[test]
    fn test_successful_report_awaits_recheck() {
        let mut gate = VersionGate::new();
        gate.apply_status(Ok(status(true)));

        assert_eq!(
            gate.apply_report(&report(vec![result("1.2.0", true), result("1.3.0", true)])),
            &GateState::AwaitingRecheck
        );
        assert!(gate.is_blocking());

        assert_eq!(gate.apply_status(Ok(status(false))), &GateState::UpToDate);
        assert!(!gate.is_blocking());
    }

    #[test]
    fn test_unreachable_server_does_not_block() {
        let client =
            VersionCheckClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500));
        let mut gate = VersionGate::new();
        assert_eq!(client.check(&mut gate), &GateState::UpToDate);
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Status {
            status: 500,
            message: "Verification failed".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: Verification failed");
    }
}
