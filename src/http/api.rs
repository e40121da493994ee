//! Version API routing, independent of the HTTP server
//!
//! [`VersionApi::handle`] maps a method, request target and body to an
//! [`ApiResponse`]. The `may_minihttp` service in [`super::service`] is a thin
//! adapter around it, which keeps the routing testable without sockets.

use crate::connection::{Connector, Session};
use crate::migration::{
    check_status, MigrationCatalog, MigrationPlanner, MigrationVerifier, ScriptSource,
    VersionGateError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub const STATUS_PATH: &str = "/api/version/status";
pub const MIGRATE_PATH: &str = "/api/version/migrate";
pub const VERIFY_PATH: &str = "/api/version/verify";
pub const METRICS_PATH: &str = "/metrics";

const JSON: &str = "Content-Type: application/json";
#[cfg(feature = "metrics")]
const PROMETHEUS_TEXT: &str = "Content-Type: text/plain; version=0.0.4; charset=utf-8";

/// Response produced by [`VersionApi::handle`]
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn json(status: u16, value: &impl Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body,
            },
            Err(e) => {
                log::error!("failed to serialize response: {}", e);
                Self {
                    status: 500,
                    content_type: JSON,
                    body: br#"{"error":"Internal server error"}"#.to_vec(),
                }
            }
        }
    }

    fn error(status: u16, error: &str) -> Self {
        Self::json(status, &json!({ "error": error }))
    }

    fn failure(status: u16, error: &str, message: &str) -> Self {
        Self::json(status, &json!({ "error": error, "message": message }))
    }

    /// Parse the body as JSON
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Standard reason phrase for the status codes this API emits
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    versions: Vec<String>,
}

/// Shared state behind the version endpoints
pub struct VersionApi {
    catalog: Arc<MigrationCatalog>,
    scripts: Arc<dyn ScriptSource>,
    connector: Arc<dyn Connector>,
    app_version: String,
}

impl VersionApi {
    /// Create the API; `app_version` defaults to the newest catalog version
    pub fn new(
        catalog: Arc<MigrationCatalog>,
        scripts: Arc<dyn ScriptSource>,
        connector: Arc<dyn Connector>,
        app_version: Option<String>,
    ) -> Self {
        let app_version = app_version
            .filter(|v| !v.trim().is_empty())
            .or_else(|| catalog.latest_version())
            .unwrap_or_else(|| crate::migration::history::BASELINE_VERSION.to_string());
        Self {
            catalog,
            scripts,
            connector,
            app_version,
        }
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// Route one request
    pub fn handle(&self, method: &str, target: &str, body: &[u8]) -> ApiResponse {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let response = match (method, path) {
            ("GET", STATUS_PATH) => self.status(),
            ("GET", MIGRATE_PATH) => self.migrate(query),
            ("POST", VERIFY_PATH) => self.verify(body),
            #[cfg(feature = "metrics")]
            ("GET", METRICS_PATH) => ApiResponse {
                status: 200,
                content_type: PROMETHEUS_TEXT,
                body: METRICS.render(),
            },
            (_, STATUS_PATH | MIGRATE_PATH | VERIFY_PATH) => {
                ApiResponse::error(405, "Method not allowed")
            }
            _ => ApiResponse::error(404, "Not found"),
        };

        log::debug!("{} {} -> {}", method, path, response.status);
        response
    }

    fn status(&self) -> ApiResponse {
        let result = Session::open(self.connector.as_ref(), "status")
            .map_err(VersionGateError::from)
            .and_then(|session| check_status(&self.catalog, &self.app_version, &session));

        match result {
            Ok(status) => ApiResponse::json(200, &status),
            Err(e) => {
                log::error!("version status check failed: {}", e);
                ApiResponse::failure(500, "Failed to check version status", &e.to_string())
            }
        }
    }

    fn migrate(&self, query: &str) -> ApiResponse {
        let from = query_param(query, "from").filter(|v| !v.trim().is_empty());
        let to = query_param(query, "to").filter(|v| !v.trim().is_empty());
        let (Some(from), Some(to)) = (from, to) else {
            return ApiResponse::error(400, "Missing required parameters: from and to");
        };

        match MigrationPlanner::new(&self.catalog, self.scripts.as_ref()).plan(&from, &to) {
            Ok(plan) => ApiResponse::json(200, &plan),
            Err(e) if e.is_client_error() => ApiResponse::error(400, &e.to_string()),
            Err(e) => {
                ApiResponse::failure(500, "Failed to generate migration plan", &e.to_string())
            }
        }
    }

    fn verify(&self, body: &[u8]) -> ApiResponse {
        let request: VerifyRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("rejected verify request: {}", e);
                return ApiResponse::error(
                    400,
                    "Request body must be a JSON object with a non-empty \"versions\" array",
                );
            }
        };

        let verifier = MigrationVerifier::new(&self.catalog, self.connector.as_ref());
        match verifier.verify(&request.versions) {
            Ok(report) => ApiResponse::json(if report.success { 200 } else { 400 }, &report),
            Err(e) if e.is_client_error() => ApiResponse::error(400, &e.to_string()),
            Err(e) => ApiResponse::failure(500, "Verification failed", &e.to_string()),
        }
    }
}

/// First value of `name` in a URL query string, percent-decoded
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| percent_decode(key) == name)
        .map(|(_, value)| percent_decode(value))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
