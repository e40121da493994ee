//! HTTP surface for the version gate
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /api/version/status` | app vs. database version |
//! | `GET /api/version/migrate?from=&to=` | combined SQL plan |
//! | `POST /api/version/verify` | verify and record applied versions |
//! | `GET /metrics` | Prometheus exposition (feature `metrics`) |

pub mod api;
pub mod service;

pub use api::{ApiResponse, VersionApi};
pub use service::VersionService;

use std::io;
use std::sync::Arc;

/// Start serving `api` on `bind` and block until the server stops
///
/// # Errors
///
/// Returns an I/O error if the listener cannot be bound or the server
/// coroutine panics.
pub fn serve(api: Arc<VersionApi>, bind: &str, workers: usize) -> io::Result<()> {
    may::config().set_workers(workers.max(1));

    let server = may_minihttp::HttpServer(VersionService::new(api)).start(bind)?;
    log::info!("version API listening on http://{}", bind);

    server
        .join()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("server stopped: {:?}", e)))
}
