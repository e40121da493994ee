//! Metrics and tracing helpers
//!
//! With the `metrics` feature, [`METRICS`] holds Prometheus collectors in a
//! private registry that the HTTP layer serves on `/metrics`. With the
//! `tracing` feature, [`tracing_helpers`] provides the spans used around
//! planning, verification, connections and queries.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{GateMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use prometheus::{
        Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<GateMetrics> = Lazy::new(GateMetrics::init);

    /// Collectors for the version gate
    pub struct GateMetrics {
        registry: Registry,
        plans_total: IntCounterVec,
        verifications_total: IntCounterVec,
        queries_total: IntCounterVec,
        query_duration: Histogram,
        status_checks_total: IntCounter,
    }

    impl GateMetrics {
        pub fn init() -> Self {
            let registry = Registry::new_custom(Some("teamforge".to_string()), None)
                .expect("valid metrics namespace");

            let plans_total = IntCounterVec::new(
                Opts::new("migration_plans_total", "Migration plans requested, by outcome"),
                &["outcome"],
            )
            .expect("valid migration_plans_total definition");
            let verifications_total = IntCounterVec::new(
                Opts::new(
                    "version_verifications_total",
                    "Per-version verification results, by outcome",
                ),
                &["outcome"],
            )
            .expect("valid version_verifications_total definition");
            let queries_total = IntCounterVec::new(
                Opts::new("queries_total", "Database round trips, by outcome"),
                &["outcome"],
            )
            .expect("valid queries_total definition");
            let query_duration = Histogram::with_opts(HistogramOpts::new(
                "query_duration_seconds",
                "Duration of database round trips",
            ))
            .expect("valid query_duration_seconds definition");
            let status_checks_total =
                IntCounter::new("status_checks_total", "Version status checks served")
                    .expect("valid status_checks_total definition");

            for collector in [
                Box::new(plans_total.clone()) as Box<dyn prometheus::core::Collector>,
                Box::new(verifications_total.clone()),
                Box::new(queries_total.clone()),
                Box::new(query_duration.clone()),
                Box::new(status_checks_total.clone()),
            ] {
                if let Err(e) = registry.register(collector) {
                    log::warn!("failed to register metric collector: {}", e);
                }
            }

            Self {
                registry,
                plans_total,
                verifications_total,
                queries_total,
                query_duration,
                status_checks_total,
            }
        }

        pub fn record_plan(&self, outcome: &str) {
            self.plans_total.with_label_values(&[outcome]).inc();
        }

        pub fn record_verification(&self, outcome: &str) {
            self.verifications_total.with_label_values(&[outcome]).inc();
        }

        pub fn record_status_check(&self) {
            self.status_checks_total.inc();
        }

        pub fn record_query(&self, elapsed: Duration, ok: bool) {
            let outcome = if ok { "ok" } else { "error" };
            self.queries_total.with_label_values(&[outcome]).inc();
            self.query_duration.observe(elapsed.as_secs_f64());
        }

        /// Render every collector in the Prometheus text format
        pub fn render(&self) -> Vec<u8> {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {}", e);
            }
            buffer
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn acquire_connection_span() -> Span {
        info_span!("teamforge.acquire_connection")
    }

    pub fn execute_query_span(query: &str) -> Span {
        let preview: String = query.trim().chars().take(80).collect();
        info_span!("teamforge.query", sql = %preview)
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("teamforge.begin_transaction")
    }

    pub fn plan_span(from: &str, to: &str) -> Span {
        info_span!("teamforge.plan", from = %from, to = %to)
    }

    pub fn verify_span(run_id: &str, count: usize) -> Span {
        info_span!("teamforge.verify", run_id = %run_id, versions = count)
    }

    pub fn verify_version_span(version: &str) -> Span {
        info_span!("teamforge.verify_version", version = %version)
    }
}
