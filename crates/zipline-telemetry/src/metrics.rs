//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Labels are fixed, low-cardinality strings (stage, error kind, outcome).

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    archive_requests_total: IntCounterVec,
    archive_entries_total: IntCounter,
    archive_bytes_total: IntCounter,
    archive_problems_total: IntCounterVec,
    transfer_start_failures_total: IntCounterVec,
    mover_kill_failures_total: IntCounter,
    active_archives: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Archives currently streaming.
    pub active_archives: i64,
    /// Entries written across all archives.
    pub archive_entries_total: u64,
    /// File bytes relayed across all archives.
    pub archive_bytes_total: u64,
    /// Best-effort mover kills that failed or timed out.
    pub mover_kill_failures_total: u64,
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let archive_requests_total = counter_vec(
            "archive_requests_total",
            "Archive requests by final outcome",
            &["outcome"],
        )?;
        let archive_entries_total =
            counter("archive_entries_total", "ZIP entries written to clients")?;
        let archive_bytes_total =
            counter("archive_bytes_total", "File bytes relayed into archives")?;
        let archive_problems_total = counter_vec(
            "archive_problems_total",
            "Per-file problems recorded by pipeline stage",
            &["stage"],
        )?;
        let transfer_start_failures_total = counter_vec(
            "transfer_start_failures_total",
            "Transfer starts that failed by error kind",
            &["kind"],
        )?;
        let mover_kill_failures_total = counter(
            "mover_kill_failures_total",
            "Best-effort mover kills that failed or timed out",
        )?;
        let active_archives = IntGauge::with_opts(Opts::new(
            "active_archives",
            "Archives currently being streamed",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "active_archives",
            source,
        })?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "archive_requests_total", &archive_requests_total)?;
        register(&registry, "archive_entries_total", &archive_entries_total)?;
        register(&registry, "archive_bytes_total", &archive_bytes_total)?;
        register(&registry, "archive_problems_total", &archive_problems_total)?;
        register(
            &registry,
            "transfer_start_failures_total",
            &transfer_start_failures_total,
        )?;
        register(
            &registry,
            "mover_kill_failures_total",
            &mover_kill_failures_total,
        )?;
        register(&registry, "active_archives", &active_archives)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                archive_requests_total,
                archive_entries_total,
                archive_bytes_total,
                archive_problems_total,
                transfer_start_failures_total,
                mover_kill_failures_total,
                active_archives,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count a finished archive request (`completed`, `failed`, `cancelled`).
    pub fn inc_archive_request(&self, outcome: &str) {
        self.inner
            .archive_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one written entry and the bytes it carried.
    pub fn record_entry(&self, bytes: u64) {
        self.inner.archive_entries_total.inc();
        self.inner.archive_bytes_total.inc_by(bytes);
    }

    /// Count a recorded problem for `stage` (`listing`, `transfer`, `relay`).
    pub fn inc_problem(&self, stage: &str) {
        self.inner
            .archive_problems_total
            .with_label_values(&[stage])
            .inc();
    }

    /// Count a failed transfer start by error kind.
    pub fn inc_transfer_start_failure(&self, kind: &str) {
        self.inner
            .transfer_start_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count a mover kill that failed or timed out.
    pub fn inc_mover_kill_failure(&self) {
        self.inner.mover_kill_failures_total.inc();
    }

    /// A new archive started streaming.
    pub fn archive_started(&self) {
        self.inner.active_archives.inc();
    }

    /// An archive finished, successfully or not.
    pub fn archive_finished(&self) {
        self.inner.active_archives.dec();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_archives: self.inner.active_archives.get(),
            archive_entries_total: self.inner.archive_entries_total.get(),
            archive_bytes_total: self.inner.archive_bytes_total.get(),
            mover_kill_failures_total: self.inner.mover_kill_failures_total.get(),
        }
    }

    /// Current value of the problem counter for `stage`.
    #[must_use]
    pub fn problems(&self, stage: &str) -> u64 {
        self.inner
            .archive_problems_total
            .with_label_values(&[stage])
            .get()
    }

    /// Current value of the transfer start failure counter for `kind`.
    #[must_use]
    pub fn transfer_start_failures(&self, kind: &str) -> u64 {
        self.inner
            .transfer_start_failures_total
            .with_label_values(&[kind])
            .get()
    }

    /// Current value of the archive request counter for `outcome`.
    #[must_use]
    pub fn archive_requests(&self, outcome: &str) -> u64 {
        self.inner
            .archive_requests_total
            .with_label_values(&[outcome])
            .get()
    }
}
