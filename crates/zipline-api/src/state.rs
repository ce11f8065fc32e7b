//! Shared handler state.

use std::sync::Arc;

use zipline_pipeline::ArchiveService;
use zipline_telemetry::Metrics;

/// Dependencies shared by every handler.
pub struct ApiState {
    /// Archive request factory.
    pub archives: Arc<ArchiveService>,
    /// Metrics registry rendered at `/metrics`.
    pub telemetry: Metrics,
}

impl ApiState {
    /// Bundle handler dependencies.
    #[must_use]
    pub const fn new(archives: Arc<ArchiveService>, telemetry: Metrics) -> Self {
        Self {
            archives,
            telemetry,
        }
    }
}
