//! Router construction and server host for the archive API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Request, routing::get};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};
use zipline_pipeline::ArchiveService;
use zipline_telemetry::{Metrics, build_sha};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::archive::{archive_path, archive_root};
use crate::http::constants::HEADER_REQUEST_ID;
use crate::http::health::{health, metrics};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper hosting the archive endpoints.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Wire handlers, tracing and metrics around `archives`.
    #[must_use]
    pub fn new(archives: Arc<ArchiveService>, telemetry: Metrics) -> Self {
        let state = Arc::new(ApiState::new(archives, telemetry.clone()));
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(zipline_telemetry::set_request_id_layer())
            .layer(zipline_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/v1/archive", get(archive_root))
            .route("/v1/archive/", get(archive_root))
            .route("/v1/archive/{*path}", get(archive_path))
            .route_layer(layered)
            .with_state(state);

        Self { router }
    }

    /// The assembled router, for embedding or in-process testing.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `addr` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(addr = %addr, "starting archive API");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }
}
