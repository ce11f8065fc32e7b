use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use zipline_api::ApiServer;
use zipline_config::{AppConfig, ConfigLoader, LogFormatSetting};
use zipline_localfs::{LocalNamespace, LocalTransferService};
use zipline_pipeline::ArchiveService;
use zipline_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the server.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config = ConfigLoader::from_env()
            .load()
            .map_err(|err| AppError::config("config.load", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self { config, telemetry })
    }
}

/// Entry point for the server boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, storage checks or the listener fail.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence over injected dependencies; serves until `shutdown` resolves.
pub(crate) async fn run_app_with<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies { config, telemetry } = dependencies;
    let logging = LoggingConfig {
        level: &config.telemetry.level,
        format: log_format(config.telemetry.format),
        build_sha: build_sha(),
    };
    zipline_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("serve");

    info!(root = %config.storage.root.display(), "archive server bootstrap starting");
    let archives = build_archive_service(&config, telemetry.clone())?;
    let api = ApiServer::new(Arc::clone(&archives), telemetry);

    let addr = config.server.socket_addr();
    info!(addr = %addr, "launching API listener");
    let draining = Arc::clone(&archives);
    let serve_result = api
        .serve(addr, async move {
            shutdown.await;
            info!("shutdown requested; cancelling active archives");
            draining.shutdown();
        })
        .await;

    archives.shutdown();
    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("API server shutdown complete");
    Ok(())
}

/// Build the archive service over the configured local storage root.
///
/// # Errors
///
/// Returns an error when the storage root is missing or not a directory.
pub fn build_archive_service(config: &AppConfig, telemetry: Metrics) -> AppResult<Arc<ArchiveService>> {
    let root = config.storage.root.as_path();
    verify_storage_root(root)?;
    let namespace = Arc::new(LocalNamespace::new(root));
    let transfers = Arc::new(LocalTransferService::new(root));
    Ok(Arc::new(ArchiveService::new(
        namespace,
        transfers,
        config.pipeline.clone(),
        telemetry,
    )))
}

fn verify_storage_root(root: &Path) -> AppResult<()> {
    let metadata = std::fs::metadata(root).map_err(|source| AppError::Io {
        operation: "storage.metadata",
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(AppError::StorageRoot {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

const fn log_format(setting: Option<LogFormatSetting>) -> LogFormat {
    match setting {
        Some(LogFormatSetting::Json) => LogFormat::Json,
        Some(LogFormatSetting::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    warn!("ctrl-c received");
}
