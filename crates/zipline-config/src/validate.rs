//! Validation rules applied after loading.

use crate::defaults::{MAX_COMPRESSION_LEVEL, MIN_COPY_BUFFER_BYTES};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, PipelineConfig, ServerConfig, StorageConfig, TelemetryConfig};

/// Validate every section of an [`AppConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    validate_server(&config.server)?;
    validate_pipeline(&config.pipeline)?;
    validate_storage(&config.storage)?;
    validate_telemetry(&config.telemetry)
}

fn validate_server(server: &ServerConfig) -> ConfigResult<()> {
    if server.http_port == 0 {
        return Err(ConfigError::invalid(
            "server",
            "http_port",
            server.http_port,
            "must_be_positive",
        ));
    }
    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> ConfigResult<()> {
    const SECTION: &str = "pipeline";

    if pipeline.file_queue_capacity == 0 {
        return Err(ConfigError::invalid(
            SECTION,
            "file_queue_capacity",
            pipeline.file_queue_capacity,
            "must_be_positive",
        ));
    }
    if pipeline.transfer_queue_capacity == 0 {
        return Err(ConfigError::invalid(
            SECTION,
            "transfer_queue_capacity",
            pipeline.transfer_queue_capacity,
            "must_be_positive",
        ));
    }
    if pipeline.mover_start_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            SECTION,
            "mover_start_timeout_secs",
            pipeline.mover_start_timeout_secs,
            "must_be_positive",
        ));
    }
    if pipeline.mover_kill_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            SECTION,
            "mover_kill_timeout_secs",
            pipeline.mover_kill_timeout_secs,
            "must_be_positive",
        ));
    }
    if !(0..=MAX_COMPRESSION_LEVEL).contains(&pipeline.compression_level) {
        return Err(ConfigError::invalid(
            SECTION,
            "compression_level",
            pipeline.compression_level,
            "out_of_range",
        ));
    }
    if pipeline.copy_buffer_bytes < MIN_COPY_BUFFER_BYTES {
        return Err(ConfigError::invalid(
            SECTION,
            "copy_buffer_bytes",
            pipeline.copy_buffer_bytes,
            "too_small",
        ));
    }
    if pipeline.stream_buffer_bytes < pipeline.copy_buffer_bytes {
        return Err(ConfigError::invalid(
            SECTION,
            "stream_buffer_bytes",
            pipeline.stream_buffer_bytes,
            "smaller_than_copy_buffer",
        ));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> ConfigResult<()> {
    if storage.root.as_os_str().is_empty() {
        return Err(ConfigError::invalid("storage", "root", "", "must_not_be_empty"));
    }
    Ok(())
}

fn validate_telemetry(telemetry: &TelemetryConfig) -> ConfigResult<()> {
    if telemetry.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "telemetry",
            "level",
            &telemetry.level,
            "must_not_be_empty",
        ));
    }
    Ok(())
}
