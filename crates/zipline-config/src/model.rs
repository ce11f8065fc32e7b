//! Typed configuration model.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Archive pipeline limits and timeouts.
    pub pipeline: PipelineConfig,
    /// Storage backend settings.
    pub storage: StorageConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface the API binds to.
    pub bind_addr: IpAddr,
    /// TCP port the API listens on.
    pub http_port: u16,
}

impl ServerConfig {
    /// Socket address assembled from the bind address and port.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            http_port: defaults::http_port(),
        }
    }
}

/// Limits governing a single archive request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Capacity of the discovered-file queue.
    pub file_queue_capacity: usize,
    /// Capacity of the ready-transfer queue.
    pub transfer_queue_capacity: usize,
    /// Deadline for a mover to become ready.
    pub mover_start_timeout_secs: u64,
    /// Deadline for a best-effort mover kill.
    pub mover_kill_timeout_secs: u64,
    /// Deflate level (0-9).
    pub compression_level: i64,
    /// Relay chunk size.
    pub copy_buffer_bytes: usize,
    /// Size of the pipe between writer and response body.
    pub stream_buffer_bytes: usize,
    /// Append a trailing entry listing per-file problems.
    pub problems_manifest: bool,
}

impl PipelineConfig {
    /// Mover start deadline as a [`Duration`].
    #[must_use]
    pub const fn mover_start_timeout(&self) -> Duration {
        Duration::from_secs(self.mover_start_timeout_secs)
    }

    /// Mover kill deadline as a [`Duration`].
    #[must_use]
    pub const fn mover_kill_timeout(&self) -> Duration {
        Duration::from_secs(self.mover_kill_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            file_queue_capacity: defaults::file_queue_capacity(),
            transfer_queue_capacity: defaults::transfer_queue_capacity(),
            mover_start_timeout_secs: defaults::mover_start_timeout_secs(),
            mover_kill_timeout_secs: defaults::mover_kill_timeout_secs(),
            compression_level: defaults::compression_level(),
            copy_buffer_bytes: defaults::copy_buffer_bytes(),
            stream_buffer_bytes: defaults::stream_buffer_bytes(),
            problems_manifest: false,
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Local directory exposed as the namespace root.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: defaults::storage_root(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

impl FromStr for LogFormatSetting {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(()),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format; inferred from the build profile when absent.
    pub format: Option<LogFormatSetting>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            format: None,
        }
    }
}
