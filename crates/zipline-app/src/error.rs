//! # Design
//!
//! - Centralize application-level errors for bootstrap and serving.
//! - Keep error messages constant while carrying context fields for debugging.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        #[source]
        source: zipline_config::ConfigError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        #[source]
        source: zipline_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        #[source]
        source: zipline_telemetry::TelemetryError,
    },
    /// Filesystem checks failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// The storage root is not a directory.
    #[error("storage root is not a directory")]
    StorageRoot {
        /// Configured root.
        path: PathBuf,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: zipline_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: zipline_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: zipline_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_and_sources_preserved() {
        let err = AppError::Io {
            operation: "storage.metadata",
            path: PathBuf::from("/srv"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_string(), "io operation failed");
        assert!(err.source().is_some());

        let root = AppError::StorageRoot {
            path: PathBuf::from("/srv/file"),
        };
        assert!(root.source().is_none());
    }
}
