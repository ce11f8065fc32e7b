//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The configuration document could not be read.
    #[error("failed to read configuration file")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration document was not valid YAML for the schema.
    #[error("failed to parse configuration file")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        value: impl ToString,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value: Some(value.to_string()),
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant() {
        let err = ConfigError::invalid("pipeline", "file_queue_capacity", 0, "must_be_positive");
        assert_eq!(err.to_string(), "invalid configuration field");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                section: "pipeline",
                field: "file_queue_capacity",
                value: Some(ref value),
                reason: "must_be_positive",
            } if value == "0"
        ));

        let io_err = ConfigError::Io {
            path: PathBuf::from("zipline.yaml"),
            source: io::Error::other("denied"),
        };
        assert_eq!(io_err.to_string(), "failed to read configuration file");
        assert!(io_err.source().is_some());
    }
}
