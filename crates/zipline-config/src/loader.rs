//! YAML and environment backed configuration loader.
//!
//! # Design
//! - A YAML document (path from `ZIPLINE_CONFIG`) provides the base layer.
//! - `ZIPLINE_*` variables override individual fields.
//! - Lookup is injectable so tests never touch the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, LogFormatSetting};
use crate::validate::validate;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "ZIPLINE_CONFIG";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds an [`AppConfig`] from a file plus environment overrides.
pub struct ConfigLoader {
    lookup: Lookup,
}

impl ConfigLoader {
    /// Loader reading the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Loader using a caller-supplied variable lookup.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Resolve, merge and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, when an
    /// override cannot be parsed, or when validation fails.
    pub fn load(&self) -> ConfigResult<AppConfig> {
        let mut config = match self.var(CONFIG_PATH_ENV) {
            Some(path) => load_file(Path::new(&path))?,
            None => {
                debug!("no configuration file configured; starting from defaults");
                AppConfig::default()
            }
        };
        self.apply_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn apply_overrides(&self, config: &mut AppConfig) -> ConfigResult<()> {
        if let Some(value) = self.parsed("ZIPLINE_BIND_ADDR", "server", "bind_addr")? {
            config.server.bind_addr = value;
        }
        if let Some(value) = self.parsed("ZIPLINE_HTTP_PORT", "server", "http_port")? {
            config.server.http_port = value;
        }
        if let Some(value) = self.var("ZIPLINE_STORAGE_ROOT") {
            config.storage.root = PathBuf::from(value);
        }
        if let Some(value) = self.var("ZIPLINE_LOG_LEVEL") {
            config.telemetry.level = value;
        }
        if let Some(value) = self.var("ZIPLINE_LOG_FORMAT") {
            let format = LogFormatSetting::from_str(&value).map_err(|()| {
                ConfigError::invalid("telemetry", "format", &value, "unknown_format")
            })?;
            config.telemetry.format = Some(format);
        }
        if let Some(value) =
            self.parsed("ZIPLINE_FILE_QUEUE_CAPACITY", "pipeline", "file_queue_capacity")?
        {
            config.pipeline.file_queue_capacity = value;
        }
        if let Some(value) = self.parsed(
            "ZIPLINE_TRANSFER_QUEUE_CAPACITY",
            "pipeline",
            "transfer_queue_capacity",
        )? {
            config.pipeline.transfer_queue_capacity = value;
        }
        if let Some(value) = self.parsed(
            "ZIPLINE_MOVER_START_TIMEOUT_SECS",
            "pipeline",
            "mover_start_timeout_secs",
        )? {
            config.pipeline.mover_start_timeout_secs = value;
        }
        if let Some(value) = self.parsed(
            "ZIPLINE_MOVER_KILL_TIMEOUT_SECS",
            "pipeline",
            "mover_kill_timeout_secs",
        )? {
            config.pipeline.mover_kill_timeout_secs = value;
        }
        if let Some(value) =
            self.parsed("ZIPLINE_COMPRESSION_LEVEL", "pipeline", "compression_level")?
        {
            config.pipeline.compression_level = value;
        }
        if let Some(value) =
            self.parsed("ZIPLINE_PROBLEMS_MANIFEST", "pipeline", "problems_manifest")?
        {
            config.pipeline.problems_manifest = value;
        }
        Ok(())
    }

    fn parsed<T: FromStr>(
        &self,
        key: &str,
        section: &'static str,
        field: &'static str,
    ) -> ConfigResult<Option<T>> {
        self.var(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| ConfigError::invalid(section, field, &raw, "unparseable_override"))
            })
            .transpose()
    }
}

fn load_file(path: &Path) -> ConfigResult<AppConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded configuration file");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn loader(vars: &[(&str, &str)]) -> ConfigLoader {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        ConfigLoader::with_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() -> ConfigResult<()> {
        assert_eq!(loader(&[]).load()?, AppConfig::default());
        Ok(())
    }

    #[test]
    fn overrides_replace_fields() -> ConfigResult<()> {
        let config = loader(&[
            ("ZIPLINE_HTTP_PORT", "9000"),
            ("ZIPLINE_BIND_ADDR", "0.0.0.0"),
            ("ZIPLINE_FILE_QUEUE_CAPACITY", "16"),
            ("ZIPLINE_LOG_FORMAT", "JSON"),
            ("ZIPLINE_PROBLEMS_MANIFEST", "true"),
            ("ZIPLINE_STORAGE_ROOT", "/srv/data"),
        ])
        .load()?;
        assert_eq!(config.server.http_port, 9000);
        assert!(config.server.bind_addr.is_unspecified());
        assert_eq!(config.pipeline.file_queue_capacity, 16);
        assert_eq!(config.telemetry.format, Some(LogFormatSetting::Json));
        assert!(config.pipeline.problems_manifest);
        assert_eq!(config.storage.root, PathBuf::from("/srv/data"));
        Ok(())
    }

    #[test]
    fn unparseable_override_is_reported() {
        let err = loader(&[("ZIPLINE_HTTP_PORT", "eighty")]).load();
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "http_port",
                reason: "unparseable_override",
                ..
            })
        ));
        let err = loader(&[("ZIPLINE_LOG_FORMAT", "xml")]).load();
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "format",
                ..
            })
        ));
    }

    #[test]
    fn overrides_are_validated() {
        let err = loader(&[("ZIPLINE_COMPRESSION_LEVEL", "42")]).load();
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                field: "compression_level",
                reason: "out_of_range",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = loader(&[(CONFIG_PATH_ENV, "/nonexistent/zipline.yaml")]).load();
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
