#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Configuration model and loader for the zipline service.
//!
//! Layout: `model.rs` (typed sections), `defaults.rs` (constants),
//! `validate.rs` (post-load checks), `loader.rs` (YAML + env merge),
//! `error.rs` (error taxonomy).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, ConfigLoader};
pub use model::{
    AppConfig, LogFormatSetting, PipelineConfig, ServerConfig, StorageConfig, TelemetryConfig,
};
pub use validate::validate;
