#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Archive server bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `error.rs` (bootstrap failures).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level error types.
pub mod error;

pub use bootstrap::{build_archive_service, run_app};
pub use error::{AppError, AppResult};
