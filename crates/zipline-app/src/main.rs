#![forbid(unsafe_code)]
#![deny(unused_must_use, clippy::all)]
#![warn(missing_docs, clippy::pedantic)]

//! Binary entrypoint that wires the archive services together and serves HTTP.

use zipline_app::{AppResult, run_app};

/// Bootstraps the archive server and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
