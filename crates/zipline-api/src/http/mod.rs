//! HTTP surface modules.

/// Archive download handler.
pub mod archive;
/// Shared constants and header names.
pub mod constants;
/// Problem response helpers and error types.
pub mod errors;
/// Health and metrics endpoints.
pub mod health;
/// Router construction and server host.
pub mod router;
/// Subject extraction from trusted headers.
pub mod subject;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
