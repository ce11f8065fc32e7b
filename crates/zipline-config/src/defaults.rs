//! Default values for every configuration knob.
//!
//! # Design
//! - Keep the pipeline limits explicit so deployments can audit them.
//! - Serde default functions live next to the constants they expose.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Loopback bind address used when none is configured.
pub const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// HTTP port used when none is configured.
pub const DEFAULT_HTTP_PORT: u16 = 8089;
/// Maximum number of discovered files buffered ahead of the transfer starter.
pub const DEFAULT_FILE_QUEUE_CAPACITY: usize = 1000;
/// Maximum number of ready transfers held open ahead of the archive writer.
pub const DEFAULT_TRANSFER_QUEUE_CAPACITY: usize = 2;
/// Seconds to wait for a mover to report its redirect target.
pub const DEFAULT_MOVER_START_TIMEOUT_SECS: u64 = 180;
/// Seconds granted to a best-effort mover kill.
pub const DEFAULT_MOVER_KILL_TIMEOUT_SECS: u64 = 10;
/// Deflate effort; favour throughput over ratio.
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 1;
/// Chunk size used when relaying file bytes into an entry.
pub const DEFAULT_COPY_BUFFER_BYTES: usize = 64 * 1024;
/// In-memory pipe between the archive writer and the response body.
pub const DEFAULT_STREAM_BUFFER_BYTES: usize = 256 * 1024;
/// Smallest accepted copy buffer.
pub const MIN_COPY_BUFFER_BYTES: usize = 1024;
/// Highest accepted Deflate level.
pub const MAX_COMPRESSION_LEVEL: i64 = 9;
/// Log level applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub(crate) const fn bind_addr() -> IpAddr {
    DEFAULT_BIND_ADDR
}

pub(crate) const fn http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

pub(crate) const fn file_queue_capacity() -> usize {
    DEFAULT_FILE_QUEUE_CAPACITY
}

pub(crate) const fn transfer_queue_capacity() -> usize {
    DEFAULT_TRANSFER_QUEUE_CAPACITY
}

pub(crate) const fn mover_start_timeout_secs() -> u64 {
    DEFAULT_MOVER_START_TIMEOUT_SECS
}

pub(crate) const fn mover_kill_timeout_secs() -> u64 {
    DEFAULT_MOVER_KILL_TIMEOUT_SECS
}

pub(crate) const fn compression_level() -> i64 {
    DEFAULT_COMPRESSION_LEVEL
}

pub(crate) const fn copy_buffer_bytes() -> usize {
    DEFAULT_COPY_BUFFER_BYTES
}

pub(crate) const fn stream_buffer_bytes() -> usize {
    DEFAULT_STREAM_BUFFER_BYTES
}

pub(crate) fn storage_root() -> PathBuf {
    PathBuf::from(".")
}

pub(crate) fn log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
