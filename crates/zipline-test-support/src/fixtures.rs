//! Canned trees and pipeline limits.

use anyhow::Result;
use zipline_config::PipelineConfig;

use crate::memory::MemoryTree;

/// `/a/f1` (10 bytes) and `/a/b/f2` (20 bytes).
///
/// # Errors
///
/// Never in practice; paths are static.
pub fn nested_tree() -> Result<MemoryTree> {
    MemoryTree::new()
        .dir("/a")?
        .file("/a/f1", b"0123456789".to_vec())?
        .dir("/a/b")?
        .file("/a/b/f2", b"abcdefghijklmnopqrst".to_vec())
}

/// Flat directory `/flat` holding `count` files named `f000`, `f001`, ...
///
/// # Errors
///
/// Never in practice; paths are generated.
pub fn flat_tree(count: usize) -> Result<MemoryTree> {
    let mut tree = MemoryTree::new().dir("/flat")?;
    for index in 0..count {
        tree = tree.file(&format!("/flat/f{index:03}"), format!("file {index}"))?;
    }
    Ok(tree)
}

/// Default limits with a one second mover deadline.
#[must_use]
pub fn fast_limits() -> PipelineConfig {
    PipelineConfig {
        mover_start_timeout_secs: 1,
        mover_kill_timeout_secs: 1,
        ..PipelineConfig::default()
    }
}
