//! Shared state of one archive request.
//!
//! # Design
//! - One `ArchiveRequest` per download, shared as `Arc` by scanner, starter and writer.
//! - Every mutable piece is internally synchronised; no outer lock exists.
//! - `cancel` is synchronous and idempotent so it can run from any thread,
//!   including the blocking writer and client-disconnect paths.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use zipline_config::PipelineConfig;
use zipline_core::{FileAttributes, FsPath, Subject};

use crate::barrier::ScanBarrier;
use crate::lease::ReadyTransfer;
use crate::problems::{Problem, ProblemLog};
use crate::queue::SentinelQueue;
use crate::tasks::TaskRegistry;

/// A regular file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute namespace path.
    pub path: FsPath,
    /// Attributes captured at listing time.
    pub attributes: FileAttributes,
}

impl DiscoveredFile {
    #[must_use]
    /// Pair a path with its attributes.
    pub const fn new(path: FsPath, attributes: FileAttributes) -> Self {
        Self { path, attributes }
    }
}

/// State for one archive download.
pub struct ArchiveRequest {
    id: Uuid,
    root: FsPath,
    subject: Subject,
    recursive: bool,
    files: SentinelQueue<DiscoveredFile>,
    directories: SentinelQueue<FsPath>,
    transfers: SentinelQueue<ReadyTransfer>,
    scans: ScanBarrier,
    tasks: TaskRegistry,
    cancellation: CancellationToken,
    cancelled: AtomicBool,
    problems: ProblemLog,
}

impl ArchiveRequest {
    /// Create request state sized by `limits`.
    #[must_use]
    pub fn new(root: FsPath, subject: Subject, recursive: bool, limits: &PipelineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            root,
            subject,
            recursive,
            files: SentinelQueue::bounded(limits.file_queue_capacity),
            directories: SentinelQueue::unbounded(),
            transfers: SentinelQueue::bounded(limits.transfer_queue_capacity),
            scans: ScanBarrier::new(),
            tasks: TaskRegistry::new(),
            cancellation: CancellationToken::new(),
            cancelled: AtomicBool::new(false),
            problems: ProblemLog::default(),
        }
    }

    /// Request identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Directory being archived.
    #[must_use]
    pub const fn root(&self) -> &FsPath {
        &self.root
    }

    /// Caller the archive is built for.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Whether subdirectories are descended into.
    #[must_use]
    pub const fn recursive(&self) -> bool {
        self.recursive
    }

    /// Bounded queue of discovered files.
    #[must_use]
    pub const fn files(&self) -> &SentinelQueue<DiscoveredFile> {
        &self.files
    }

    /// Unbounded queue of directories awaiting a scan.
    #[must_use]
    pub const fn directories(&self) -> &SentinelQueue<FsPath> {
        &self.directories
    }

    /// Queue of ready transfers; closing it sets the final flag.
    #[must_use]
    pub const fn transfers(&self) -> &SentinelQueue<ReadyTransfer> {
        &self.transfers
    }

    /// In-flight scan counter.
    #[must_use]
    pub const fn scans(&self) -> &ScanBarrier {
        &self.scans
    }

    /// Token fired on cancellation.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Problems recorded so far.
    #[must_use]
    pub const fn problems(&self) -> &ProblemLog {
        &self.problems
    }

    /// Record a per-file problem.
    pub fn record_problem(&self, problem: Problem) {
        warn!(
            request_id = %self.id,
            stage = problem.stage.as_str(),
            path = %problem.path,
            detail = %problem.detail,
            "archive entry skipped"
        );
        self.problems.record(problem);
    }

    /// Spawn a task owned by this request.
    ///
    /// Returns `false` (dropping `task`) once the request is cancelled.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_cancelled() {
            return false;
        }
        self.tasks.spawn(task)
    }

    /// Terminate both discovery queues; called when the last scan finishes.
    pub fn close_discovery(&self) {
        let files_closed = self.files.close();
        self.directories.close();
        if files_closed {
            debug!(request_id = %self.id, "file discovery complete");
        }
    }

    /// Cancel the request. Safe to call repeatedly and from any thread.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.files.close();
        self.directories.close();
        self.transfers.close();
        drop(self.files.drain());
        drop(self.directories.drain());
        let abandoned = self.transfers.drain();
        let released = abandoned.len();
        drop(abandoned);
        self.cancellation.cancel();
        self.tasks.shutdown();
        debug!(request_id = %self.id, released, "archive request cancelled");
    }
}

impl Drop for ArchiveRequest {
    fn drop(&mut self) {
        self.tasks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Polled;

    fn request() -> anyhow::Result<ArchiveRequest> {
        Ok(ArchiveRequest::new(
            FsPath::parse("/a")?,
            Subject::root(),
            true,
            &PipelineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn cancel_terminates_queues_and_refuses_tasks() -> anyhow::Result<()> {
        let request = request()?;
        assert!(
            request
                .files()
                .try_offer(DiscoveredFile::new(
                    FsPath::parse("/a/f1")?,
                    FileAttributes::regular(1)
                ))
                .is_ok()
        );
        request.cancel();
        request.cancel();

        assert!(request.is_cancelled());
        assert!(request.cancellation().is_cancelled());
        assert_eq!(request.files().try_recv(), Polled::End);
        assert_eq!(request.directories().try_recv(), Polled::End);
        assert!(request.transfers().is_closed());
        assert!(!request.spawn(async {}));
        Ok(())
    }

    #[test]
    fn close_discovery_inserts_markers_once() -> anyhow::Result<()> {
        let request = request()?;
        request.close_discovery();
        assert!(!request.files().close());
        assert!(!request.directories().close());
        assert!(!request.transfers().is_closed());
        Ok(())
    }

    #[test]
    fn queues_follow_configured_limits() -> anyhow::Result<()> {
        let limits = PipelineConfig {
            file_queue_capacity: 7,
            transfer_queue_capacity: 3,
            ..PipelineConfig::default()
        };
        let request = ArchiveRequest::new(FsPath::root(), Subject::nobody(), false, &limits);
        assert_eq!(request.files().capacity(), Some(7));
        assert_eq!(request.transfers().capacity(), Some(3));
        assert_eq!(request.directories().capacity(), None);
        assert!(!request.recursive());
        Ok(())
    }
}
