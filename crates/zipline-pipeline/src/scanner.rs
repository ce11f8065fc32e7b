//! Breadth-first directory discovery feeding the file queue.
//!
//! # Design
//! - One scan task per request walks directories in FIFO order.
//! - Pushes into the bounded file queue suspend on capacity; nothing is dropped.
//! - A drop guard leaves the scan barrier on every exit path (finish, panic, abort),
//!   so the discovery queues are always terminated.

use std::sync::Arc;

use tracing::{Instrument, debug, info_span, trace};
use zipline_core::{
    AttributeSet, FileAttribute, FileType, FsPath, NamespaceService, can_list, can_read,
};
use zipline_telemetry::Metrics;

use crate::problems::{Problem, ProblemStage};
use crate::queue::Polled;
use crate::request::{ArchiveRequest, DiscoveredFile};

/// Attributes the pipeline needs from every listing.
#[must_use]
pub fn scan_attributes() -> AttributeSet {
    AttributeSet::of([
        FileAttribute::Type,
        FileAttribute::Size,
        FileAttribute::Mode,
        FileAttribute::Owner,
        FileAttribute::OwnerGroup,
        FileAttribute::CreationTime,
        FileAttribute::AccessTime,
        FileAttribute::ModificationTime,
    ])
}

/// Lists directories and feeds regular files into the request's file queue.
#[derive(Clone)]
pub struct DirectoryScanner {
    namespace: Arc<dyn NamespaceService>,
    required: AttributeSet,
    metrics: Metrics,
}

struct ScanGuard {
    request: Arc<ArchiveRequest>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if self.request.scans().leave() {
            self.request.close_discovery();
        }
    }
}

impl DirectoryScanner {
    /// Build a scanner requesting `transfer_attributes` on top of the pipeline's own.
    #[must_use]
    pub fn new(
        namespace: Arc<dyn NamespaceService>,
        transfer_attributes: &AttributeSet,
        metrics: Metrics,
    ) -> Self {
        Self {
            namespace,
            required: scan_attributes().union(transfer_attributes),
            metrics,
        }
    }

    /// Attributes requested on every listing.
    #[must_use]
    pub const fn required_attributes(&self) -> &AttributeSet {
        &self.required
    }

    /// Schedule discovery of `request.root()`.
    ///
    /// Returns `false` when the request no longer accepts tasks; the discovery
    /// queues are terminated in that case.
    pub fn start_listing(&self, request: &Arc<ArchiveRequest>) -> bool {
        if !request.scans().enter() {
            return false;
        }
        let guard = ScanGuard {
            request: Arc::clone(request),
        };
        let scanner = self.clone();
        let span = info_span!("archive.scan", request_id = %request.id());
        request.spawn(async move { scanner.run(guard).await }.instrument(span))
    }

    async fn run(self, guard: ScanGuard) {
        let request = Arc::clone(&guard.request);
        let mut current = request.root().clone();
        loop {
            self.scan_directory(&request, &current).await;
            if request.is_cancelled() {
                break;
            }
            match request.directories().try_recv() {
                Polled::Item(next) => {
                    // Register the next scan before retiring this one so the
                    // barrier cannot reach zero between them.
                    if !request.scans().enter() {
                        break;
                    }
                    request.scans().leave();
                    current = next;
                }
                Polled::Empty | Polled::End => break,
            }
        }
        drop(guard);
    }

    async fn scan_directory(&self, request: &ArchiveRequest, directory: &FsPath) {
        trace!(directory = %directory, "listing directory");
        let entries = match self
            .namespace
            .list(request.subject(), directory, &self.required)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                self.metrics.inc_problem(ProblemStage::Listing.as_str());
                request.record_problem(Problem::from_error(
                    ProblemStage::Listing,
                    directory.clone(),
                    &err,
                ));
                return;
            }
        };

        for entry in entries {
            if request.is_cancelled() {
                return;
            }
            let path = match directory.join(&entry.name) {
                Ok(path) => path,
                Err(err) => {
                    self.metrics.inc_problem(ProblemStage::Listing.as_str());
                    request.record_problem(Problem::from_error(
                        ProblemStage::Listing,
                        directory.clone(),
                        &err,
                    ));
                    continue;
                }
            };

            match entry.attributes.file_type {
                FileType::Regular => {
                    if !can_read(request.subject(), &entry.attributes) {
                        debug!(path = %path, "skipping unreadable file");
                        continue;
                    }
                    let file = DiscoveredFile::new(path, entry.attributes);
                    if request
                        .files()
                        .push(file, request.cancellation())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                FileType::Directory => {
                    if !request.recursive() {
                        continue;
                    }
                    if !can_list(request.subject(), &entry.attributes) {
                        debug!(path = %path, "skipping unlistable directory");
                        continue;
                    }
                    if request.directories().try_offer(path).is_err() {
                        return;
                    }
                }
                FileType::Link | FileType::Special => {
                    trace!(path = %path, kind = ?entry.attributes.file_type, "ignoring non-regular entry");
                }
            }
        }
    }
}
