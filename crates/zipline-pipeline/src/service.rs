//! Request factory tying scanner, starter and writer together.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use tokio::io::DuplexStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;
use zipline_config::PipelineConfig;
use zipline_core::{FsPath, NamespaceService, Subject, TransferService, can_list};
use zipline_telemetry::Metrics;

use crate::error::{ArchiveError, ArchiveResult};
use crate::request::ArchiveRequest;
use crate::scanner::DirectoryScanner;
use crate::starter::TransferStarter;
use crate::writer::{ArchiveWriter, DeliverySummary};

type ActiveRequests = Arc<Mutex<HashMap<Uuid, Weak<ArchiveRequest>>>>;

/// Builds and runs archive requests against one namespace and transfer backend.
pub struct ArchiveService {
    namespace: Arc<dyn NamespaceService>,
    scanner: DirectoryScanner,
    starter: TransferStarter,
    writer: ArchiveWriter,
    limits: PipelineConfig,
    metrics: Metrics,
    active: ActiveRequests,
}

/// A running archive streamed through an in-memory pipe.
pub struct ArchiveDownload {
    body: DuplexStream,
    request: Arc<ArchiveRequest>,
    completion: ArchiveCompletion,
}

impl ArchiveDownload {
    /// Shared request state, e.g. to cancel on client disconnect.
    #[must_use]
    pub const fn request(&self) -> &Arc<ArchiveRequest> {
        &self.request
    }

    /// Split into the ZIP byte stream, the request and the completion future.
    #[must_use]
    pub fn into_parts(self) -> (DuplexStream, Arc<ArchiveRequest>, ArchiveCompletion) {
        (self.body, self.request, self.completion)
    }
}

/// Resolves once the writer has finished or aborted the archive.
pub struct ArchiveCompletion {
    handle: JoinHandle<ArchiveResult<DeliverySummary>>,
}

impl Future for ArchiveCompletion {
    type Output = ArchiveResult<DeliverySummary>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined
                .map_err(|source| ArchiveError::Join { source })
                .and_then(|result| result)
        })
    }
}

/// Keeps the active gauge and registry in step with the writer thread.
struct ActiveArchive {
    id: Uuid,
    metrics: Metrics,
    active: ActiveRequests,
}

impl Drop for ActiveArchive {
    fn drop(&mut self) {
        self.metrics.archive_finished();
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl ArchiveService {
    /// Wire the pipeline stages to the given backends.
    #[must_use]
    pub fn new(
        namespace: Arc<dyn NamespaceService>,
        transfers: Arc<dyn TransferService>,
        limits: PipelineConfig,
        metrics: Metrics,
    ) -> Self {
        let scanner = DirectoryScanner::new(
            Arc::clone(&namespace),
            &transfers.required_attributes(),
            metrics.clone(),
        );
        let starter = TransferStarter::new(
            transfers,
            limits.mover_start_timeout(),
            limits.mover_kill_timeout(),
            metrics.clone(),
        );
        let writer = ArchiveWriter::new(&limits, metrics.clone());
        Self {
            namespace,
            scanner,
            starter,
            writer,
            limits,
            metrics,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start archiving `path` and return the streaming body.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be resolved, is not a directory or may not
    /// be listed by `subject`.
    pub async fn open(
        &self,
        subject: Subject,
        path: FsPath,
        recursive: bool,
    ) -> ArchiveResult<ArchiveDownload> {
        let request = self.prepare(subject, path, recursive).await?;
        let (body, pipe) = tokio::io::duplex(self.limits.stream_buffer_bytes);
        let completion = self.launch(Arc::clone(&request), SyncIoBridge::new(pipe));
        Ok(ArchiveDownload {
            body,
            request,
            completion,
        })
    }

    /// Archive `path` into `sink`, returning once the archive is complete or aborted.
    ///
    /// # Errors
    ///
    /// Fails on the same root conditions as [`ArchiveService::open`], and when
    /// the archive is aborted.
    pub async fn export<W>(
        &self,
        subject: Subject,
        path: FsPath,
        recursive: bool,
        sink: W,
    ) -> ArchiveResult<DeliverySummary>
    where
        W: Write + Send + 'static,
    {
        let request = self.prepare(subject, path, recursive).await?;
        self.launch(request, sink).await
    }

    /// Cancel every request still in flight.
    pub fn shutdown(&self) {
        let requests: Vec<Arc<ArchiveRequest>> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        info!(active = requests.len(), "cancelling active archives");
        for request in requests {
            request.cancel();
        }
    }

    /// Number of archives currently being written.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn prepare(
        &self,
        subject: Subject,
        path: FsPath,
        recursive: bool,
    ) -> ArchiveResult<Arc<ArchiveRequest>> {
        let resolved = self
            .namespace
            .stat(&subject, &path, self.scanner.required_attributes())
            .await
            .map_err(ArchiveError::from_root_lookup)
            .and_then(|attributes| {
                if !attributes.is_directory() {
                    Err(ArchiveError::NotADirectory { path: path.clone() })
                } else if !can_list(&subject, &attributes) {
                    Err(ArchiveError::PermissionDenied { path: path.clone() })
                } else {
                    Ok(())
                }
            });
        if let Err(err) = resolved {
            debug!(path = %path, subject = %subject, error = %err, "archive rejected");
            self.metrics.inc_archive_request(err.outcome());
            return Err(err);
        }

        let request = Arc::new(ArchiveRequest::new(path, subject, recursive, &self.limits));
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.id(), Arc::downgrade(&request));
        if !self.scanner.start_listing(&request) || !self.starter.start_transfers(&request) {
            warn!(request_id = %request.id(), "archive request refused its pipeline tasks");
        }
        info!(
            request_id = %request.id(),
            root = %request.root(),
            subject = %request.subject(),
            recursive,
            "archive started"
        );
        Ok(request)
    }

    fn launch<W>(&self, request: Arc<ArchiveRequest>, sink: W) -> ArchiveCompletion
    where
        W: Write + Send + 'static,
    {
        self.metrics.archive_started();
        let guard = ActiveArchive {
            id: request.id(),
            metrics: self.metrics.clone(),
            active: Arc::clone(&self.active),
        };
        let writer = self.writer.clone();
        let metrics = self.metrics.clone();
        let runtime = Handle::current();
        let span = info_span!("archive.write", request_id = %request.id());
        let handle = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let result = writer.deliver(&request, &runtime, sink);
            metrics.inc_archive_request(match &result {
                Ok(_) => "completed",
                Err(err) => err.outcome(),
            });
            drop(guard);
            result
        });
        ArchiveCompletion { handle }
    }
}
