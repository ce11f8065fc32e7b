//! Serial transfer admission between the file queue and the writer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, debug, info_span, warn};
use zipline_core::{FsPath, TransferError, TransferResult, TransferService};
use zipline_telemetry::Metrics;

use crate::lease::{ReadyTransfer, TransferLease};
use crate::problems::{Problem, ProblemStage};
use crate::request::{ArchiveRequest, DiscoveredFile};

const STALLED_MOVER_REASON: &str = "mover did not become ready before the start deadline";

/// Starts one transfer at a time, in file-queue order.
#[derive(Clone)]
pub struct TransferStarter {
    service: Arc<dyn TransferService>,
    start_timeout: Duration,
    kill_timeout: Duration,
    metrics: Metrics,
}

struct FinalFlag(Arc<ArchiveRequest>);

impl Drop for FinalFlag {
    fn drop(&mut self) {
        self.0.transfers().close();
    }
}

impl TransferStarter {
    /// Build a starter with the given mover deadlines.
    #[must_use]
    pub fn new(
        service: Arc<dyn TransferService>,
        start_timeout: Duration,
        kill_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            service,
            start_timeout,
            kill_timeout,
            metrics,
        }
    }

    /// Spawn the admission loop for `request`.
    ///
    /// The transfer queue's final flag is set when the loop exits for any reason.
    pub fn start_transfers(&self, request: &Arc<ArchiveRequest>) -> bool {
        let flag = FinalFlag(Arc::clone(request));
        let starter = self.clone();
        let span = info_span!("archive.start", request_id = %request.id());
        request.spawn(async move { starter.run(flag).await }.instrument(span))
    }

    async fn run(self, flag: FinalFlag) {
        let request = Arc::clone(&flag.0);
        let cancel = request.cancellation().clone();
        let mut started = 0_usize;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                file = request.files().recv() => file,
            };
            let Some(file) = next else {
                break;
            };

            let path = file.path.clone();
            match self.start_one(&request, file).await {
                Ok(ready) => {
                    started += 1;
                    if request.transfers().push(ready, &cancel).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    self.metrics.inc_transfer_start_failure(err.kind());
                    self.metrics.inc_problem(ProblemStage::Transfer.as_str());
                    request.record_problem(Problem::from_error(
                        ProblemStage::Transfer,
                        path,
                        &err,
                    ));
                }
            }
        }
        debug!(started, "transfer admission finished");
        drop(flag);
    }

    async fn start_one(
        &self,
        request: &ArchiveRequest,
        file: DiscoveredFile,
    ) -> TransferResult<ReadyTransfer> {
        let deadline = Instant::now() + self.start_timeout;
        let started = timeout_at(
            deadline,
            self.service
                .start(request.subject(), &file.path, &file.attributes),
        )
        .await;
        let Ok(transfer) = started else {
            return Err(self.timed_out(&file.path));
        };
        let mut lease = TransferLease::new(transfer?);

        match timeout_at(deadline, lease.wait_ready()).await {
            Ok(Ok(redirect)) => {
                debug!(path = %file.path, transfer_id = %lease.id(), redirect = %redirect, "mover ready");
                Ok(ReadyTransfer::new(file, redirect, lease))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                let err = self.timed_out(&file.path);
                self.kill_detached(lease, file.path);
                Err(err)
            }
        }
    }

    fn timed_out(&self, path: &FsPath) -> TransferError {
        TransferError::Timeout {
            path: path.clone(),
            waited: self.start_timeout,
        }
    }

    fn kill_detached(&self, lease: TransferLease, path: FsPath) {
        let metrics = self.metrics.clone();
        let kill_timeout = self.kill_timeout;
        tokio::spawn(
            async move {
                match timeout(kill_timeout, lease.kill(STALLED_MOVER_REASON)).await {
                    Ok(Ok(())) => debug!(path = %path, "stalled mover killed"),
                    Ok(Err(err)) => {
                        metrics.inc_mover_kill_failure();
                        warn!(error = %err, path = %path, "failed to kill stalled mover");
                    }
                    Err(_) => {
                        metrics.inc_mover_kill_failure();
                        warn!(path = %path, timeout_secs = kill_timeout.as_secs(), "timed out killing stalled mover");
                    }
                }
                drop(lease);
            }
            .in_current_span(),
        );
    }
}
