//! Transfers that read files straight from local disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs::File;
use tracing::debug;
use zipline_core::{
    FileAttributes, FsPath, RedirectTarget, Subject, Transfer, TransferError, TransferId,
    TransferReader, TransferResult, TransferService,
};

use crate::convert::{resolve, transfer_error};

/// Starts local-disk transfers below a root directory.
#[derive(Debug, Clone)]
pub struct LocalTransferService {
    root: PathBuf,
}

impl LocalTransferService {
    /// Serve files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TransferService for LocalTransferService {
    async fn start(
        &self,
        _subject: &Subject,
        path: &FsPath,
        _attributes: &FileAttributes,
    ) -> TransferResult<Box<dyn Transfer>> {
        let location = resolve(&self.root, path);
        let metadata = tokio::fs::symlink_metadata(&location)
            .await
            .map_err(|source| transfer_error("stat", path, source))?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile { path: path.clone() });
        }
        let file = File::open(&location)
            .await
            .map_err(|source| transfer_error("open", path, source))?;
        let transfer = LocalTransfer {
            id: TransferId::new(),
            path: path.clone(),
            location,
            file: Some(file),
            released: AtomicBool::new(false),
        };
        debug!(transfer_id = %transfer.id, path = %path, "local transfer started");
        Ok(Box::new(transfer))
    }
}

/// One open local file.
#[derive(Debug)]
pub struct LocalTransfer {
    id: TransferId,
    path: FsPath,
    location: PathBuf,
    file: Option<File>,
    released: AtomicBool,
}

#[async_trait]
impl Transfer for LocalTransfer {
    fn id(&self) -> TransferId {
        self.id
    }

    async fn wait_ready(&mut self) -> TransferResult<RedirectTarget> {
        Ok(RedirectTarget::new(format!(
            "file://{}",
            self.location.display()
        )))
    }

    async fn open(&mut self) -> TransferResult<TransferReader> {
        let file = self.file.take().ok_or_else(|| {
            TransferError::other(
                "open",
                self.path.clone(),
                std::io::Error::other("stream already opened"),
            )
        })?;
        Ok(Box::new(file))
    }

    async fn finish(&mut self) -> TransferResult<()> {
        Ok(())
    }

    async fn kill(&self, reason: &str) -> TransferResult<()> {
        debug!(transfer_id = %self.id, reason, "local transfer killed");
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(transfer_id = %self.id, path = %self.path, "local transfer released");
        }
    }
}
