//! Namespace and transfer traits implemented by storage adapters.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::{NamespaceResult, TransferResult};
use crate::model::{
    AttributeSet, DirectoryEntry, FileAttributes, FsPath, RedirectTarget, Subject, TransferId,
};

/// Byte stream delivered by a ready transfer.
pub type TransferReader = Box<dyn AsyncRead + Send + Unpin>;

/// Read-only view of the namespace used to resolve and enumerate paths.
#[async_trait]
pub trait NamespaceService: Send + Sync {
    /// Resolve the attributes of a single entry.
    async fn stat(
        &self,
        subject: &Subject,
        path: &FsPath,
        required: &AttributeSet,
    ) -> NamespaceResult<FileAttributes>;

    /// List the children of a directory, restricted to what `subject` may see.
    async fn list(
        &self,
        subject: &Subject,
        path: &FsPath,
        required: &AttributeSet,
    ) -> NamespaceResult<Vec<DirectoryEntry>>;
}

/// Entry point of the transfer (mover) subsystem.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Attributes the service needs on every file it is asked to start.
    fn required_attributes(&self) -> AttributeSet {
        AttributeSet::empty()
    }

    /// Select a mover for `path` and begin a read transfer.
    async fn start(
        &self,
        subject: &Subject,
        path: &FsPath,
        attributes: &FileAttributes,
    ) -> TransferResult<Box<dyn Transfer>>;
}

/// Handle on one active transfer.
///
/// Implementations must tolerate [`Transfer::release`] being called from any
/// thread, more than once, and without an async context.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> TransferId;

    /// Wait until the mover reports where its data channel listens.
    async fn wait_ready(&mut self) -> TransferResult<RedirectTarget>;

    /// Open the byte stream of the transferred file.
    async fn open(&mut self) -> TransferResult<TransferReader>;

    /// Wait for the mover to confirm the transfer completed.
    async fn finish(&mut self) -> TransferResult<()>;

    /// Ask the mover to abort; best effort.
    async fn kill(&self, _reason: &str) -> TransferResult<()> {
        Ok(())
    }

    /// Drop every resource held for this transfer. Idempotent and non-blocking.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTransfer {
        released: AtomicUsize,
    }

    #[async_trait]
    impl Transfer for StubTransfer {
        fn id(&self) -> TransferId {
            TransferId::new()
        }

        async fn wait_ready(&mut self) -> TransferResult<RedirectTarget> {
            Ok(RedirectTarget::new("stub://ready"))
        }

        async fn open(&mut self) -> TransferResult<TransferReader> {
            Ok(Box::new(tokio::io::empty()))
        }

        async fn finish(&mut self) -> TransferResult<()> {
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubService;

    #[async_trait]
    impl TransferService for StubService {
        async fn start(
            &self,
            _subject: &Subject,
            _path: &FsPath,
            _attributes: &FileAttributes,
        ) -> TransferResult<Box<dyn Transfer>> {
            Ok(Box::new(StubTransfer {
                released: AtomicUsize::new(0),
            }))
        }
    }

    #[tokio::test]
    async fn default_methods_are_permissive() -> anyhow::Result<()> {
        let service = StubService;
        assert!(service.required_attributes().is_empty());

        let path = FsPath::parse("/f")?;
        let mut transfer = service
            .start(&Subject::root(), &path, &FileAttributes::regular(0))
            .await?;
        assert_eq!(transfer.wait_ready().await?.as_str(), "stub://ready");
        transfer.kill("test").await?;
        transfer.finish().await?;
        transfer.release();
        Ok(())
    }
}
