//! Ownership wrappers guaranteeing each transfer handle is released once.

use zipline_core::{RedirectTarget, Transfer, TransferId, TransferReader, TransferResult};

use crate::request::DiscoveredFile;

/// Owns a started transfer; releases it exactly once when dropped.
pub struct TransferLease {
    transfer: Box<dyn Transfer>,
    released: bool,
}

impl TransferLease {
    /// Take ownership of a freshly started transfer.
    #[must_use]
    pub fn new(transfer: Box<dyn Transfer>) -> Self {
        Self {
            transfer,
            released: false,
        }
    }

    /// Identifier of the wrapped transfer.
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.transfer.id()
    }

    /// Wait for the mover's redirect target.
    ///
    /// # Errors
    ///
    /// Propagates the transfer's failure.
    pub async fn wait_ready(&mut self) -> TransferResult<RedirectTarget> {
        self.transfer.wait_ready().await
    }

    /// Ask the mover to abort.
    ///
    /// # Errors
    ///
    /// Propagates the transfer's failure.
    pub async fn kill(&self, reason: &str) -> TransferResult<()> {
        self.transfer.kill(reason).await
    }

    /// Release immediately instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.transfer.release();
        }
    }
}

impl Drop for TransferLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// A transfer whose mover is ready to stream, paired with the file it serves.
pub struct ReadyTransfer {
    file: DiscoveredFile,
    redirect: RedirectTarget,
    lease: TransferLease,
}

impl ReadyTransfer {
    /// Pair a ready lease with its file.
    #[must_use]
    pub fn new(file: DiscoveredFile, redirect: RedirectTarget, lease: TransferLease) -> Self {
        Self {
            file,
            redirect,
            lease,
        }
    }

    /// File this transfer serves.
    #[must_use]
    pub const fn file(&self) -> &DiscoveredFile {
        &self.file
    }

    /// Location reported by the mover.
    #[must_use]
    pub const fn redirect(&self) -> &RedirectTarget {
        &self.redirect
    }

    /// Identifier of the underlying transfer.
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.lease.id()
    }

    /// Open the file's byte stream.
    ///
    /// # Errors
    ///
    /// Propagates the transfer's failure.
    pub async fn open(&mut self) -> TransferResult<TransferReader> {
        self.lease.transfer.open().await
    }

    /// Wait for the mover to confirm completion.
    ///
    /// # Errors
    ///
    /// Propagates the transfer's failure.
    pub async fn finish(&mut self) -> TransferResult<()> {
        self.lease.transfer.finish().await
    }

    /// Release the handle now.
    pub fn release(self) {
        self.lease.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zipline_core::{FileAttributes, FsPath};

    struct CountingTransfer {
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transfer for CountingTransfer {
        fn id(&self) -> TransferId {
            TransferId::new()
        }

        async fn wait_ready(&mut self) -> TransferResult<RedirectTarget> {
            Ok(RedirectTarget::new("test://mover"))
        }

        async fn open(&mut self) -> TransferResult<TransferReader> {
            Ok(Box::new(tokio::io::empty()))
        }

        async fn finish(&mut self) -> TransferResult<()> {
            Ok(())
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn lease(releases: &Arc<AtomicUsize>) -> TransferLease {
        TransferLease::new(Box::new(CountingTransfer {
            releases: Arc::clone(releases),
        }))
    }

    #[test]
    fn drop_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        drop(lease(&releases));
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        lease(&releases).release();
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ready_transfer_releases_on_drop() -> anyhow::Result<()> {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut lease = lease(&releases);
        let redirect = lease.wait_ready().await?;
        let file = DiscoveredFile::new(FsPath::parse("/a/f1")?, FileAttributes::regular(1));
        let ready = ReadyTransfer::new(file, redirect, lease);
        assert_eq!(ready.redirect().as_str(), "test://mover");
        assert_eq!(ready.file().path.as_str(), "/a/f1");
        drop(ready);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
