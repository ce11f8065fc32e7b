//! Counter of in-flight directory scans.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::error;

/// Tracks outstanding scans; the scan that brings the count to zero owns the
/// termination of the discovery queues.
///
/// The count never drops below zero and reaches zero at most once.
#[derive(Debug, Default)]
pub struct ScanBarrier {
    pending: AtomicUsize,
    drained: AtomicBool,
}

impl ScanBarrier {
    /// Fresh barrier with no scans registered.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
        }
    }

    /// Register a scan about to be scheduled.
    ///
    /// Returns `false` once the barrier has drained; no new scan may start then.
    pub fn enter(&self) -> bool {
        if self.drained.load(Ordering::Acquire) {
            return false;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Unregister a finished scan.
    ///
    /// Returns `true` exactly once: for the call that brought the count to zero.
    pub fn leave(&self) -> bool {
        match self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            }) {
            Ok(1) => !self.drained.swap(true, Ordering::AcqRel),
            Ok(_) => false,
            Err(_) => {
                error!("scan barrier left more often than entered");
                false
            }
        }
    }

    /// Number of scans currently registered.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the count has reached zero.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }
}
