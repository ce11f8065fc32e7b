//! Streaming ZIP archives of namespace directories.
//!
//! A request runs three cooperating stages: a [`DirectoryScanner`] discovering
//! files, a [`TransferStarter`] opening one mover at a time, and an
//! [`ArchiveWriter`] relaying each mover's bytes into a ZIP stream.
#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod barrier;
pub mod error;
pub mod lease;
pub mod problems;
pub mod queue;
pub mod request;
pub mod scanner;
pub mod service;
pub mod starter;
pub mod tasks;
pub mod writer;

pub use barrier::ScanBarrier;
pub use error::{ArchiveError, ArchiveResult};
pub use lease::{ReadyTransfer, TransferLease};
pub use problems::{Problem, ProblemLog, ProblemStage};
pub use queue::{Offer, Polled, SentinelQueue};
pub use request::{ArchiveRequest, DiscoveredFile};
pub use scanner::{DirectoryScanner, scan_attributes};
pub use service::{ArchiveCompletion, ArchiveDownload, ArchiveService};
pub use starter::TransferStarter;
pub use tasks::TaskRegistry;
pub use writer::{ArchiveWriter, DeliverySummary, PROBLEMS_MANIFEST_NAME};
