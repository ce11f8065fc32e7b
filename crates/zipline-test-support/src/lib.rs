#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared test helpers used across integration suites.
//! Layout: memory.rs (in-memory namespace and movers), sink.rs (writers and ZIP inspection), fixtures.rs (canned trees and limits).

pub mod fixtures;
pub mod memory;
pub mod sink;

pub use memory::{MemoryNamespace, MemoryTransferService, MemoryTree, StartFailure, TransferLog};
pub use sink::{EntryTimes, FailingSink, SharedBuffer, ZipEntry, read_zip};
