//! Storage-agnostic namespace and transfer interfaces shared across the workspace.
#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod model;
pub mod permission;
pub mod service;

pub use error::{NamespaceError, NamespaceResult, PathError, TransferError, TransferResult};
pub use model::{
    AttributeSet, DirectoryEntry, FileAttribute, FileAttributes, FileType, FsPath,
    RedirectTarget, Subject, TransferId,
};
pub use permission::{can_list, can_read};
pub use service::{NamespaceService, Transfer, TransferReader, TransferService};
