//! Local-disk namespace and transfer backend.
#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod convert;
pub mod namespace;
pub mod transfer;

pub use namespace::LocalNamespace;
pub use transfer::{LocalTransfer, LocalTransferService};
