//! Port traits separating the ingestion core from transports.
//!
//! Every port is object safe and async via boxed futures, so adapters can be
//! registered behind `Arc<dyn ...>` at runtime without generics leaking into
//! the application layer.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod backend;
pub mod filesystem;
pub mod handler;
pub mod indexing;

pub use backend::{BackendFactory, BackendPort, MountConsumer};
pub use filesystem::{FileSystemPort, join_path, walk};
pub use handler::WatchHandler;
pub use indexing::{Document, IndexRequest, IndexingPort};

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by every object-safe port method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Crate version, surfaced by the CLI diagnostics output.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
