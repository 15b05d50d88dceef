//! Concrete adapters: storage backends behind [`corpus_agent_ports::BackendPort`],
//! filesystem decorators, and the HTTP client for the indexing service.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod base_path;
pub mod ftp;
pub mod git;
pub mod indexing_http;
pub mod local;
pub mod logging;
pub mod object_store;
pub mod registry;
pub mod sftp;
pub mod smb;
mod support;
pub mod webdav;

pub use base_path::BasePathFileSystem;
pub use indexing_http::{IndexingHttpClient, IndexingHttpConfig};
pub use local::{LocalBackend, LocalFileSystem};
pub use logging::LoggingFileSystem;
pub use registry::BackendRegistry;

/// Crate version, surfaced by the CLI diagnostics output.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
