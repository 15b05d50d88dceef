//! # corpus-agent-domain
//!
//! Domain types for the corpus-agent workspace: URL-shaped data-source
//! descriptors (DSNs) and their agent-level options, filesystem watch events,
//! ETag fingerprints, source-URL templates, and indexing-task state.
//!
//! This crate depends only on `shared` and external crates.

pub mod dsn;
pub mod etag;
pub mod glob;
pub mod primitives;
pub mod source;
pub mod task;
pub mod watch;

pub use dsn::{AgentOptions, Dsn};
pub use etag::EtagKind;
pub use glob::PathFilter;
pub use primitives::{CollectionName, DocumentId};
pub use source::{SourceTemplate, clean_path, file_source_url};
pub use task::{Task, TaskStatus};
pub use watch::{DirEntry, EntryKind, FileMeta, WatchEvent, WatchOp, WatchOptions};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
