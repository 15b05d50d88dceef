//! Application layer: the polling watcher, the indexing handler and the
//! compensating workflow helper.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod indexer;
pub mod watcher;
pub mod workflow;

pub use indexer::{DEFAULT_DEBOUNCE_DELAY, Indexer, IndexerConfig};
pub use watcher::watch;
pub use workflow::{CompensationError, Workflow, WorkflowStep};

/// Crate version, surfaced by the CLI diagnostics output.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
