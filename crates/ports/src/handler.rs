//! Watch-event consumer interface.

use crate::{BoxFuture, FileSystemPort};
use corpus_agent_domain::WatchEvent;
use corpus_agent_shared::{RequestContext, Result};
use std::sync::Arc;

/// Receives change events from a watcher.
///
/// Handlers run concurrently up to the watcher's dispatch limit; an error
/// return is logged by the watcher and never stops the watch loop.
pub trait WatchHandler: Send + Sync {
    /// Handle one filesystem change.
    fn on_event<'a>(
        &'a self,
        ctx: &'a RequestContext,
        fs: Arc<dyn FileSystemPort>,
        event: WatchEvent,
    ) -> BoxFuture<'a, Result<()>>;
}
