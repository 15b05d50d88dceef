//! Backend abstraction: a mountable remote filesystem.

use crate::{BoxFuture, FileSystemPort};
use corpus_agent_domain::Dsn;
use corpus_agent_shared::{RequestContext, Result};
use std::sync::Arc;

/// Callback run against a mounted filesystem.
///
/// The mount stays alive for exactly the duration of the consumer; once it
/// returns, the backend releases connections and scratch state.
pub type MountConsumer<'a> =
    Box<dyn FnOnce(Arc<dyn FileSystemPort>) -> BoxFuture<'a, Result<()>> + Send + 'a>;

/// A storage backend addressed by a DSN.
pub trait BackendPort: Send + Sync {
    /// Connect, hand a live filesystem to `consumer`, then tear down.
    ///
    /// Teardown happens whether the consumer succeeds or fails; the
    /// consumer's error wins over any teardown error.
    fn mount<'a>(
        &'a self,
        ctx: &'a RequestContext,
        consumer: MountConsumer<'a>,
    ) -> BoxFuture<'a, Result<()>>;
}

impl std::fmt::Debug for dyn BackendPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn BackendPort")
    }
}

/// Constructor registered per scheme.
///
/// Construction only parses transport options from the DSN; connecting is
/// deferred to [`BackendPort::mount`].
pub type BackendFactory = Arc<dyn Fn(Dsn) -> Result<Arc<dyn BackendPort>> + Send + Sync>;
