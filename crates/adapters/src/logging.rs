//! Tracing decorator for filesystem ports.

use corpus_agent_domain::{DirEntry, FileMeta};
use corpus_agent_ports::{BoxFuture, FileSystemPort};
use corpus_agent_shared::{ErrorEnvelope, RequestContext, Result};
use std::sync::Arc;
use tracing::debug;

/// Logs every filesystem call with its outcome at debug level.
#[derive(Clone)]
pub struct LoggingFileSystem {
    inner: Arc<dyn FileSystemPort>,
    backend: &'static str,
}

impl LoggingFileSystem {
    /// Wrap `inner`, tagging log lines with the backend name.
    #[must_use]
    pub fn new(inner: Arc<dyn FileSystemPort>, backend: &'static str) -> Self {
        Self { inner, backend }
    }

    fn trace<T>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        path: &str,
        outcome: &Result<T>,
    ) {
        match outcome {
            Ok(_) => debug!(
                correlation_id = ctx.correlation_id().as_str(),
                backend = self.backend,
                operation,
                path,
                "fs operation succeeded"
            ),
            Err(error) => debug!(
                correlation_id = ctx.correlation_id().as_str(),
                backend = self.backend,
                operation,
                path,
                error = %error,
                "fs operation failed"
            ),
        }
    }
}

macro_rules! logged {
    ($self:ident, $ctx:ident, $op:literal, $path:expr, $call:expr) => {
        Box::pin(async move {
            let outcome: Result<_, ErrorEnvelope> = $call.await;
            $self.trace($ctx, $op, $path, &outcome);
            outcome
        })
    };
}

impl FileSystemPort for LoggingFileSystem {
    fn read_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        logged!(self, ctx, "read_file", path, self.inner.read_file(ctx, path))
    }

    fn write_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        logged!(
            self,
            ctx,
            "write_file",
            path,
            self.inner.write_file(ctx, path, contents)
        )
    }

    fn stat<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<FileMeta>> {
        logged!(self, ctx, "stat", path, self.inner.stat(ctx, path))
    }

    fn read_dir<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        logged!(self, ctx, "read_dir", path, self.inner.read_dir(ctx, path))
    }

    fn mkdir_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        logged!(self, ctx, "mkdir_all", path, self.inner.mkdir_all(ctx, path))
    }

    fn remove<'a>(&'a self, ctx: &'a RequestContext, path: &'a str) -> BoxFuture<'a, Result<()>> {
        logged!(self, ctx, "remove", path, self.inner.remove(ctx, path))
    }

    fn remove_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        logged!(
            self,
            ctx,
            "remove_all",
            path,
            self.inner.remove_all(ctx, path)
        )
    }

    fn rename<'a>(
        &'a self,
        ctx: &'a RequestContext,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        logged!(self, ctx, "rename", from, self.inner.rename(ctx, from, to))
    }

    fn chmod<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mode: u32,
    ) -> BoxFuture<'a, Result<()>> {
        logged!(self, ctx, "chmod", path, self.inner.chmod(ctx, path, mode))
    }

    fn chtimes<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mtime_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        logged!(
            self,
            ctx,
            "chtimes",
            path,
            self.inner.chtimes(ctx, path, mtime_ms)
        )
    }
}
