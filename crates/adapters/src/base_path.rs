//! Decorator restricting a filesystem to a sub-tree.
//!
//! Several backends accept a base path in the DSN (`ftp://host/<base>`); the
//! transport itself speaks absolute paths, so the base is applied here once
//! instead of in every adapter.

use corpus_agent_domain::{DirEntry, FileMeta, clean_path};
use corpus_agent_ports::{BoxFuture, FileSystemPort, join_path};
use corpus_agent_shared::{RequestContext, Result};
use std::sync::Arc;

/// Re-roots every operation under a fixed prefix.
#[derive(Clone)]
pub struct BasePathFileSystem {
    inner: Arc<dyn FileSystemPort>,
    base: String,
}

impl BasePathFileSystem {
    /// Wrap `inner` so all paths resolve under `base`.
    ///
    /// An empty or `.` base returns operations unchanged.
    #[must_use]
    pub fn new(inner: Arc<dyn FileSystemPort>, base: &str) -> Self {
        Self {
            inner,
            base: clean_path(base),
        }
    }

    fn rebase(&self, path: &str) -> String {
        let cleaned = clean_path(path);
        if cleaned.is_empty() || cleaned == "." {
            if self.base.is_empty() || self.base == "." {
                ".".to_owned()
            } else {
                self.base.clone()
            }
        } else {
            join_path(&self.base, &cleaned)
        }
    }
}

impl FileSystemPort for BasePathFileSystem {
    fn read_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.read_file(ctx, &path).await })
    }

    fn write_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.write_file(ctx, &path, contents).await })
    }

    fn stat<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<FileMeta>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.stat(ctx, &path).await })
    }

    fn read_dir<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.read_dir(ctx, &path).await })
    }

    fn mkdir_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.mkdir_all(ctx, &path).await })
    }

    fn remove<'a>(&'a self, ctx: &'a RequestContext, path: &'a str) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.remove(ctx, &path).await })
    }

    fn remove_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.remove_all(ctx, &path).await })
    }

    fn rename<'a>(
        &'a self,
        ctx: &'a RequestContext,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let from = self.rebase(from);
        let to = self.rebase(to);
        Box::pin(async move { self.inner.rename(ctx, &from, &to).await })
    }

    fn chmod<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mode: u32,
    ) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.chmod(ctx, &path, mode).await })
    }

    fn chtimes<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mtime_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        let path = self.rebase(path);
        Box::pin(async move { self.inner.chtimes(ctx, &path, mtime_ms).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFileSystem;

    #[tokio::test]
    async fn operations_resolve_under_the_base() -> Result<()> {
        let root = std::env::temp_dir().join(format!("corpus-base-{}", std::process::id()));
        std::fs::create_dir_all(root.join("base/sub")).unwrap();
        std::fs::write(root.join("base/sub/x.txt"), b"x").unwrap();

        let ctx = RequestContext::new_session();
        let inner: Arc<dyn FileSystemPort> = Arc::new(LocalFileSystem::new(root.clone()));
        let fs = BasePathFileSystem::new(inner, "base");

        let meta = fs.stat(&ctx, "sub/x.txt").await?;
        assert_eq!(meta.size, 1);
        let entries = fs.read_dir(&ctx, ".").await?;
        assert_eq!(entries.len(), 1);

        std::fs::remove_dir_all(&root).ok();
        Ok(())
    }
}
