//! Abstract filesystem surface implemented by every backend.
//!
//! Paths are slash separated and relative to the mount root; adapters own the
//! translation to whatever their transport expects. Operations a transport
//! cannot express default to a not-supported error rather than silently
//! succeeding.

use crate::BoxFuture;
use corpus_agent_domain::{DirEntry, EntryKind, FileMeta};
use corpus_agent_shared::{ErrorEnvelope, RequestContext, Result};

/// Object-safe filesystem operations.
pub trait FileSystemPort: Send + Sync {
    /// Read the full contents of a file.
    fn read_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;

    /// Create or truncate a file with the given contents.
    fn write_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, Result<()>>;

    /// Metadata for a single entry.
    fn stat<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<FileMeta>>;

    /// List the direct children of a directory.
    fn read_dir<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>>;

    /// First `limit` entries of a directory listing, in listing order.
    fn read_dir_limit<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        Box::pin(async move {
            let mut entries = self.read_dir(ctx, path).await?;
            entries.truncate(limit);
            Ok(entries)
        })
    }

    /// Create a directory and any missing parents.
    fn mkdir_all<'a>(&'a self, ctx: &'a RequestContext, path: &'a str)
    -> BoxFuture<'a, Result<()>>;

    /// Remove a file or an empty directory.
    fn remove<'a>(&'a self, ctx: &'a RequestContext, path: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove a path recursively.
    fn remove_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Rename an entry within the mount.
    fn rename<'a>(
        &'a self,
        ctx: &'a RequestContext,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Change permission bits. Optional; transports without a mode concept
    /// report not-supported.
    fn chmod<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _path: &'a str,
        _mode: u32,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(ErrorEnvelope::not_supported("chmod")) })
    }

    /// Set the modification time (milliseconds since the epoch). Optional.
    fn chtimes<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _path: &'a str,
        _mtime_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(ErrorEnvelope::not_supported("chtimes")) })
    }
}

/// Join two relative slash paths without introducing doubled separators.
#[must_use]
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() || base == "." {
        name.to_owned()
    } else {
        format!("{}/{name}", base.trim_end_matches('/'))
    }
}

/// Walk a directory tree, returning `(path, meta)` for every file found.
///
/// Directories are traversed breadth first; entries whose metadata cannot be
/// read are skipped so one broken symlink does not abort a whole poll cycle.
pub async fn walk(
    fs: &dyn FileSystemPort,
    ctx: &RequestContext,
    root: &str,
    recursive: bool,
) -> Result<Vec<(String, FileMeta)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_owned()];

    while let Some(dir) = pending.pop() {
        ctx.ensure_not_cancelled("walk")?;
        let entries = fs.read_dir(ctx, &dir).await?;
        for entry in entries {
            let path = join_path(&dir, &entry.name);
            match entry.kind {
                EntryKind::Directory => {
                    if recursive {
                        pending.push(path);
                    }
                }
                EntryKind::File => match fs.stat(ctx, &path).await {
                    Ok(meta) => files.push((path, meta)),
                    Err(error) if error.is_not_found() => {}
                    Err(error) => return Err(error),
                },
                EntryKind::Other => {}
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_handles_root_aliases() {
        assert_eq!(join_path(".", "a.txt"), "a.txt");
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("docs", "a.txt"), "docs/a.txt");
        assert_eq!(join_path("docs/", "a.txt"), "docs/a.txt");
    }
}
