//! Local-disk backend using async IO.

use crate::support::mount_relative;
use corpus_agent_domain::{DirEntry, Dsn, EntryKind, FileMeta};
use corpus_agent_ports::{BackendPort, BoxFuture, FileSystemPort, MountConsumer};
use corpus_agent_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

/// Filesystem adapter rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Build a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = mount_relative(path)?;
        if relative == "." {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }
}

fn meta_from_std(name: &str, metadata: &std::fs::Metadata) -> FileMeta {
    let file_type = metadata.file_type();
    let kind = if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::Other
    };
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;
    #[cfg(unix)]
    let mode = std::os::unix::fs::MetadataExt::mode(metadata) & 0o7777;
    #[cfg(not(unix))]
    let mode = 0;
    FileMeta {
        name: name.into(),
        size: metadata.len(),
        mtime_ms,
        kind,
        mode,
    }
}

fn entry_name(path: &Path) -> Box<str> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
        .into_boxed_str()
}

impl FileSystemPort for LocalFileSystem {
    fn read_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.read_file")?;
            let full_path = self.full_path(path)?;
            tokio::fs::read(&full_path).await.map_err(ErrorEnvelope::from)
        })
    }

    fn write_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.write_file")?;
            let full_path = self.full_path(path)?;
            tokio::fs::write(&full_path, contents)
                .await
                .map_err(ErrorEnvelope::from)
        })
    }

    fn stat<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<FileMeta>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.stat")?;
            let full_path = self.full_path(path)?;
            let metadata = tokio::fs::metadata(&full_path)
                .await
                .map_err(ErrorEnvelope::from)?;
            Ok(meta_from_std(&entry_name(&full_path), &metadata))
        })
    }

    fn read_dir<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.read_dir")?;
            let full_path = self.full_path(path)?;
            let mut entries = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&full_path)
                .await
                .map_err(ErrorEnvelope::from)?;

            while let Some(entry) = read_dir.next_entry().await.map_err(ErrorEnvelope::from)? {
                let file_type = entry.file_type().await.map_err(ErrorEnvelope::from)?;
                let kind = if file_type.is_file() {
                    EntryKind::File
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::Other
                };
                let name = entry
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
                    .into_boxed_str();
                entries.push(DirEntry { name, kind });
            }

            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
    }

    fn mkdir_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.mkdir_all")?;
            let full_path = self.full_path(path)?;
            tokio::fs::create_dir_all(&full_path)
                .await
                .map_err(ErrorEnvelope::from)
        })
    }

    fn remove<'a>(&'a self, ctx: &'a RequestContext, path: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.remove")?;
            let full_path = self.full_path(path)?;
            let metadata = tokio::fs::metadata(&full_path)
                .await
                .map_err(ErrorEnvelope::from)?;
            if metadata.is_dir() {
                tokio::fs::remove_dir(&full_path)
                    .await
                    .map_err(ErrorEnvelope::from)
            } else {
                tokio::fs::remove_file(&full_path)
                    .await
                    .map_err(ErrorEnvelope::from)
            }
        })
    }

    fn remove_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.remove_all")?;
            let full_path = self.full_path(path)?;
            let metadata = tokio::fs::metadata(&full_path)
                .await
                .map_err(ErrorEnvelope::from)?;
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&full_path)
                    .await
                    .map_err(ErrorEnvelope::from)
            } else {
                tokio::fs::remove_file(&full_path)
                    .await
                    .map_err(ErrorEnvelope::from)
            }
        })
    }

    fn rename<'a>(
        &'a self,
        ctx: &'a RequestContext,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.rename")?;
            let from_path = self.full_path(from)?;
            let to_path = self.full_path(to)?;
            tokio::fs::rename(&from_path, &to_path)
                .await
                .map_err(ErrorEnvelope::from)
        })
    }

    fn chmod<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mode: u32,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.chmod")?;
            #[cfg(unix)]
            {
                let full_path = self.full_path(path)?;
                let permissions = std::os::unix::fs::PermissionsExt::from_mode(mode);
                tokio::fs::set_permissions(&full_path, permissions)
                    .await
                    .map_err(ErrorEnvelope::from)
            }
            #[cfg(not(unix))]
            {
                let _ = (path, mode);
                Err(ErrorEnvelope::not_supported("chmod"))
            }
        })
    }

    fn chtimes<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        mtime_ms: u64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.chtimes")?;
            let full_path = self.full_path(path)?;
            let mtime = UNIX_EPOCH + Duration::from_millis(mtime_ms);
            tokio::task::spawn_blocking(move || -> Result<()> {
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .open(&full_path)
                    .map_err(ErrorEnvelope::from)?;
                file.set_times(FileTimes::new().set_modified(mtime))
                    .map_err(ErrorEnvelope::from)
            })
            .await
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    format!("blocking task panicked: {error}"),
                    corpus_agent_shared::ErrorClass::NonRetriable,
                )
            })?
        })
    }
}

/// Backend serving a directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Build a backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Factory for `local://` DSNs.
    ///
    /// The root is the host and path joined verbatim, so both
    /// `local://relative/dir` and `local:///absolute/dir` work.
    pub fn from_dsn(dsn: Dsn) -> Result<Arc<dyn BackendPort>> {
        let host = dsn.host().unwrap_or_default();
        let path = dsn.path();
        let root = format!("{host}{path}");
        if root.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("dsn", "missing_root"),
                "local DSN needs a directory",
            ));
        }
        Ok(Arc::new(Self::new(root)))
    }
}

impl BackendPort for LocalBackend {
    fn mount<'a>(
        &'a self,
        ctx: &'a RequestContext,
        consumer: MountConsumer<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("local.mount")?;
            let metadata = tokio::fs::metadata(&self.root)
                .await
                .map_err(ErrorEnvelope::from)?;
            if !metadata.is_dir() {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    format!("mount root is not a directory: {}", self.root.display()),
                ));
            }
            let fs: Arc<dyn FileSystemPort> = Arc::new(LocalFileSystem::new(self.root.clone()));
            consumer(fs).await
        })
    }
}
