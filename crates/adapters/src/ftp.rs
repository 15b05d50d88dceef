//! FTP backend on top of `suppaftp`.
//!
//! The control protocol is blocking, so every operation opens a short-lived
//! session inside `spawn_blocking`. Listings come from `LIST` lines parsed by
//! `suppaftp::list::File`; stat is a parent listing filtered by name, since
//! plain FTP servers rarely implement `MLST`.

use crate::base_path::BasePathFileSystem;
use crate::logging::LoggingFileSystem;
use crate::support::{mount_relative, run_blocking};
use corpus_agent_domain::{DirEntry, Dsn, EntryKind, FileMeta};
use corpus_agent_ports::{BackendPort, BoxFuture, FileSystemPort, MountConsumer};
use corpus_agent_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

const DEFAULT_FTP_PORT: u16 = 21;

/// Connection settings shared by every per-operation session.
#[derive(Debug, Clone)]
struct FtpConfig {
    authority: String,
    username: String,
    password: SecretString,
    timeout: Option<Duration>,
}

fn map_ftp_error(error: FtpError) -> ErrorEnvelope {
    match error {
        FtpError::UnexpectedResponse(response) if response.status == Status::FileUnavailable => {
            ErrorEnvelope::expected(ErrorCode::not_found(), "remote file unavailable")
        }
        FtpError::UnexpectedResponse(response) => ErrorEnvelope::unexpected(
            ErrorCode::new("ftp", "unexpected_response"),
            format!("unexpected FTP response: {:?}", response.status),
            ErrorClass::NonRetriable,
        ),
        FtpError::ConnectionError(io_error) => ErrorEnvelope::from(io_error),
        other => ErrorEnvelope::unexpected(
            ErrorCode::new("ftp", "protocol"),
            other.to_string(),
            ErrorClass::Retriable,
        ),
    }
}

impl FtpConfig {
    fn connect(&self) -> Result<FtpStream> {
        let mut stream = match self.timeout {
            Some(timeout) => {
                let address = self
                    .authority
                    .to_socket_addrs()
                    .map_err(ErrorEnvelope::from)?
                    .next()
                    .ok_or_else(|| {
                        ErrorEnvelope::expected(
                            ErrorCode::new("ftp", "unresolvable_host"),
                            format!("cannot resolve FTP host: {}", self.authority),
                        )
                    })?;
                FtpStream::connect_timeout(address, timeout).map_err(map_ftp_error)?
            }
            None => FtpStream::connect(&self.authority).map_err(map_ftp_error)?,
        };
        stream
            .login(self.username.as_str(), self.password.expose())
            .map_err(map_ftp_error)?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(map_ftp_error)?;
        Ok(stream)
    }

    fn with_session<T>(&self, work: impl FnOnce(&mut FtpStream) -> Result<T>) -> Result<T> {
        let mut stream = self.connect()?;
        let outcome = work(&mut stream);
        // A failed QUIT must not mask the operation's own outcome.
        stream.quit().ok();
        outcome
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => (".", path),
    }
}

fn meta_from_list_file(file: &suppaftp::list::File) -> FileMeta {
    let kind = if file.is_directory() {
        EntryKind::Directory
    } else if file.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    let mtime_ms = file
        .modified()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;
    FileMeta {
        name: file.name().into(),
        size: file.size() as u64,
        mtime_ms,
        kind,
        mode: 0o644,
    }
}

fn list_directory(stream: &mut FtpStream, path: &str) -> Result<Vec<FileMeta>> {
    let target = if path == "." { None } else { Some(path) };
    let lines = stream.list(target).map_err(map_ftp_error)?;
    let mut metas = Vec::new();
    for line in &lines {
        // Servers mix in lines the parser cannot handle (totals, vendor
        // extensions); skip those entries.
        if let Ok(file) = suppaftp::list::File::try_from(line.as_str()) {
            let name = file.name();
            if name == "." || name == ".." {
                continue;
            }
            metas.push(meta_from_list_file(&file));
        }
    }
    metas.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(metas)
}

fn stat_path(stream: &mut FtpStream, path: &str) -> Result<FileMeta> {
    if path == "." {
        return Ok(FileMeta {
            name: ".".into(),
            size: 0,
            mtime_ms: 0,
            kind: EntryKind::Directory,
            mode: 0o755,
        });
    }
    let (parent, name) = split_parent(path);
    let siblings = list_directory(stream, parent)?;
    siblings
        .into_iter()
        .find(|meta| meta.name.as_ref() == name)
        .ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::not_found(), format!("no such entry: {path}"))
        })
}

/// Filesystem view of one FTP server (paths relative to the login root).
#[derive(Debug, Clone)]
pub struct FtpFileSystem {
    config: FtpConfig,
}

impl FileSystemPort for FtpFileSystem {
    fn read_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.read_file")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.read_file", move || {
                config.with_session(|stream| {
                    let buffer = stream.retr_as_buffer(&path).map_err(map_ftp_error)?;
                    Ok(buffer.into_inner())
                })
            })
            .await
        })
    }

    fn write_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        let config = self.config.clone();
        let path = path.to_owned();
        let contents = contents.to_vec();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.write_file")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.write_file", move || {
                config.with_session(|stream| {
                    let mut cursor = Cursor::new(contents);
                    stream.put_file(&path, &mut cursor).map_err(map_ftp_error)?;
                    Ok(())
                })
            })
            .await
        })
    }

    fn stat<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<FileMeta>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.stat")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.stat", move || {
                config.with_session(|stream| stat_path(stream, &path))
            })
            .await
        })
    }

    fn read_dir<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.read_dir")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.read_dir", move || {
                config.with_session(|stream| {
                    let metas = list_directory(stream, &path)?;
                    Ok(metas
                        .into_iter()
                        .map(|meta| DirEntry {
                            name: meta.name.clone(),
                            kind: meta.kind,
                        })
                        .collect())
                })
            })
            .await
        })
    }

    fn mkdir_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.mkdir_all")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.mkdir_all", move || {
                config.with_session(|stream| {
                    let mut prefix = String::new();
                    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
                        if !prefix.is_empty() {
                            prefix.push('/');
                        }
                        prefix.push_str(segment);
                        // MKD on an existing directory answers 550; only the
                        // final segment's failure matters.
                        if let Err(error) = stream.mkdir(&prefix) {
                            if stream.list(Some(&prefix)).is_err() {
                                return Err(map_ftp_error(error));
                            }
                        }
                    }
                    Ok(())
                })
            })
            .await
        })
    }

    fn remove<'a>(&'a self, ctx: &'a RequestContext, path: &'a str) -> BoxFuture<'a, Result<()>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.remove")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.remove", move || {
                config.with_session(|stream| {
                    let meta = stat_path(stream, &path)?;
                    if meta.is_dir() {
                        stream.rmdir(&path).map_err(map_ftp_error)
                    } else {
                        stream.rm(&path).map_err(map_ftp_error)
                    }
                })
            })
            .await
        })
    }

    fn remove_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        path: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let config = self.config.clone();
        let path = path.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.remove_all")?;
            let path = mount_relative(&path)?;
            run_blocking("ftp.remove_all", move || {
                config.with_session(|stream| remove_tree(stream, &path))
            })
            .await
        })
    }

    fn rename<'a>(
        &'a self,
        ctx: &'a RequestContext,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let config = self.config.clone();
        let from = from.to_owned();
        let to = to.to_owned();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.rename")?;
            let from = mount_relative(&from)?;
            let to = mount_relative(&to)?;
            run_blocking("ftp.rename", move || {
                config.with_session(|stream| stream.rename(&from, &to).map_err(map_ftp_error))
            })
            .await
        })
    }
}

fn remove_tree(stream: &mut FtpStream, path: &str) -> Result<()> {
    let meta = stat_path(stream, path)?;
    if !meta.is_dir() {
        return stream.rm(path).map_err(map_ftp_error);
    }
    for child in list_directory(stream, path)? {
        let child_path = format!("{path}/{}", child.name);
        remove_tree(stream, &child_path)?;
    }
    stream.rmdir(path).map_err(map_ftp_error)
}

/// FTP backend for `ftp://[user:pass@]host:port/<base>?timeout=<dur>` DSNs.
#[derive(Debug, Clone)]
pub struct FtpBackend {
    config: FtpConfig,
    base: String,
}

impl FtpBackend {
    /// Factory registered for the `ftp` scheme.
    pub fn from_dsn(mut dsn: Dsn) -> Result<Arc<dyn BackendPort>> {
        let timeout = dsn.take_duration_param("timeout")?;
        let username = if dsn.username().is_empty() {
            "anonymous".to_owned()
        } else {
            dsn.username().to_owned()
        };
        let password = SecretString::new(dsn.password().unwrap_or("anonymous"));
        let config = FtpConfig {
            authority: dsn.authority(DEFAULT_FTP_PORT),
            username,
            password,
            timeout,
        };
        Ok(Arc::new(Self {
            config,
            base: dsn.path().trim_start_matches('/').to_owned(),
        }))
    }
}

impl BackendPort for FtpBackend {
    fn mount<'a>(
        &'a self,
        ctx: &'a RequestContext,
        consumer: MountConsumer<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("ftp.mount")?;
            let config = self.config.clone();
            // Verify the credentials once before handing out the filesystem.
            run_blocking("ftp.mount", move || config.with_session(|_| Ok(()))).await?;

            let transport: Arc<dyn FileSystemPort> = Arc::new(FtpFileSystem {
                config: self.config.clone(),
            });
            let rebased: Arc<dyn FileSystemPort> =
                Arc::new(BasePathFileSystem::new(transport, &self.base));
            let fs: Arc<dyn FileSystemPort> = Arc::new(LoggingFileSystem::new(rebased, "ftp"));
            consumer(fs).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_defaults_to_anonymous_login() {
        let dsn = Dsn::parse("ftp://files.example.org/pub?timeout=10s").unwrap();
        let backend = FtpBackend::from_dsn(dsn);
        assert!(backend.is_ok());
    }

    #[test]
    fn split_parent_handles_top_level_names() {
        assert_eq!(split_parent("a.txt"), (".", "a.txt"));
        assert_eq!(split_parent("dir/a.txt"), ("dir", "a.txt"));
    }
}
