//! Git-over-HTTP backend on top of `git2`.
//!
//! Mounting clones the repository into a process-private temporary directory
//! and serves the working tree through the local filesystem adapter. A
//! background ticker fetches and fast-forwards the checkout so the polling
//! watcher sees upstream commits. Writes land in the local checkout only;
//! nothing is ever pushed.

use crate::local::LocalFileSystem;
use crate::logging::LoggingFileSystem;
use crate::support::run_blocking;
use corpus_agent_domain::Dsn;
use corpus_agent_ports::{BackendPort, BoxFuture, FileSystemPort, MountConsumer};
use corpus_agent_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, sleep_with_cancellation,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// Upstream churn is slow compared to local filesystems; half an hour between
// fetches unless the DSN overrides it.
const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(30 * 60);

fn map_git_error(error: git2::Error) -> ErrorEnvelope {
    let class = match error.class() {
        git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh => {
            ErrorClass::Retriable
        }
        _ => ErrorClass::NonRetriable,
    };
    ErrorEnvelope::unexpected(ErrorCode::new("git", "libgit2"), error.to_string(), class)
}

#[derive(Debug, Clone)]
struct GitConfig {
    clone_url: String,
    branch: Option<String>,
    pull_interval: Duration,
}

fn clone_repository(config: &GitConfig, checkout: &Path) -> Result<()> {
    let mut builder = git2::build::RepoBuilder::new();
    if let Some(branch) = &config.branch {
        builder.branch(branch);
    }
    builder
        .clone(&config.clone_url, checkout)
        .map(|_| ())
        .map_err(map_git_error)
}

fn fast_forward(checkout: &Path, branch: Option<&str>) -> Result<()> {
    let repo = git2::Repository::open(checkout).map_err(map_git_error)?;
    let mut remote = repo.find_remote("origin").map_err(map_git_error)?;
    let refspecs: Vec<String> = match branch {
        Some(branch) => vec![branch.to_owned()],
        None => Vec::new(),
    };
    remote
        .fetch(&refspecs, None, None)
        .map_err(map_git_error)?;

    let fetch_head = repo.find_reference("FETCH_HEAD").map_err(map_git_error)?;
    let fetched = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(map_git_error)?;
    let analysis = repo.merge_analysis(&[&fetched]).map_err(map_git_error)?;
    if analysis.0.is_up_to_date() {
        return Ok(());
    }
    if !analysis.0.is_fast_forward() {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("git", "non_fast_forward"),
            "upstream history diverged from the mounted checkout",
            ErrorClass::NonRetriable,
        ));
    }

    let head = repo.head().map_err(map_git_error)?;
    let refname = head.name().map(str::to_owned).ok_or_else(|| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("git", "detached_head"),
            "checkout has no symbolic HEAD",
            ErrorClass::NonRetriable,
        )
    })?;
    let mut reference = repo.find_reference(&refname).map_err(map_git_error)?;
    reference
        .set_target(fetched.id(), "fast-forward")
        .map_err(map_git_error)?;
    repo.set_head(&refname).map_err(map_git_error)?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))
        .map_err(map_git_error)?;
    Ok(())
}

/// Git backend for `git://host/owner/repo.git?gitScheme=...&gitBranch=...` DSNs.
#[derive(Debug, Clone)]
pub struct GitBackend {
    config: GitConfig,
}

impl GitBackend {
    /// Factory registered for the `git` scheme.
    pub fn from_dsn(mut dsn: Dsn) -> Result<Arc<dyn BackendPort>> {
        let transport = dsn
            .take_query_param("gitScheme")
            .unwrap_or_else(|| "https".to_owned());
        if !matches!(transport.as_str(), "http" | "https" | "ssh") {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("git", "bad_scheme"),
                format!("gitScheme must be http, https or ssh, got {transport}"),
            ));
        }
        let branch = dsn.take_query_param("gitBranch");
        let pull_interval = dsn
            .take_duration_param("gitPullInterval")?
            .unwrap_or(DEFAULT_PULL_INTERVAL);

        let host = dsn.host().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::new("git", "missing_host"),
                "git DSN requires a host",
            )
        })?;
        let port = dsn
            .port()
            .map(|port| format!(":{port}"))
            .unwrap_or_default();
        let clone_url = format!("{transport}://{host}{port}{}", dsn.path());

        Ok(Arc::new(Self {
            config: GitConfig {
                clone_url,
                branch,
                pull_interval,
            },
        }))
    }
}

impl BackendPort for GitBackend {
    fn mount<'a>(
        &'a self,
        ctx: &'a RequestContext,
        consumer: MountConsumer<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.ensure_not_cancelled("git.mount")?;
            let scratch = tempfile::TempDir::new().map_err(ErrorEnvelope::from)?;
            let checkout: PathBuf = scratch.path().join("checkout");

            let config = self.config.clone();
            let clone_target = checkout.clone();
            run_blocking("git.clone", move || {
                clone_repository(&config, &clone_target)
            })
            .await?;
            debug!(url = %self.config.clone_url, "cloned repository for mount");

            // Keep the checkout fresh while the consumer runs. Pull failures
            // are logged and retried on the next tick; the mounted tree just
            // goes stale in the meantime.
            let ticker_ctx = RequestContext::with_cancellation(
                ctx.correlation_id().clone(),
                ctx.cancellation_token(),
            );
            let ticker_checkout = checkout.clone();
            let ticker_config = self.config.clone();
            let ticker = tokio::spawn(async move {
                loop {
                    if sleep_with_cancellation(
                        &ticker_ctx,
                        ticker_config.pull_interval,
                        "git.pull_tick",
                    )
                    .await
                    .is_err()
                    {
                        return;
                    }
                    let checkout = ticker_checkout.clone();
                    let branch = ticker_config.branch.clone();
                    let pulled = tokio::task::spawn_blocking(move || {
                        fast_forward(&checkout, branch.as_deref())
                    })
                    .await;
                    match pulled {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => warn!(error = %error, "git pull failed"),
                        Err(error) => warn!(error = %error, "git pull task panicked"),
                    }
                }
            });

            let transport: Arc<dyn FileSystemPort> = Arc::new(LocalFileSystem::new(checkout));
            let fs: Arc<dyn FileSystemPort> = Arc::new(LoggingFileSystem::new(transport, "git"));
            let outcome = consumer(fs).await;

            ticker.abort();
            ticker.await.ok();
            drop(scratch);
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport_is_https() {
        let dsn = Dsn::parse("git://forge.example.org/team/docs.git").unwrap();
        assert!(GitBackend::from_dsn(dsn).is_ok());
    }

    #[test]
    fn default_pull_interval_is_thirty_minutes() {
        assert_eq!(DEFAULT_PULL_INTERVAL, Duration::from_secs(30 * 60));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let dsn = Dsn::parse("git://forge.example.org/r.git?gitScheme=gopher").unwrap();
        let error = GitBackend::from_dsn(dsn).unwrap_err();
        assert_eq!(error.code, ErrorCode::new("git", "bad_scheme"));
    }
}
