//! One watch session per DSN, under a shared cancellation token.
//!
//! The supervisor parses each DSN, strips the agent-level options, resolves the
//! backend, and runs mount-then-watch as its own task. The first session that
//! fails for a reason other than cancellation cancels every other session; the
//! run as a whole errs when any session did.

use corpus_agent_adapters::{BackendRegistry, IndexingHttpClient, IndexingHttpConfig};
use corpus_agent_app::{DEFAULT_DEBOUNCE_DELAY, Indexer, IndexerConfig, watch};
use corpus_agent_domain::{AgentOptions, Dsn, WatchOptions};
use corpus_agent_ports::{BackendPort, WatchHandler};
use corpus_agent_shared::{
    CancellationToken, CorrelationId, DEFAULT_CONCURRENCY, ErrorClass, ErrorCode, ErrorEnvelope,
    RequestContext, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use url::Url;

/// Process-level settings applied to every watch session.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Indexing-service endpoint.
    pub endpoint: Url,
    /// Parallel index operations per session.
    pub concurrency: usize,
    /// Trailing debounce applied to write events.
    pub debounce_delay: Duration,
}

impl SupervisorConfig {
    /// Config with default concurrency and debounce.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            concurrency: DEFAULT_CONCURRENCY,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

/// Runs one watch session per DSN until cancellation or failure.
pub struct Supervisor {
    config: SupervisorConfig,
    registry: BackendRegistry,
}

struct Session {
    scrubbed: String,
    backend: Arc<dyn BackendPort>,
    indexer: Indexer,
    options: WatchOptions,
}

impl Supervisor {
    /// Supervisor over the built-in backend registry.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_registry(config, BackendRegistry::with_default_backends())
    }

    /// Supervisor over a caller-provided registry.
    #[must_use]
    pub fn with_registry(config: SupervisorConfig, registry: BackendRegistry) -> Self {
        Self { config, registry }
    }

    /// Parse, resolve and watch every DSN until `cancellation` fires.
    ///
    /// Configuration errors (malformed DSN, unknown scheme, bad options) fail
    /// the whole run before any session starts. A session failing at runtime
    /// cancels the others; the first such error is returned.
    pub async fn run(&self, dsns: &[String], cancellation: CancellationToken) -> Result<()> {
        if dsns.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "at least one DSN is required",
            ));
        }

        let mut sessions = Vec::with_capacity(dsns.len());
        for raw in dsns {
            sessions.push(self.prepare(raw)?);
        }

        let mut tasks: JoinSet<(String, Result<()>)> = JoinSet::new();
        for session in sessions {
            let ctx = RequestContext::with_cancellation(
                CorrelationId::new_session_id(),
                cancellation.clone(),
            );
            info!(
                correlation_id = ctx.correlation_id().as_str(),
                dsn = session.scrubbed.as_str(),
                "starting watch session"
            );
            tasks.spawn(run_session(ctx, session));
        }

        let mut first_failure: Option<ErrorEnvelope> = None;
        while let Some(joined) = tasks.join_next().await {
            let (scrubbed, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_error) => {
                    error!(error = %join_error, "watch session task panicked");
                    cancellation.cancel();
                    if first_failure.is_none() {
                        first_failure = Some(ErrorEnvelope::unexpected(
                            ErrorCode::internal(),
                            join_error.to_string(),
                            ErrorClass::NonRetriable,
                        ));
                    }
                    continue;
                }
            };
            match outcome {
                Ok(()) => info!(dsn = scrubbed.as_str(), "watch session finished"),
                Err(error) if error.is_cancelled() => {
                    info!(dsn = scrubbed.as_str(), "watch session cancelled");
                }
                Err(error) => {
                    error!(dsn = scrubbed.as_str(), error = %error, "watch session failed");
                    // One broken session takes the whole agent down.
                    cancellation.cancel();
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn prepare(&self, raw: &str) -> Result<Session> {
        let mut dsn = Dsn::parse(raw)?;
        let agent = AgentOptions::extract(&mut dsn)?;
        let scrubbed = dsn.scrubbed();
        let backend = self.registry.resolve(dsn)?;

        let client = IndexingHttpClient::new(IndexingHttpConfig::new(self.config.endpoint.clone()))?;
        let indexer = Indexer::new(
            Arc::new(client),
            IndexerConfig {
                collections: agent.collections,
                source_template: agent.source_template,
                etag_kind: agent.etag_kind,
                concurrency: self.config.concurrency,
                debounce_delay: self.config.debounce_delay,
            },
        )?;

        let options = WatchOptions {
            directory: agent.directory,
            recursive: agent.recursive,
            interval: agent.interval,
            filter: agent.filter,
            ..WatchOptions::default()
        };

        Ok(Session {
            scrubbed,
            backend,
            indexer,
            options,
        })
    }
}

async fn run_session(ctx: RequestContext, session: Session) -> (String, Result<()>) {
    let handler: Arc<dyn WatchHandler> = Arc::new(session.indexer);
    let options = session.options;
    let watch_ctx = ctx.clone();
    let outcome = session
        .backend
        .mount(
            &ctx,
            Box::new(move |fs| Box::pin(async move { watch(&watch_ctx, fs, handler, options).await })),
        )
        .await;
    if let Err(error) = &outcome {
        if !error.is_cancelled() {
            warn!(
                correlation_id = ctx.correlation_id().as_str(),
                dsn = session.scrubbed.as_str(),
                error = %error,
                "mount returned an error"
            );
        }
    }
    (session.scrubbed, outcome)
}
