//! Change-to-index pipeline.
//!
//! Turns watch events into indexing-service calls: creates index immediately,
//! writes are debounced per path, removals delete every document recorded for
//! the file's canonical source URL. An ETag match against the already-indexed
//! document short-circuits the upload entirely.

use crate::workflow::{CompensationError, Workflow, WorkflowStep};
use corpus_agent_domain::{
    CollectionName, EtagKind, FileMeta, SourceTemplate, WatchEvent, WatchOp, file_source_url,
};
use corpus_agent_ports::{BoxFuture, FileSystemPort, IndexRequest, IndexingPort, WatchHandler};
use corpus_agent_shared::{
    ConcurrencyGate, DEFAULT_CONCURRENCY, Debouncer, ErrorCode, ErrorEnvelope, RequestContext,
    Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Default trailing delay before a written file is re-indexed.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(60);

/// Tunables for one indexing session.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Collections every indexed document joins.
    pub collections: Vec<CollectionName>,
    /// Source URL template; `None` falls back to `file:///` URLs.
    pub source_template: Option<SourceTemplate>,
    /// Fingerprint scheme for change detection.
    pub etag_kind: EtagKind,
    /// Maximum parallel index operations.
    pub concurrency: usize,
    /// Trailing debounce applied to write events, per path.
    pub debounce_delay: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            source_template: None,
            etag_kind: EtagKind::Modtime,
            concurrency: DEFAULT_CONCURRENCY,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

/// Watch handler that mirrors filesystem changes into the indexing service.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn IndexingPort>,
    config: IndexerConfig,
    gate: ConcurrencyGate,
    debouncers: Mutex<HashMap<Box<str>, Arc<Debouncer>>>,
}

impl Indexer {
    /// Build an indexer over an indexing-service client.
    pub fn new(client: Arc<dyn IndexingPort>, config: IndexerConfig) -> Result<Self> {
        let gate = ConcurrencyGate::new(config.concurrency)?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                gate,
                debouncers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Indexer")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock_debouncers(&self) -> std::sync::MutexGuard<'_, HashMap<Box<str>, Arc<Debouncer>>> {
        match self.debouncers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Canonical source URL for a mount-relative path.
    fn source_for(&self, path: &str) -> Result<String> {
        let url = match &self.config.source_template {
            Some(template) => template.render(path)?,
            None => file_source_url(path)?,
        };
        Ok(url.to_string())
    }

    async fn index_file(
        &self,
        ctx: &RequestContext,
        fs: Arc<dyn FileSystemPort>,
        path: &str,
        meta: &FileMeta,
    ) -> Result<()> {
        let _permit = self.gate.acquire(ctx, "indexer.index_file").await?;

        let source = self.source_for(path)?;
        let etag = self.config.etag_kind.compute(meta);
        let existing = self
            .client
            .query_documents(ctx, &source, &self.config.collections)
            .await?;
        if existing
            .iter()
            .any(|document| document.etag.as_deref() == Some(etag.as_str()))
        {
            debug!(
                correlation_id = %ctx.correlation_id(),
                path,
                etag,
                "document unchanged, skipping index"
            );
            return Ok(());
        }

        let contents = fs.read_file(ctx, path).await?;
        let request = IndexRequest {
            file_name: basename(path).to_owned(),
            contents,
            source: source.clone(),
            etag: Some(etag),
            collections: self.config.collections.clone(),
        };

        // Submission and completion form a small saga: when the task errors out
        // after an accepted upload, the partial document is deleted by source.
        let task_id: Arc<tokio::sync::Mutex<Option<Box<str>>>> =
            Arc::new(tokio::sync::Mutex::new(None));

        let submit = WorkflowStep::new("index.submit", {
            let client = Arc::clone(&self.client);
            let ctx = ctx.clone();
            let slot = Arc::clone(&task_id);
            move || {
                let client = Arc::clone(&client);
                let ctx = ctx.clone();
                let slot = Arc::clone(&slot);
                let request = request.clone();
                async move {
                    let task = client.index(&ctx, request).await?;
                    *slot.lock().await = Some(task.id);
                    Ok(())
                }
            }
        })
        .with_compensation({
            let client = Arc::clone(&self.client);
            let ctx = ctx.clone();
            let source = source.clone();
            let collections = self.config.collections.clone();
            move || {
                delete_by_source(
                    Arc::clone(&client),
                    ctx.clone(),
                    source.clone(),
                    collections.clone(),
                )
            }
        });

        let complete = WorkflowStep::new("index.complete", {
            let client = Arc::clone(&self.client);
            let ctx = ctx.clone();
            let slot = Arc::clone(&task_id);
            move || {
                let client = Arc::clone(&client);
                let ctx = ctx.clone();
                let slot = Arc::clone(&slot);
                async move {
                    let guard = slot.lock().await;
                    let id = guard.as_deref().ok_or_else(|| {
                        ErrorEnvelope::invariant(
                            ErrorCode::internal(),
                            "index submission recorded no task id",
                        )
                    })?;
                    client.wait_for_task(&ctx, id).await.map(|_| ())
                }
            }
        });

        Workflow::new()
            .step(submit)
            .step(complete)
            .run()
            .await
            .map_err(CompensationError::into_envelope)
    }

    async fn remove_file(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let source = self.source_for(path)?;
        delete_by_source(
            Arc::clone(&self.client),
            ctx.clone(),
            source,
            self.config.collections.clone(),
        )
        .await
    }
}

async fn delete_by_source(
    client: Arc<dyn IndexingPort>,
    ctx: RequestContext,
    source: String,
    collections: Vec<CollectionName>,
) -> Result<()> {
    for document in client.query_documents(&ctx, &source, &collections).await? {
        client.delete_document(&ctx, &document.id).await?;
    }
    Ok(())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl WatchHandler for Indexer {
    fn on_event<'a>(
        &'a self,
        ctx: &'a RequestContext,
        fs: Arc<dyn FileSystemPort>,
        event: WatchEvent,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // Only file contents are indexed.
            if event.meta.is_dir() {
                return Ok(());
            }
            match event.op {
                WatchOp::Create => {
                    self.inner.index_file(ctx, fs, &event.path, &event.meta).await
                }
                WatchOp::Write => {
                    self.schedule_write(ctx, fs, event);
                    Ok(())
                }
                WatchOp::Remove => {
                    let path = event.old_path.as_deref().unwrap_or(&event.path);
                    self.inner.remove_file(ctx, path).await
                }
                WatchOp::Rename => {
                    if let Some(origin) = event.old_path.as_deref() {
                        self.inner.remove_file(ctx, origin).await?;
                    }
                    self.inner.index_file(ctx, fs, &event.path, &event.meta).await
                }
                // Permission flips and moves out of the watched tree carry no
                // content change to mirror.
                WatchOp::Chmod | WatchOp::Move => Ok(()),
            }
        })
    }
}

impl Indexer {
    /// Arm (or re-arm) the per-path debouncer for a write event.
    ///
    /// The map entry is held across the whole re-arm and the fired run removes
    /// itself from the map before indexing, so an event can never re-arm a
    /// debouncer the map has already let go of.
    fn schedule_write(&self, ctx: &RequestContext, fs: Arc<dyn FileSystemPort>, event: WatchEvent) {
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let key = event.path.clone();
        let path = event.path;
        let meta = event.meta;

        let mut debouncers = self.inner.lock_debouncers();
        let debouncer = Arc::clone(debouncers.entry(key).or_insert_with(|| {
            Arc::new(Debouncer::new(self.inner.config.debounce_delay))
        }));
        let slot = Arc::clone(&debouncer);
        debouncer.schedule(async move {
            {
                // Fire time: drop the map entry unless a newer write re-armed
                // this debouncer in the meantime.
                let mut map = inner.lock_debouncers();
                let stale = map
                    .get(&*path)
                    .is_some_and(|entry| Arc::ptr_eq(entry, &slot) && !slot.has_pending());
                if stale {
                    map.remove(&*path);
                }
            }
            if let Err(error) = inner.index_file(&ctx, fs, &path, &meta).await {
                if !error.is_cancelled() {
                    warn!(
                        correlation_id = %ctx.correlation_id(),
                        path = %path,
                        error = %error,
                        "debounced index failed"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_agent_domain::{DocumentId, EntryKind, Task, TaskStatus};
    use corpus_agent_ports::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn meta(name: &str, size: u64, mtime_ms: u64) -> FileMeta {
        FileMeta {
            name: name.into(),
            size,
            mtime_ms,
            kind: EntryKind::File,
            mode: 0o644,
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        indexed: AtomicUsize,
        index_completed: AtomicUsize,
        deleted: AtomicUsize,
        existing_etag: Option<String>,
        index_delay: Option<Duration>,
        fail_wait: bool,
        queried_collections: Mutex<Vec<String>>,
    }

    impl IndexingPort for RecordingClient {
        fn index<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _request: IndexRequest,
        ) -> BoxFuture<'a, Result<Task>> {
            self.indexed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if let Some(delay) = self.index_delay {
                    tokio::time::sleep(delay).await;
                }
                self.index_completed.fetch_add(1, Ordering::SeqCst);
                Ok(Task {
                    id: "task-1".into(),
                    status: TaskStatus::Pending,
                    progress: 0.0,
                    message: None,
                    error: None,
                    scheduled_at: None,
                    finished_at: None,
                })
            })
        }

        fn query_documents<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            source: &'a str,
            collections: &'a [CollectionName],
        ) -> BoxFuture<'a, Result<Vec<Document>>> {
            if let Ok(mut queried) = self.queried_collections.lock() {
                queried.extend(collections.iter().map(ToString::to_string));
            }
            let etag = self.existing_etag.clone();
            let source = source.to_owned();
            Box::pin(async move {
                Ok(etag
                    .map(|etag| {
                        vec![Document {
                            id: DocumentId::parse("doc-1").unwrap(),
                            source,
                            etag: Some(etag),
                        }]
                    })
                    .unwrap_or_default())
            })
        }

        fn delete_document<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _id: &'a DocumentId,
        ) -> BoxFuture<'a, Result<()>> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn wait_for_task<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            task_id: &'a str,
        ) -> BoxFuture<'a, Result<Task>> {
            let fail = self.fail_wait;
            let id: Box<str> = task_id.into();
            Box::pin(async move {
                if fail {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::new("index", "task_failed"),
                        "task failed",
                    ));
                }
                Ok(Task {
                    id,
                    status: TaskStatus::Succeeded,
                    progress: 1.0,
                    message: None,
                    error: None,
                    scheduled_at: None,
                    finished_at: None,
                })
            })
        }
    }

    struct StubFs;

    impl FileSystemPort for StubFs {
        fn read_file<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
        ) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async { Ok(b"hello".to_vec()) })
        }

        fn write_file<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
            _contents: &'a [u8],
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn stat<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            path: &'a str,
        ) -> BoxFuture<'a, Result<FileMeta>> {
            Box::pin(async move { Ok(meta(path, 5, 1_700_000_000_000)) })
        }

        fn read_dir<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
        ) -> BoxFuture<'a, Result<Vec<corpus_agent_domain::DirEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn mkdir_all<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn remove<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn remove_all<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _path: &'a str,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn rename<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _from: &'a str,
            _to: &'a str,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn event(op: WatchOp, path: &str) -> WatchEvent {
        WatchEvent {
            op,
            path: path.into(),
            old_path: matches!(op, WatchOp::Remove | WatchOp::Rename | WatchOp::Move)
                .then(|| path.into()),
            meta: meta(basename(path), 5, 1_700_000_000_000),
        }
    }

    fn indexer_with(client: Arc<RecordingClient>, config: IndexerConfig) -> Indexer {
        Indexer::new(client, config).unwrap()
    }

    #[tokio::test]
    async fn create_indexes_the_file() {
        let client = Arc::new(RecordingClient::default());
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        indexer
            .on_event(&ctx, Arc::new(StubFs), event(WatchOp::Create, "docs/a.txt"))
            .await
            .unwrap();
        assert_eq!(client.indexed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn matching_etag_skips_the_upload() {
        let client = Arc::new(RecordingClient {
            existing_etag: Some("modtime-1700000000".to_owned()),
            ..RecordingClient::default()
        });
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        indexer
            .on_event(&ctx, Arc::new(StubFs), event(WatchOp::Create, "docs/a.txt"))
            .await
            .unwrap();
        assert_eq!(client.indexed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dedup_lookup_is_scoped_to_the_configured_collections() {
        let client = Arc::new(RecordingClient::default());
        let indexer = indexer_with(
            Arc::clone(&client),
            IndexerConfig {
                collections: CollectionName::parse_csv("docs,wiki").unwrap(),
                ..IndexerConfig::default()
            },
        );
        let ctx = RequestContext::new_session();

        indexer
            .on_event(&ctx, Arc::new(StubFs), event(WatchOp::Create, "docs/a.txt"))
            .await
            .unwrap();
        let queried = client.queried_collections.lock().unwrap();
        assert_eq!(queried.as_slice(), ["docs", "wiki"]);
    }

    #[tokio::test]
    async fn remove_deletes_documents_by_source() {
        let client = Arc::new(RecordingClient {
            existing_etag: Some("modtime-999".to_owned()),
            ..RecordingClient::default()
        });
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        indexer
            .on_event(&ctx, Arc::new(StubFs), event(WatchOp::Remove, "docs/a.txt"))
            .await
            .unwrap();
        assert_eq!(client.deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_task_triggers_delete_by_source_compensation() {
        let client = Arc::new(RecordingClient {
            fail_wait: true,
            existing_etag: Some("modtime-999".to_owned()),
            ..RecordingClient::default()
        });
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        let outcome = indexer
            .on_event(&ctx, Arc::new(StubFs), event(WatchOp::Create, "docs/a.txt"))
            .await;
        assert!(outcome.is_err());
        assert_eq!(client.indexed.load(Ordering::SeqCst), 1);
        assert_eq!(client.deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_burst_collapses_to_one_index() {
        let client = Arc::new(RecordingClient::default());
        let indexer = indexer_with(
            Arc::clone(&client),
            IndexerConfig {
                debounce_delay: Duration::from_millis(30),
                ..IndexerConfig::default()
            },
        );
        let ctx = RequestContext::new_session();
        let fs: Arc<dyn FileSystemPort> = Arc::new(StubFs);

        for _ in 0..5 {
            indexer
                .on_event(&ctx, Arc::clone(&fs), event(WatchOp::Write, "docs/a.txt"))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(client.indexed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_during_inflight_debounced_index_drops_neither_upload() {
        let client = Arc::new(RecordingClient {
            index_delay: Some(Duration::from_millis(80)),
            ..RecordingClient::default()
        });
        let indexer = indexer_with(
            Arc::clone(&client),
            IndexerConfig {
                debounce_delay: Duration::from_millis(20),
                ..IndexerConfig::default()
            },
        );
        let ctx = RequestContext::new_session();
        let fs: Arc<dyn FileSystemPort> = Arc::new(StubFs);

        indexer
            .on_event(&ctx, Arc::clone(&fs), event(WatchOp::Write, "docs/a.txt"))
            .await
            .unwrap();
        // Let the first run fire and start its upload, then write again.
        tokio::time::sleep(Duration::from_millis(45)).await;
        indexer
            .on_event(&ctx, Arc::clone(&fs), event(WatchOp::Write, "docs/a.txt"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.index_completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn moves_and_chmods_touch_nothing() {
        let client = Arc::new(RecordingClient {
            existing_etag: Some("modtime-999".to_owned()),
            ..RecordingClient::default()
        });
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        for op in [WatchOp::Move, WatchOp::Chmod] {
            indexer
                .on_event(&ctx, Arc::new(StubFs), event(op, "docs/a.txt"))
                .await
                .unwrap();
        }
        assert_eq!(client.indexed.load(Ordering::SeqCst), 0);
        assert_eq!(client.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn directories_are_ignored() {
        let client = Arc::new(RecordingClient::default());
        let indexer = indexer_with(Arc::clone(&client), IndexerConfig::default());
        let ctx = RequestContext::new_session();

        let mut dir_event = event(WatchOp::Create, "docs/sub");
        dir_event.meta.kind = EntryKind::Directory;
        indexer
            .on_event(&ctx, Arc::new(StubFs), dir_event)
            .await
            .unwrap();
        assert_eq!(client.indexed.load(Ordering::SeqCst), 0);
    }
}
