//! End-to-end pipeline tests: a local mount watched into a mock indexing
//! service, exercising bootstrap, ETag skips, deletions, write debouncing and
//! source templating together.

use corpus_agent_adapters::{IndexingHttpClient, IndexingHttpConfig, LocalBackend};
use corpus_agent_app::{Indexer, IndexerConfig, watch};
use corpus_agent_domain::{EtagKind, SourceTemplate, WatchOptions};
use corpus_agent_ports::{BackendPort, WatchHandler};
use corpus_agent_shared::{RequestContext, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "corpus-agent-pipeline-{tag}-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(root.join("watched")).unwrap();
    root
}

fn pending_task() -> serde_json::Value {
    json!({ "id": "t1", "status": "pending" })
}

fn succeeded_task() -> serde_json::Value {
    json!({ "id": "t1", "status": "succeeded", "progress": 1.0 })
}

fn empty_documents() -> serde_json::Value {
    json!({ "documents": [], "total": 0, "page": 1, "limit": 100 })
}

/// Start a watch session over `root/watched` against the mock service.
///
/// Returns the session context (cancel it to stop) and the join handle of the
/// mounted watch loop.
fn spawn_session(
    server: &MockServer,
    root: &Path,
    config: IndexerConfig,
) -> (RequestContext, tokio::task::JoinHandle<Result<()>>) {
    let ctx = RequestContext::new_session();
    let session_ctx = ctx.clone();
    let uri = server.uri();
    let root = root.to_path_buf();

    let handle = tokio::spawn(async move {
        let base_url = Url::parse(&uri).unwrap();
        let mut http = IndexingHttpConfig::new(base_url);
        http.task_poll_interval = Duration::from_millis(20);
        let client = IndexingHttpClient::new(http)?;
        let indexer = Indexer::new(Arc::new(client), config)?;
        let handler: Arc<dyn WatchHandler> = Arc::new(indexer);

        let options = WatchOptions {
            directory: "watched".into(),
            interval: Duration::from_millis(50),
            ..WatchOptions::default()
        };

        let backend = LocalBackend::new(root);
        let consumer_ctx = session_ctx.clone();
        backend
            .mount(
                &session_ctx,
                Box::new(move |fs| {
                    Box::pin(async move { watch(&consumer_ctx, fs, handler, options).await })
                }),
            )
            .await
    });
    (ctx, handle)
}

async fn stop_session(
    ctx: RequestContext,
    handle: tokio::task::JoinHandle<Result<()>>,
) -> Result<()> {
    ctx.cancel();
    handle.await.unwrap()
}

#[tokio::test]
async fn bootstrap_indexes_pre_existing_files() {
    let root = temp_root("bootstrap");
    std::fs::write(root.join("watched/1.txt"), b"hello").unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_documents()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/index"))
        .and(body_string_contains("file:///watched/1.txt"))
        .and(body_string_contains("modtime-"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_task()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded_task()))
        .mount(&server)
        .await;

    let (ctx, handle) = spawn_session(&server, &root, IndexerConfig::default());
    tokio::time::sleep(Duration::from_millis(400)).await;
    stop_session(ctx, handle).await.unwrap();

    server.verify().await;
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn matching_etag_skips_the_upload() {
    let root = temp_root("etag-skip");
    std::fs::write(root.join("watched/1.txt"), b"hello").unwrap();
    let server = MockServer::start().await;

    // The service already holds the document at the current size fingerprint.
    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                { "id": "d1", "source": "file:///watched/1.txt", "etag": "size-5" }
            ],
            "total": 1, "page": 1, "limit": 100
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_task()))
        .expect(0)
        .mount(&server)
        .await;

    let config = IndexerConfig {
        etag_kind: EtagKind::Size,
        ..IndexerConfig::default()
    };
    let (ctx, handle) = spawn_session(&server, &root, config);
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_session(ctx, handle).await.unwrap();

    server.verify().await;
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn removed_file_is_deleted_by_source() {
    let root = temp_root("remove");
    std::fs::write(root.join("watched/1.txt"), b"hello").unwrap();
    let server = MockServer::start().await;

    // First query happens during the bootstrap index, later ones during the
    // delete-by-source pass.
    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_documents()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                { "id": "d1", "source": "file:///watched/1.txt", "etag": "size-5" }
            ],
            "total": 1, "page": 1, "limit": 100
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_task()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded_task()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/documents/d1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (ctx, handle) = spawn_session(&server, &root, IndexerConfig::default());
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::remove_file(root.join("watched/1.txt")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_session(ctx, handle).await.unwrap();

    server.verify().await;
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn write_burst_indexes_once_after_the_debounce() {
    let root = temp_root("debounce");
    let file = root.join("watched/1.txt");
    std::fs::write(&file, b"v0").unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_documents()))
        .mount(&server)
        .await;
    // One bootstrap index plus exactly one debounced re-index for the burst.
    Mock::given(method("POST"))
        .and(path("/api/v1/index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_task()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded_task()))
        .mount(&server)
        .await;

    let config = IndexerConfig {
        debounce_delay: Duration::from_millis(200),
        ..IndexerConfig::default()
    };
    let (ctx, handle) = spawn_session(&server, &root, config);
    tokio::time::sleep(Duration::from_millis(250)).await;
    for version in 1..=3u8 {
        std::fs::write(&file, format!("content version {version}")).unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    stop_session(ctx, handle).await.unwrap();

    server.verify().await;
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn source_template_shapes_the_submitted_source() {
    let root = temp_root("template");
    std::fs::create_dir_all(root.join("watched/a")).unwrap();
    std::fs::write(root.join("watched/a/b.txt"), b"hello").unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_documents()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/index"))
        .and(body_string_contains(
            "https://example.org/docs/watched/a/b.txt",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_task()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded_task()))
        .mount(&server)
        .await;

    let config = IndexerConfig {
        source_template: Some(SourceTemplate::parse("https://example.org/docs/__PATH__").unwrap()),
        ..IndexerConfig::default()
    };
    let (ctx, handle) = spawn_session(&server, &root, config);
    tokio::time::sleep(Duration::from_millis(400)).await;
    stop_session(ctx, handle).await.unwrap();

    server.verify().await;
    let _ = std::fs::remove_dir_all(&root);
}
