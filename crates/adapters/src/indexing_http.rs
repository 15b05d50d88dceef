//! HTTP client for the remote indexing service.
//!
//! All endpoints live under `/api/v1/`. Rate limiting is handled inside the
//! client: a 429 answer is retried after the server-provided deadline
//! (`Retry-After` in seconds or HTTP-date, else `X-RateLimit-Reset` in unix
//! seconds, else one second), up to a bounded number of attempts. Requests are
//! rebuilt from scratch for every attempt, so multipart bodies never need to
//! be rewound.

use corpus_agent_domain::{CollectionName, DocumentId, Task, TaskStatus};
use corpus_agent_ports::{BoxFuture, Document, IndexRequest, IndexingPort};
use corpus_agent_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, sleep_with_cancellation,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RATE_LIMIT_ATTEMPTS: u32 = 5;
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);
const QUERY_PAGE_LIMIT: u32 = 100;

/// Connection settings for the indexing service.
#[derive(Debug, Clone)]
pub struct IndexingHttpConfig {
    /// Service endpoint, e.g. `http://indexer:8080`.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Interval between task polls.
    pub task_poll_interval: Duration,
    /// Maximum attempts for a rate-limited request (including the first).
    pub rate_limit_attempts: u32,
}

impl IndexingHttpConfig {
    /// Config with default polling and retry settings.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: None,
            task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            rate_limit_attempts: DEFAULT_RATE_LIMIT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsPage {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    limit: u32,
}

fn map_reqwest_error(error: reqwest::Error) -> ErrorEnvelope {
    let class = if error.is_timeout() || error.is_connect() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(ErrorCode::new("index", "transport"), error.to_string(), class)
}

fn map_status(status: StatusCode, context: &str) -> ErrorEnvelope {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let class = if status.is_server_error() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("index", "http_status"),
        format!("{context} answered {}: {reason}", status.as_u16()),
        class,
    )
    .with_metadata("status", status.as_str().to_owned())
}

/// Deadline extracted from rate-limit response headers.
fn rate_limit_delay(response: &Response) -> Duration {
    if let Some(value) = response
        .headers()
        .get("Retry-After")
        .and_then(|header| header.to_str().ok())
    {
        if let Ok(seconds) = value.trim().parse::<u64>() {
            return Duration::from_secs(seconds);
        }
        if let Ok(deadline) = httpdate::parse_http_date(value.trim()) {
            return deadline
                .duration_since(SystemTime::now())
                .unwrap_or(DEFAULT_RATE_LIMIT_DELAY);
        }
    }
    if let Some(reset) = response
        .headers()
        .get("X-RateLimit-Reset")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
    {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        return Duration::from_secs(reset.saturating_sub(now));
    }
    DEFAULT_RATE_LIMIT_DELAY
}

/// Typed client for the indexing service.
#[derive(Debug, Clone)]
pub struct IndexingHttpClient {
    client: reqwest::Client,
    config: IndexingHttpConfig,
}

impl IndexingHttpClient {
    /// Build a client with a pooled transport.
    pub fn new(config: IndexingHttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(map_reqwest_error)?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config.base_url.join(path).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::internal(),
                format!("cannot build endpoint {path}: {error}"),
            )
        })
    }

    /// Send a request, rebuilding it per attempt to honor 429 deadlines.
    async fn send_rate_limited<F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        build: F,
    ) -> Result<Response>
    where
        F: Fn() -> Result<reqwest::RequestBuilder>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.ensure_not_cancelled(operation)?;
            let response = build()?.send().await.map_err(map_reqwest_error)?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if attempt >= self.config.rate_limit_attempts {
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("index", "rate_limited"),
                    format!("rate limited after {attempt} attempts"),
                    ErrorClass::Retriable,
                )
                .with_metadata("operation", operation));
            }
            let delay = rate_limit_delay(&response);
            debug!(
                correlation_id = ctx.correlation_id().as_str(),
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "rate limited, backing off"
            );
            sleep_with_cancellation(ctx, delay, operation).await?;
        }
    }

    async fn query_documents_page(
        &self,
        ctx: &RequestContext,
        source: &str,
        collections: &[CollectionName],
        page: u32,
    ) -> Result<DocumentsPage> {
        let url = self.endpoint("api/v1/documents")?;
        let source = source.to_owned();
        let response = self
            .send_rate_limited(ctx, "index.query_documents", || {
                let mut request = self.client.get(url.clone()).query(&[
                    ("source", source.as_str()),
                    ("page", &page.to_string()),
                    ("limit", &QUERY_PAGE_LIMIT.to_string()),
                ]);
                // Repeated like the `collection` parts of an index submission.
                for collection in collections {
                    request = request.query(&[("collection", collection.as_str())]);
                }
                Ok(request)
            })
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "document query"));
        }
        response
            .json::<DocumentsPage>()
            .await
            .map_err(map_reqwest_error)
    }
}

impl IndexingPort for IndexingHttpClient {
    fn index<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: IndexRequest,
    ) -> BoxFuture<'a, Result<Task>> {
        Box::pin(async move {
            let url = self.endpoint("api/v1/index")?;
            let response = self
                .send_rate_limited(ctx, "index.submit", || {
                    let mut form = Form::new().part(
                        "file",
                        Part::bytes(request.contents.clone())
                            .file_name(request.file_name.clone()),
                    );
                    form = form.text("source", request.source.clone());
                    if let Some(etag) = &request.etag {
                        form = form.text("etag", etag.clone());
                    }
                    for collection in &request.collections {
                        form = form.text("collection", collection.to_string());
                    }
                    Ok(self.client.post(url.clone()).multipart(form))
                })
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(map_status(status, "index submission"));
            }
            response.json::<Task>().await.map_err(map_reqwest_error)
        })
    }

    fn query_documents<'a>(
        &'a self,
        ctx: &'a RequestContext,
        source: &'a str,
        collections: &'a [CollectionName],
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        Box::pin(async move {
            let mut documents = Vec::new();
            let mut page = 1;
            loop {
                let batch = self
                    .query_documents_page(ctx, source, collections, page)
                    .await?;
                let fetched = batch.documents.len();
                documents.extend(batch.documents);
                let limit = if batch.limit == 0 {
                    QUERY_PAGE_LIMIT
                } else {
                    batch.limit
                };
                if fetched < limit as usize || documents.len() as u64 >= batch.total {
                    return Ok(documents);
                }
                page = batch.page + 1;
            }
        })
    }

    fn delete_document<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DocumentId,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("api/v1/documents/{id}"))?;
            let response = self
                .send_rate_limited(ctx, "index.delete_document", || {
                    Ok(self.client.delete(url.clone()))
                })
                .await?;
            let status = response.status();
            // Deleting an already-absent document is at-most-once success.
            if status == StatusCode::NOT_FOUND || status.is_success() {
                return Ok(());
            }
            Err(map_status(status, "document deletion"))
        })
    }

    fn wait_for_task<'a>(
        &'a self,
        ctx: &'a RequestContext,
        task_id: &'a str,
    ) -> BoxFuture<'a, Result<Task>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("api/v1/tasks/{task_id}"))?;
            loop {
                let response = self
                    .send_rate_limited(ctx, "index.wait_for_task", || {
                        Ok(self.client.get(url.clone()))
                    })
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(map_status(status, "task poll"));
                }
                let task = response.json::<Task>().await.map_err(map_reqwest_error)?;
                match task.status {
                    TaskStatus::Succeeded => return Ok(task),
                    TaskStatus::Failed => {
                        let detail = task
                            .error
                            .as_deref()
                            .or(task.message.as_deref())
                            .unwrap_or("task failed")
                            .to_owned();
                        return Err(ErrorEnvelope::expected(
                            ErrorCode::new("index", "task_failed"),
                            detail,
                        )
                        .with_metadata("task_id", task_id));
                    }
                    TaskStatus::Pending | TaskStatus::Running => {
                        sleep_with_cancellation(
                            ctx,
                            self.config.task_poll_interval,
                            "index.wait_for_task",
                        )
                        .await?;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_under_the_base_url() {
        let config = IndexingHttpConfig::new(Url::parse("http://indexer:8080/").unwrap());
        let client = IndexingHttpClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("api/v1/index").unwrap().as_str(),
            "http://indexer:8080/api/v1/index"
        );
    }
}
