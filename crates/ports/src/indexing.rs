//! Remote indexing-service port.

use crate::BoxFuture;
use corpus_agent_domain::{CollectionName, DocumentId, Task};
use corpus_agent_shared::{RequestContext, Result};
use serde::{Deserialize, Serialize};

/// One indexed document as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Service-assigned identifier.
    pub id: DocumentId,
    /// Canonical source URL.
    pub source: String,
    /// Content fingerprint recorded at index time.
    #[serde(default)]
    pub etag: Option<String>,
}

/// Payload for one index submission.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    /// File name presented to the service (basename of the watched path).
    pub file_name: String,
    /// Raw file contents.
    pub contents: Vec<u8>,
    /// Canonical source URL for dedup and later deletion.
    pub source: String,
    /// Content fingerprint stored alongside the document.
    pub etag: Option<String>,
    /// Collections the document joins.
    pub collections: Vec<CollectionName>,
}

/// Client surface of the indexing service.
pub trait IndexingPort: Send + Sync {
    /// Submit a file for indexing; returns the queued task.
    fn index<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: IndexRequest,
    ) -> BoxFuture<'a, Result<Task>>;

    /// Documents currently indexed for a canonical source URL, scoped to the
    /// given collections so an etag match in one collection cannot mask a
    /// missing document in another.
    fn query_documents<'a>(
        &'a self,
        ctx: &'a RequestContext,
        source: &'a str,
        collections: &'a [CollectionName],
    ) -> BoxFuture<'a, Result<Vec<Document>>>;

    /// Delete a document; deleting an unknown id is not an error.
    fn delete_document<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: &'a DocumentId,
    ) -> BoxFuture<'a, Result<()>>;

    /// Poll a task until it reaches a terminal status.
    fn wait_for_task<'a>(
        &'a self,
        ctx: &'a RequestContext,
        task_id: &'a str,
    ) -> BoxFuture<'a, Result<Task>>;
}
