//! Asynchronous indexing-task state polled from the remote service.

use serde::{Deserialize, Serialize};

/// Remote task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Returns true once the task will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A remote task snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque task id.
    pub id: Box<str>,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Completion fraction in `[0, 1]`.
    #[serde(default)]
    pub progress: f32,
    /// Human-readable progress message.
    #[serde(default)]
    pub message: Option<Box<str>>,
    /// Error detail, set when `status` is `Failed`.
    #[serde(default)]
    pub error: Option<Box<str>>,
    /// When the task was scheduled (service-local timestamp).
    #[serde(default)]
    pub scheduled_at: Option<Box<str>>,
    /// When the task reached a terminal state.
    #[serde(default)]
    pub finished_at: Option<Box<str>>,
}
