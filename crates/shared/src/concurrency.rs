//! Cancellation tokens and request-scoped context.
//!
//! One `RequestContext` is created per watch session and shared by every
//! suspension point under it (filesystem I/O, HTTP calls, timers). The
//! supervisor clones one `CancellationToken` into every session so a single
//! cancel tears the whole agent down.
//!
//! Cancellation is best-effort: work that has not started is skipped; in-flight
//! work completes unless it cooperates through `ensure_not_cancelled` or
//! `sleep_with_cancellation`.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A correlation identifier used in log lines to tie events to one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::<str>::from(trimmed)))
    }

    /// Create a new watch-session id, best-effort unique within this process.
    #[must_use]
    pub fn new_session_id() -> Self {
        let n = SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let id: Box<str> = format!("watch_{n}").into_boxed_str();
        Self(Arc::<str>::from(id))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel the token and wake all current/future waiters.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Convenience constructor: create a context with an auto-generated `watch_*` id.
    #[must_use]
    pub fn new_session() -> Self {
        Self::new(CorrelationId::new_session_id())
    }

    /// Create a context with an explicit cancellation token (for sharing cancellation).
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the session was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this session.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

/// Sleep for `delay`, returning a cancellation error when the context is
/// cancelled first.
pub async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled")
            .with_metadata("operation", operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
