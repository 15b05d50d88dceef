//! Bounded concurrency gate.
//!
//! A counting semaphore capping parallel in-flight index operations within one
//! watch session. Never shared across sessions.

use crate::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of parallel index operations per session.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Counting semaphore with cancellation-aware acquire.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    /// Create a gate with the given capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "gate capacity must be a positive number",
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Acquire one slot, waiting until one is free or the context is cancelled.
    ///
    /// The returned permit releases its slot on drop, on every exit path.
    pub async fn acquire(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
    ) -> Result<GatePermit> {
        ctx.ensure_not_cancelled(operation)?;

        tokio::select! {
            () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation)),
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => Ok(GatePermit { _permit: permit }),
                Err(_) => Err(ErrorEnvelope::invariant(
                    ErrorCode::internal(),
                    "concurrency gate semaphore closed",
                )),
            },
        }
    }

    /// Number of currently available slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// RAII guard for one gate slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}
