//! # corpus-agent-shared
//!
//! Shared utilities, result types, and error handling for the corpus-agent workspace.
//!
//! This crate provides foundational types used across all other crates:
//!
//! - Result and error envelope types
//! - Concurrency primitives (cancellation, request context, gate, debouncer)
//! - Secret redaction helpers
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - This crate only depends on external crates
//! 2. **Cancellation-aware** - Every blocking primitive respects the request context
//! 3. **Serde-compatible** - Error types support serialization

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod concurrency;
pub mod debounce;
pub mod errors;
pub mod gate;
pub mod redaction;
pub mod result;

pub use concurrency::{
    CancellationToken, CorrelationId, RequestContext, sleep_with_cancellation,
};
pub use debounce::Debouncer;
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, REDACTED_VALUE,
};
pub use gate::{ConcurrencyGate, DEFAULT_CONCURRENCY, GatePermit};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::Result;

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
