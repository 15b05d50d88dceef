//! Shared plumbing for transport adapters.

use corpus_agent_domain::clean_path;
use corpus_agent_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};

/// Run blocking transport work off the async runtime.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("blocking task panicked: {error}"),
            ErrorClass::NonRetriable,
        )
        .with_metadata("operation", operation)
    })?
}

/// Normalize a mount-relative path and reject traversal outside the mount.
pub(crate) fn mount_relative(path: &str) -> Result<String> {
    let cleaned = clean_path(path);
    let escapes = cleaned == ".." || cleaned.starts_with("../") || cleaned.split('/').any(|segment| segment == "..");
    if escapes {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("path escapes the mount root: {path}"),
        ));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_relative_rejects_traversal() {
        assert!(mount_relative("../etc/passwd").is_err());
        assert!(mount_relative("a/../../b").is_err());
        assert_eq!(mount_relative("./a//b/").unwrap(), "a/b");
    }
}
