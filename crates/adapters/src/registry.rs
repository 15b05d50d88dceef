//! Scheme-to-backend factory registry.

use crate::ftp::FtpBackend;
use crate::git::GitBackend;
use crate::local::LocalBackend;
use crate::object_store::ObjectStoreBackend;
use crate::sftp::SftpBackend;
use crate::smb::SmbBackend;
use crate::webdav::WebDavBackend;
use corpus_agent_domain::Dsn;
use corpus_agent_ports::{BackendFactory, BackendPort};
use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps DSN schemes to backend constructors.
///
/// Unknown schemes fail fast at resolve time, before any connection attempt.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend registered.
    #[must_use]
    pub fn with_default_backends() -> Self {
        let mut registry = Self::new();
        registry.register("local", Arc::new(LocalBackend::from_dsn));
        registry.register("ftp", Arc::new(FtpBackend::from_dsn));
        registry.register("sftp", Arc::new(SftpBackend::from_dsn));
        registry.register("smb", Arc::new(SmbBackend::from_dsn));
        registry.register("webdav", Arc::new(WebDavBackend::from_dsn));
        registry.register("minio", Arc::new(ObjectStoreBackend::from_dsn));
        registry.register("git", Arc::new(GitBackend::from_dsn));
        registry
    }

    /// Register (or replace) the factory for a scheme.
    pub fn register(&mut self, scheme: &str, factory: BackendFactory) {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
    }

    /// Registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the backend for a DSN.
    pub fn resolve(&self, dsn: Dsn) -> Result<Arc<dyn BackendPort>> {
        let scheme = dsn.scheme().to_ascii_lowercase();
        let factory = self.factories.get(&scheme).ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::new("backend", "scheme_not_registered"),
                format!("no backend registered for scheme: {scheme}"),
            )
            .with_metadata("scheme", scheme.clone())
        })?;
        factory(dsn)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_the_builtin_schemes() {
        let registry = BackendRegistry::with_default_backends();
        for scheme in ["local", "ftp", "sftp", "smb", "webdav", "minio", "git"] {
            assert!(registry.schemes().contains(&scheme), "{scheme} missing");
        }
    }

    #[test]
    fn unknown_scheme_is_a_configuration_error() {
        let registry = BackendRegistry::with_default_backends();
        let dsn = Dsn::parse("carrier-pigeon://coop/roost").unwrap();
        let error = registry.resolve(dsn).unwrap_err();
        assert_eq!(error.code, ErrorCode::new("backend", "scheme_not_registered"));
    }

    #[test]
    fn resolve_is_case_insensitive_on_scheme() {
        let registry = BackendRegistry::with_default_backends();
        let dsn = Dsn::parse("LOCAL://data").unwrap();
        assert!(registry.resolve(dsn).is_ok());
    }
}
