//! Content fingerprints used to skip redundant uploads.
//!
//! Equality is authoritative: the indexer never reads file content to verify.
//! SIZE exists because some backends (object stores, some WebDAV servers)
//! report a constant modification time.

use crate::watch::FileMeta;
use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;

/// Strategy for computing a file's ETag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EtagKind {
    /// `modtime-<unix_seconds>` from the file's modification time.
    #[default]
    Modtime,
    /// `size-<bytes>` from the file's size.
    Size,
}

impl EtagKind {
    /// Parse the `corpusEtag` DSN value.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "modtime" => Ok(Self::Modtime),
            "size" => Ok(Self::Size),
            other => Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_etag_kind"),
                format!("unknown etag kind: {other}"),
            )),
        }
    }

    /// Compute the fingerprint for a file.
    #[must_use]
    pub fn compute(self, meta: &FileMeta) -> String {
        match self {
            Self::Modtime => format!("modtime-{}", meta.mtime_secs()),
            Self::Size => format!("size-{}", meta.size),
        }
    }
}

impl fmt::Display for EtagKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modtime => formatter.write_str("modtime"),
            Self::Size => formatter.write_str("size"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::EntryKind;

    fn meta() -> FileMeta {
        FileMeta {
            name: "1.txt".into(),
            size: 5,
            mtime_ms: 1_700_000_000_000,
            kind: EntryKind::File,
            mode: 0o644,
        }
    }

    #[test]
    fn modtime_etag_uses_unix_seconds() {
        assert_eq!(EtagKind::Modtime.compute(&meta()), "modtime-1700000000");
    }

    #[test]
    fn size_etag_uses_bytes() {
        assert_eq!(EtagKind::Size.compute(&meta()), "size-5");
    }

    #[test]
    fn parse_is_case_insensitive_and_strict() {
        assert_eq!(EtagKind::parse("MODTIME").unwrap(), EtagKind::Modtime);
        assert_eq!(EtagKind::parse("size").unwrap(), EtagKind::Size);
        assert!(EtagKind::parse("sha256").is_err());
    }
}
