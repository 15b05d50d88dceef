//! Domain primitives with validated constructors.

use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated collection name attached to indexed documents.
///
/// Non-empty after trimming; limited to alphanumerics plus `-`, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(Box<str>);

impl CollectionName {
    /// Validate and normalize a collection name.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_collection_name"),
                "collection name must be non-empty",
            ));
        }
        let valid = trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !valid {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_collection_name"),
                "collection name contains invalid characters",
            )
            .with_metadata("input", trimmed));
        }
        Ok(Self(trimmed.into()))
    }

    /// Parse a comma-separated list, skipping empty segments.
    pub fn parse_csv(input: &str) -> Result<Vec<Self>> {
        let mut names = Vec::new();
        for segment in input.split(',') {
            if segment.trim().is_empty() {
                continue;
            }
            names.push(Self::parse(segment)?);
        }
        Ok(names)
    }

    /// Borrow the name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// An opaque document id assigned by the remote indexing service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Box<str>);

impl DocumentId {
    /// Validate a document id (non-empty after trimming).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_document_id"),
                "document id must be non-empty",
            ));
        }
        Ok(Self(trimmed.into()))
    }

    /// Borrow the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_validation() {
        assert!(CollectionName::parse("docs-2024").is_ok());
        assert!(CollectionName::parse("  ").is_err());
        assert!(CollectionName::parse("bad name").is_err());
    }

    #[test]
    fn collection_csv_skips_empty_segments() {
        let names = CollectionName::parse_csv("a,,b, c").unwrap();
        let rendered: Vec<&str> = names.iter().map(CollectionName::as_str).collect();
        assert_eq!(rendered, vec!["a", "b", "c"]);
    }

    #[test]
    fn document_id_rejects_empty() {
        assert!(DocumentId::parse("").is_err());
        assert_eq!(DocumentId::parse(" d1 ").unwrap().as_str(), "d1");
    }
}
