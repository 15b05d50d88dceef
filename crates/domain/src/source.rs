//! Canonical source URLs for indexed documents.
//!
//! Every indexed document carries a source URL. Without a template the agent
//! emits `file:///<cleaned_path>`; a `corpusSource` template substitutes the
//! literal tokens `__PATH__` and `__ESCAPED_PATH__` per file.

use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

/// Token replaced with the cleaned relative path.
pub const PATH_TOKEN: &str = "__PATH__";
/// Token replaced with the URL-query-escaped cleaned path.
pub const ESCAPED_PATH_TOKEN: &str = "__ESCAPED_PATH__";

// Query escaping keeps the unreserved characters of RFC 3986.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A `corpusSource` URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTemplate(Box<str>);

impl SourceTemplate {
    /// Accept a template string; it must render to a valid URL per file, so
    /// only minimal validation happens here.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_source_template"),
                "source template must be non-empty",
            ));
        }
        Ok(Self(trimmed.into()))
    }

    /// Render the canonical source URL for one file path.
    pub fn render(&self, path: &str) -> Result<Url> {
        let cleaned = clean_path(path);
        let escaped = utf8_percent_encode(&cleaned, QUERY_ESCAPE).to_string();
        let rendered = self
            .0
            .replace(PATH_TOKEN, &cleaned)
            .replace(ESCAPED_PATH_TOKEN, &escaped);
        Url::parse(&rendered).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_source_template"),
                format!("source template renders an invalid URL: {error}"),
            )
            .with_metadata("rendered", rendered)
        })
    }

    /// The raw template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Default source URL when no template is configured: `file:///<path>`.
pub fn file_source_url(path: &str) -> Result<Url> {
    let cleaned = clean_path(path);
    let rendered = format!("file:///{cleaned}");
    Url::parse(&rendered).map_err(|error| {
        ErrorEnvelope::invariant(
            ErrorCode::new("domain", "invalid_source_url"),
            format!("file source URL failed to parse: {error}"),
        )
        .with_metadata("path", cleaned)
    })
}

/// Normalize a watch-relative path: forward slashes, no duplicate separators,
/// no leading `./` or `/`.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut out = String::with_capacity(replaced.len());
    let mut previous_was_slash = false;
    for ch in replaced.chars() {
        if ch == '/' {
            if previous_was_slash {
                continue;
            }
            previous_was_slash = true;
        } else {
            previous_was_slash = false;
        }
        out.push(ch);
    }
    let out = out.trim_start_matches("./");
    out.trim_matches('/').to_owned()
}
