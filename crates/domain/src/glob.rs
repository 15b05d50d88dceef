//! Extended glob filter compiled to a regex.
//!
//! Syntax: `/`-delimited segments where `*` matches within a segment, `?`
//! matches a single non-separator character, and `**` recurses across
//! segments. Everything else is literal.

use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use regex::Regex;

/// A compiled path filter.
#[derive(Debug, Clone)]
pub struct PathFilter {
    pattern: Box<str>,
    regex: Regex,
}

impl PathFilter {
    /// Compile an extended glob into a filter.
    pub fn compile(glob: &str) -> Result<Self> {
        let source = glob_to_regex(glob);
        let regex = Regex::new(&source).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("domain", "invalid_watch_filter"),
                format!("invalid watch filter: {error}"),
            )
            .with_metadata("filter", glob)
        })?;
        Ok(Self {
            pattern: glob.into(),
            regex,
        })
    }

    /// Returns true when the relative path matches the glob.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The original glob pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut chars = glob.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` may also match zero segments.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            },
            '?' => out.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(ch);
            },
            _ => out.push(ch),
        }
    }

    out.push('$');
    out
}
