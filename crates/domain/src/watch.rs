//! Watch events, file metadata and watch options.

use crate::glob::PathFilter;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default polling interval between tree walks.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// File system entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Other / unknown.
    Other,
}

/// Best-effort file metadata captured at detection time.
///
/// `mode` is advisory; several backends report a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Entry name (final path segment).
    pub name: Box<str>,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as milliseconds since epoch.
    pub mtime_ms: u64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Unix-style permission bits, best-effort.
    pub mode: u32,
}

impl FileMeta {
    /// Returns true for directory entries.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Modification time truncated to whole seconds since epoch.
    #[must_use]
    pub const fn mtime_secs(&self) -> u64 {
        self.mtime_ms / 1000
    }
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (single path segment).
    pub name: Box<str>,
    /// Entry kind.
    pub kind: EntryKind,
}

/// Operation observed by the polling watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WatchOp {
    /// A file appeared (or pre-existed, during the bootstrap pass).
    Create,
    /// File content changed (size or modification time moved).
    Write,
    /// A file disappeared.
    Remove,
    /// A file moved within the watched tree; `old_path` carries the origin.
    Rename,
    /// Permission bits changed.
    Chmod,
    /// A file moved out of the watched tree.
    Move,
}

impl WatchOp {
    /// All operations, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::Write,
        Self::Remove,
        Self::Rename,
        Self::Chmod,
        Self::Move,
    ];

    /// Stable lowercase name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Chmod => "chmod",
            Self::Move => "move",
        }
    }
}

/// A single detected change.
///
/// `path` is always the post-operation path; `old_path` is only set for
/// rename/move operations. `meta` may be stale by the time the event is
/// handled.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Observed operation.
    pub op: WatchOp,
    /// Post-operation path, forward-slash relative to the mount root.
    pub path: Box<str>,
    /// Pre-operation path for rename/move; empty otherwise.
    pub old_path: Option<Box<str>>,
    /// Metadata captured at detection time.
    pub meta: FileMeta,
}

/// Options controlling one watch session.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directory to watch, relative to the mount root.
    pub directory: Box<str>,
    /// Whether to descend into subdirectories.
    pub recursive: bool,
    /// Poll interval between tree walks.
    pub interval: Duration,
    /// Optional compiled path filter.
    pub filter: Option<PathFilter>,
    /// Operations to report; events outside this set are dropped silently.
    pub events: BTreeSet<WatchOp>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            directory: ".".into(),
            recursive: false,
            interval: DEFAULT_WATCH_INTERVAL,
            filter: None,
            events: WatchOp::ALL.into_iter().collect(),
        }
    }
}

impl WatchOptions {
    /// Returns true when `op` should be reported.
    #[must_use]
    pub fn wants(&self, op: WatchOp) -> bool {
        self.events.contains(&op)
    }

    /// Returns true when `path` passes the filter (or no filter is set).
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.matches(path))
    }
}
