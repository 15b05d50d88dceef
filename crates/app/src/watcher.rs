//! Polling filesystem watcher.
//!
//! One detection loop walks the tree every `interval`, diffs against the
//! previous snapshot and dispatches each resulting event as its own task so
//! slow handlers never delay the next poll. Handler failures are logged and
//! dropped; the next poll re-discovers anything that still differs.

use corpus_agent_domain::{FileMeta, WatchEvent, WatchOp, WatchOptions};
use corpus_agent_ports::{FileSystemPort, WatchHandler, walk};
use corpus_agent_shared::{RequestContext, Result, sleep_with_cancellation};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

type Snapshot = BTreeMap<String, FileMeta>;

async fn take_snapshot(
    fs: &dyn FileSystemPort,
    ctx: &RequestContext,
    options: &WatchOptions,
) -> Result<Snapshot> {
    let files = walk(fs, ctx, &options.directory, options.recursive).await?;
    Ok(files
        .into_iter()
        .filter(|(path, _)| options.matches(path))
        .collect())
}

fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<WatchEvent> {
    let mut events = Vec::new();

    for (path, meta) in current {
        match previous.get(path) {
            None => events.push(WatchEvent {
                op: WatchOp::Create,
                path: path.clone().into_boxed_str(),
                old_path: None,
                meta: meta.clone(),
            }),
            Some(old) => {
                if old.mtime_ms != meta.mtime_ms || old.size != meta.size {
                    events.push(WatchEvent {
                        op: WatchOp::Write,
                        path: path.clone().into_boxed_str(),
                        old_path: None,
                        meta: meta.clone(),
                    });
                } else if old.mode != meta.mode {
                    events.push(WatchEvent {
                        op: WatchOp::Chmod,
                        path: path.clone().into_boxed_str(),
                        old_path: None,
                        meta: meta.clone(),
                    });
                }
            }
        }
    }

    for (path, meta) in previous {
        if !current.contains_key(path) {
            events.push(WatchEvent {
                op: WatchOp::Remove,
                path: path.clone().into_boxed_str(),
                old_path: Some(path.clone().into_boxed_str()),
                meta: meta.clone(),
            });
        }
    }

    events
}

fn dispatch(
    tasks: &mut JoinSet<()>,
    ctx: &RequestContext,
    fs: &Arc<dyn FileSystemPort>,
    handler: &Arc<dyn WatchHandler>,
    event: WatchEvent,
) {
    let ctx = ctx.clone();
    let fs = Arc::clone(fs);
    let handler = Arc::clone(handler);
    tasks.spawn(async move {
        let op = event.op;
        let path = event.path.clone();
        if let Err(error) = handler.on_event(&ctx, fs, event).await {
            if error.is_cancelled() {
                return;
            }
            warn!(
                correlation_id = ctx.correlation_id().as_str(),
                op = op.as_str(),
                path = path.as_ref(),
                error = %error,
                "watch handler failed"
            );
        }
    });
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(error) = joined {
            warn!(error = %error, "watch handler task panicked");
        }
    }
}

/// Watch a mounted filesystem, feeding change events to `handler`.
///
/// Blocks until the context is cancelled (clean return) or the watched tree
/// becomes unreadable in a way that will not heal (error return). Transient
/// walk failures skip the tick.
pub async fn watch(
    ctx: &RequestContext,
    fs: Arc<dyn FileSystemPort>,
    handler: Arc<dyn WatchHandler>,
    options: WatchOptions,
) -> Result<()> {
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut snapshot = take_snapshot(fs.as_ref(), ctx, &options).await?;
    debug!(
        correlation_id = ctx.correlation_id().as_str(),
        directory = options.directory.as_ref(),
        files = snapshot.len(),
        "watch session started"
    );

    // Bootstrap: pre-existing files surface as synthetic creates so a fresh
    // agent re-indexes what was already there.
    if options.wants(WatchOp::Create) {
        for (path, meta) in &snapshot {
            dispatch(
                &mut tasks,
                ctx,
                &fs,
                &handler,
                WatchEvent {
                    op: WatchOp::Create,
                    path: path.clone().into_boxed_str(),
                    old_path: None,
                    meta: meta.clone(),
                },
            );
        }
    }

    let outcome = loop {
        if sleep_with_cancellation(ctx, options.interval, "watch.tick")
            .await
            .is_err()
        {
            break Ok(());
        }
        reap_finished(&mut tasks);

        let current = match take_snapshot(fs.as_ref(), ctx, &options).await {
            Ok(current) => current,
            Err(error) if error.is_cancelled() => break Ok(()),
            Err(error) if error.class.is_retriable() => {
                warn!(
                    correlation_id = ctx.correlation_id().as_str(),
                    error = %error,
                    "snapshot failed, skipping tick"
                );
                continue;
            }
            Err(error) => break Err(error),
        };

        for event in diff_snapshots(&snapshot, &current) {
            if options.wants(event.op) {
                dispatch(&mut tasks, ctx, &fs, &handler, event);
            }
        }
        snapshot = current;
    };

    // Drain in-flight handlers before returning the mount.
    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "watch handler task panicked");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_agent_domain::EntryKind;

    fn meta(size: u64, mtime_ms: u64, mode: u32) -> FileMeta {
        FileMeta {
            name: "f".into(),
            size,
            mtime_ms,
            kind: EntryKind::File,
            mode,
        }
    }

    #[test]
    fn diff_detects_create_write_chmod_remove() {
        let mut previous = Snapshot::new();
        previous.insert("kept.txt".into(), meta(5, 1000, 0o644));
        previous.insert("touched.txt".into(), meta(5, 1000, 0o644));
        previous.insert("mode.txt".into(), meta(5, 1000, 0o644));
        previous.insert("gone.txt".into(), meta(5, 1000, 0o644));

        let mut current = Snapshot::new();
        current.insert("kept.txt".into(), meta(5, 1000, 0o644));
        current.insert("touched.txt".into(), meta(9, 2000, 0o644));
        current.insert("mode.txt".into(), meta(5, 1000, 0o600));
        current.insert("new.txt".into(), meta(1, 3000, 0o644));

        let events = diff_snapshots(&previous, &current);
        let find = |op: WatchOp| {
            events
                .iter()
                .find(|event| event.op == op)
                .map(|event| event.path.as_ref().to_owned())
        };
        assert_eq!(find(WatchOp::Create).as_deref(), Some("new.txt"));
        assert_eq!(find(WatchOp::Write).as_deref(), Some("touched.txt"));
        assert_eq!(find(WatchOp::Chmod).as_deref(), Some("mode.txt"));
        assert_eq!(find(WatchOp::Remove).as_deref(), Some("gone.txt"));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn removes_carry_the_old_path() {
        let mut previous = Snapshot::new();
        previous.insert("gone.txt".into(), meta(5, 1000, 0o644));
        let events = diff_snapshots(&previous, &Snapshot::new());
        assert_eq!(events[0].old_path.as_deref(), Some("gone.txt"));
    }
}
