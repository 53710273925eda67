pub mod classify;
pub mod event;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pipeline::{BatchReport, InvalidationPipeline, WorkspaceStatus};
use event::{FileChangeEvent, FileRef};

/// Handle to a running watcher. Keeps the debouncer alive (dropping stops watching).
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _bridge_task: JoinHandle<()>,
}

/// Directories whose churn never feeds the caches.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Start a debounced watcher over every root.
///
/// Each debounce window becomes one batch of `FileChangeEvent`s on the
/// returned channel. The debouncer cannot tell creations, moves and copies
/// apart, so a path that still exists is reported as changed and a path that
/// is gone as a deleted file; the dispatch loop later promotes the latter to
/// a directory when the caches know entries below it.
pub fn start_watcher(
    roots: &[PathBuf],
    debounce: Duration,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<Vec<FileChangeEvent>>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(debounce, move |res| {
        let _ = std_tx.send(res);
    })?;
    for root in roots {
        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "watching");
    }

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<Vec<FileChangeEvent>>(256);

    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    let batch: Vec<FileChangeEvent> = events
                        .into_iter()
                        .filter_map(|e| event_for_path(&e.path))
                        .collect();
                    if batch.is_empty() {
                        continue;
                    }
                    if tokio_tx.blocking_send(batch).is_err() {
                        return; // receiver dropped, shutdown
                    }
                }
                Err(err) => {
                    warn!("watcher error: {err:?}");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

fn event_for_path(path: &Path) -> Option<FileChangeEvent> {
    if path
        .components()
        .any(|c| SKIPPED_DIRS.iter().any(|d| c.as_os_str() == *d))
    {
        return None;
    }
    if path.exists() {
        Some(FileChangeEvent::ContentChanged(FileRef {
            path: path.to_path_buf(),
            is_dir: path.is_dir(),
        }))
    } else {
        Some(FileChangeEvent::Deleted(FileRef::file(path)))
    }
}

/// Feed every batch through both phases, one batch at a time.
///
/// The phases run on a blocking thread; the loop awaits each batch before
/// taking the next, so a batch never observes a half-processed predecessor.
pub async fn run_dispatch_loop(
    mut rx: tokio_mpsc::Receiver<Vec<FileChangeEvent>>,
    pipeline: Arc<InvalidationPipeline>,
) {
    while let Some(batch) = rx.recv().await {
        let pipeline = Arc::clone(&pipeline);
        match tokio::task::spawn_blocking(move || dispatch_batch(&pipeline, batch)).await {
            Ok((before, after)) => {
                log_report(&before);
                log_report(&after);
            }
            Err(err) => warn!("dispatch task failed: {err}"),
        }
    }
}

/// Run one watcher batch through both phases. Vanished paths are resolved
/// against the caches first, so a renamed directory evicts its contents.
fn dispatch_batch(
    pipeline: &InvalidationPipeline,
    mut batch: Vec<FileChangeEvent>,
) -> (BatchReport, BatchReport) {
    pipeline.resolve_vanished_directories(&mut batch);
    pipeline.handle_batch(&batch)
}

fn log_report(report: &BatchReport) {
    for outcome in &report.workspaces {
        if let WorkspaceStatus::Failed { reason } = &outcome.status {
            warn!(workspace = %outcome.workspace, phase = ?report.phase, "{reason}");
            continue;
        }
        debug!(
            workspace = %outcome.workspace,
            phase = ?report.phase,
            affected = report.affected,
            dependencies = outcome.dependency_results_invalidated,
            rescan = outcome.rescan_restarted,
            eviction = ?outcome.eviction,
            "batch processed"
        );
    }
}
