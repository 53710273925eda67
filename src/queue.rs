use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::rescan::RescanSummary;
use crate::workspace::{Workspace, WorkspaceId};

/// A unit of background work. Errors are logged by the queue, never returned
/// to whoever scheduled it.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Parameters of a (re)scan of one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RescanRequest {
    pub delay_ms: u64,
    /// Re-analyze every file, not only the ones missing from the cache.
    pub force_full_rescan: bool,
    /// Evict the workspace's analysis cache before analyzing.
    pub clear_cache_first: bool,
}

impl RescanRequest {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Background scheduler used by the invalidation pipeline.
pub trait TaskQueue: Send + Sync {
    /// Run `job` asynchronously, after every job previously scheduled for the
    /// same workspace. `label` names the job in logs.
    fn schedule_named(&self, workspace: &Arc<Workspace>, label: &str, job: Job);

    /// Cancel any pending or running rescan of the workspace and schedule a
    /// new one.
    fn reschedule_rescan(&self, workspace: &Arc<Workspace>, request: RescanRequest);
}

/// The rescan work itself. Runs on the blocking pool and should check
/// `cancel` between units of work.
pub trait Rescan: Send + Sync {
    fn rescan(
        &self,
        workspace: &Workspace,
        request: RescanRequest,
        cancel: &CancellationToken,
    ) -> Result<RescanSummary>;
}

struct NamedJob {
    label: String,
    workspace: Arc<Workspace>,
    job: Job,
}

struct RescanSlot {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Tokio-backed queue: one sequential worker per workspace for named jobs
/// and one superseding rescan slot per workspace.
pub struct BackgroundQueue {
    handle: Handle,
    rescanner: Arc<dyn Rescan>,
    workers: Mutex<HashMap<WorkspaceId, mpsc::UnboundedSender<NamedJob>>>,
    rescans: Mutex<HashMap<WorkspaceId, RescanSlot>>,
}

impl BackgroundQueue {
    pub fn new(handle: Handle, rescanner: Arc<dyn Rescan>) -> Self {
        Self {
            handle,
            rescanner,
            workers: Mutex::new(HashMap::new()),
            rescans: Mutex::new(HashMap::new()),
        }
    }

    /// Cancel the workspace's rescan and stop its job worker once the jobs
    /// already queued have drained.
    pub fn shutdown_workspace(&self, workspace: WorkspaceId) {
        if let Some(slot) = self
            .rescans
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&workspace)
        {
            slot.cancel.cancel();
        }
        self.workers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&workspace);
    }

    fn spawn_worker(&self) -> mpsc::UnboundedSender<NamedJob> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handle.spawn(run_worker(rx));
        tx
    }
}

impl TaskQueue for BackgroundQueue {
    fn schedule_named(&self, workspace: &Arc<Workspace>, label: &str, job: Job) {
        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        let sender = workers
            .entry(workspace.id())
            .or_insert_with(|| self.spawn_worker());

        let named = NamedJob {
            label: label.to_string(),
            workspace: Arc::clone(workspace),
            job,
        };
        // A worker only stops when its runtime shuts down; replace it once.
        if let Err(mpsc::error::SendError(named)) = sender.send(named) {
            let fresh = self.spawn_worker();
            if fresh.send(named).is_err() {
                warn!(workspace = %workspace.id(), label, "task queue is shut down, dropping job");
                return;
            }
            *sender = fresh;
        }
        debug!(workspace = %workspace.id(), label, "job scheduled");
    }

    fn reschedule_rescan(&self, workspace: &Arc<Workspace>, request: RescanRequest) {
        let mut rescans = self.rescans.lock().unwrap_or_else(|p| p.into_inner());
        let previous = rescans.remove(&workspace.id());
        if let Some(slot) = &previous {
            slot.cancel.cancel();
            debug!(workspace = %workspace.id(), "cancelled previous rescan");
        }

        let cancel = CancellationToken::new();
        let task = self.handle.spawn(run_rescan(
            Arc::clone(&self.rescanner),
            Arc::clone(workspace),
            request,
            cancel.clone(),
            previous.map(|slot| slot.task),
        ));
        rescans.insert(workspace.id(), RescanSlot { cancel, task });
        info!(
            workspace = %workspace.id(),
            delay_ms = request.delay_ms,
            force = request.force_full_rescan,
            "rescan scheduled"
        );
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<NamedJob>) {
    while let Some(NamedJob { label, workspace, job }) = rx.recv().await {
        if workspace.is_disposed() {
            debug!(workspace = %workspace.id(), label = %label, "workspace disposed, skipping job");
            continue;
        }
        match tokio::task::spawn_blocking(job).await {
            Ok(Ok(())) => debug!(workspace = %workspace.id(), label = %label, "job finished"),
            Ok(Err(err)) => warn!(workspace = %workspace.id(), label = %label, "job failed: {err}"),
            Err(err) => warn!(workspace = %workspace.id(), label = %label, "job panicked: {err}"),
        }
    }
}

async fn run_rescan(
    rescanner: Arc<dyn Rescan>,
    workspace: Arc<Workspace>,
    request: RescanRequest,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    // One analysis per workspace: let the superseded run observe its
    // cancellation and wind down first.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(workspace = %workspace.id(), "rescan superseded before start");
            return;
        }
        _ = tokio::time::sleep(request.delay()) => {}
    }

    if workspace.is_disposed() {
        return;
    }

    let id = workspace.id();
    let result = tokio::task::spawn_blocking(move || rescanner.rescan(&workspace, request, &cancel)).await;
    match result {
        Ok(Ok(summary)) => info!(workspace = %id, ?summary, "rescan finished"),
        Ok(Err(err)) => warn!(workspace = %id, "rescan failed: {err}"),
        Err(err) => warn!(workspace = %id, "rescan panicked: {err}"),
    }
}

/// Runs named jobs immediately on the calling thread and records every
/// request. Used for one-shot simulations and tests.
#[derive(Debug, Default)]
pub struct InlineQueue {
    labels: Mutex<Vec<String>>,
    rescans: Mutex<Vec<(WorkspaceId, RescanRequest)>>,
}

impl InlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn rescans(&self) -> Vec<(WorkspaceId, RescanRequest)> {
        self.rescans.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl TaskQueue for InlineQueue {
    fn schedule_named(&self, workspace: &Arc<Workspace>, label: &str, job: Job) {
        self.labels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(label.to_string());
        if let Err(err) = job() {
            warn!(workspace = %workspace.id(), label, "job failed: {err}");
        }
    }

    fn reschedule_rescan(&self, workspace: &Arc<Workspace>, request: RescanRequest) {
        self.rescans
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((workspace.id(), request));
    }
}
