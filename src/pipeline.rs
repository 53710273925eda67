//! Two-phase invalidation of scan caches for batches of file changes.
//!
//! The host delivers every batch twice: `before` runs while the files are
//! still in their old state, `after` once the mutation has landed. Both run
//! inline on the dispatch thread and only make in-memory decisions; anything
//! that touches the disk or walks a cache in bulk goes to the task queue.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::build_files::is_build_file;
use crate::cache::ignore::ignore_files_in;
use crate::cache::{AnalysisCache, DependencyCache, IgnoreRules};
use crate::config::InvalidationConfig;
use crate::error::{CacheSyncError, Result};
use crate::language::SourceFormats;
use crate::queue::{RescanRequest, TaskQueue};
use crate::watcher::classify::{AffectedFileSet, Phase, affected_files};
use crate::watcher::event::{EventKind, FileChangeEvent};
use crate::workspace::{Workspace, WorkspaceId, WorkspaceRegistry};

/// Label of the job that drops evicted entries from the analysis cache.
pub const CACHE_UPDATE_LABEL: &str = "updating analysis caches";
/// Label of the job that re-parses changed ignore files.
pub const IGNORE_REFRESH_LABEL: &str = "refreshing ignore rules";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationSettings {
    /// Evicting more than this many files drops the whole workspace cache.
    pub bulk_eviction_threshold: usize,
    /// Delay before an interrupted analysis restarts.
    pub rescan_delay_ms: u64,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            bulk_eviction_threshold: 10,
            rescan_delay_ms: 0,
        }
    }
}

impl From<&InvalidationConfig> for InvalidationSettings {
    fn from(config: &InvalidationConfig) -> Self {
        Self {
            bulk_eviction_threshold: config.bulk_eviction_threshold,
            rescan_delay_ms: config.rescan_delay_ms,
        }
    }
}

/// How cached analysis results were evicted for one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Eviction {
    /// The listed files were removed one by one.
    Files { count: usize },
    /// Too many files were affected; the workspace cache was dropped.
    Workspace { affected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Processed,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Decisions taken for one workspace in one phase.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceOutcome {
    pub workspace: WorkspaceId,
    pub name: String,
    #[serde(flatten)]
    pub status: WorkspaceStatus,
    pub dependency_results_invalidated: bool,
    pub rescan_restarted: bool,
    pub eviction: Option<Eviction>,
    pub ignore_rules_cleaned: usize,
    pub ignore_files_refreshed: usize,
}

impl WorkspaceOutcome {
    fn new(workspace: &Workspace) -> Self {
        Self {
            workspace: workspace.id(),
            name: workspace.name().to_string(),
            status: WorkspaceStatus::Processed,
            dependency_results_invalidated: false,
            rescan_restarted: false,
            eviction: None,
            ignore_rules_cleaned: 0,
            ignore_files_refreshed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub phase: Phase,
    pub events: usize,
    pub affected: usize,
    pub workspaces: Vec<WorkspaceOutcome>,
}

impl BatchReport {
    pub fn outcome(&self, workspace: WorkspaceId) -> Option<&WorkspaceOutcome> {
        self.workspaces.iter().find(|o| o.workspace == workspace)
    }
}

/// Everything the pipeline drives. Each collaborator synchronizes itself.
pub struct Collaborators {
    pub registry: Arc<dyn WorkspaceRegistry>,
    pub analysis: Arc<dyn AnalysisCache>,
    pub ignore: Arc<dyn IgnoreRules>,
    pub dependencies: Arc<dyn DependencyCache>,
    pub queue: Arc<dyn TaskQueue>,
    pub formats: Arc<dyn SourceFormats>,
}

pub struct InvalidationPipeline {
    registry: Arc<dyn WorkspaceRegistry>,
    analysis: Arc<dyn AnalysisCache>,
    ignore: Arc<dyn IgnoreRules>,
    dependencies: Arc<dyn DependencyCache>,
    queue: Arc<dyn TaskQueue>,
    formats: Arc<dyn SourceFormats>,
    settings: InvalidationSettings,
}

fn ensure_live(workspace: &Workspace) -> Result<()> {
    if workspace.is_disposed() {
        return Err(CacheSyncError::WorkspaceDisposed(workspace.id()));
    }
    Ok(())
}

impl InvalidationPipeline {
    pub fn new(collaborators: Collaborators, settings: InvalidationSettings) -> Self {
        let Collaborators {
            registry,
            analysis,
            ignore,
            dependencies,
            queue,
            formats,
        } = collaborators;
        Self {
            registry,
            analysis,
            ignore,
            dependencies,
            queue,
            formats,
            settings,
        }
    }

    pub fn settings(&self) -> InvalidationSettings {
        self.settings
    }

    /// Run both phases for a batch whose mutation the host has already
    /// applied, in order.
    pub fn handle_batch(&self, events: &[FileChangeEvent]) -> (BatchReport, BatchReport) {
        let before = self.before(events);
        let after = self.after(events);
        (before, after)
    }

    /// Mark deletions of paths that are gone from disk as directory deletions
    /// when a cache still holds an entry strictly below them.
    ///
    /// A watcher that only sees paths cannot tell a vanished directory from a
    /// vanished file, and a renamed directory reports no children. Returns
    /// how many events were promoted.
    pub fn resolve_vanished_directories(&self, events: &mut [FileChangeEvent]) -> usize {
        let has_candidates = events
            .iter()
            .any(|e| matches!(e, FileChangeEvent::Deleted(f) if !f.is_dir));
        if !has_candidates {
            return 0;
        }

        let mut known: Vec<PathBuf> = Vec::new();
        for workspace in self.registry.open_workspaces() {
            if workspace.is_disposed() {
                continue;
            }
            match self.analysis.all_cached_files(workspace.id()) {
                Ok(files) => known.extend(files),
                Err(err) => debug!(workspace = %workspace.id(), "cannot list cached files: {err}"),
            }
            known.extend(self.ignore.cached_ignore_files(workspace.id()));
        }

        let mut promoted = 0;
        for event in events.iter_mut() {
            if let FileChangeEvent::Deleted(file) = event
                && !file.is_dir
                && known.iter().any(|p| p != &file.path && p.starts_with(&file.path))
            {
                file.is_dir = true;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(promoted, "deleted paths resolved as directories");
        }
        promoted
    }

    /// Invalidate cached state that the upcoming mutation makes stale.
    pub fn before(&self, events: &[FileChangeEvent]) -> BatchReport {
        let affected = affected_files(events, EventKind::BEFORE_MUTATION, Phase::Before, |_| true);
        let build_files = affected_files(events, EventKind::BEFORE_MUTATION, Phase::Before, |f| {
            !f.is_dir && is_build_file(&f.path)
        });

        let mut report = BatchReport {
            phase: Phase::Before,
            events: events.len(),
            affected: affected.len(),
            workspaces: Vec::new(),
        };
        if affected.is_empty() {
            return report;
        }

        for workspace in self.registry.open_workspaces() {
            let mut outcome = WorkspaceOutcome::new(&workspace);
            let result = self.clean_workspace(&workspace, &affected, &build_files, &mut outcome);
            record_failure(&workspace, result, &mut outcome);
            report.workspaces.push(outcome);
        }
        report
    }

    /// Refresh cached state that depends on the new file contents.
    pub fn after(&self, events: &[FileChangeEvent]) -> BatchReport {
        let affected = affected_files(events, EventKind::AFTER_MUTATION, Phase::After, |_| true);

        let mut report = BatchReport {
            phase: Phase::After,
            events: events.len(),
            affected: affected.len(),
            workspaces: Vec::new(),
        };
        if affected.is_empty() {
            return report;
        }

        for workspace in self.registry.open_workspaces() {
            let mut outcome = WorkspaceOutcome::new(&workspace);
            let result = self.update_workspace(&workspace, &affected, &mut outcome);
            record_failure(&workspace, result, &mut outcome);
            report.workspaces.push(outcome);
        }
        report
    }

    fn clean_workspace(
        &self,
        workspace: &Arc<Workspace>,
        affected: &AffectedFileSet,
        build_files: &AffectedFileSet,
        outcome: &mut WorkspaceOutcome,
    ) -> Result<()> {
        ensure_live(workspace)?;
        let id = workspace.id();

        // A manifest change can reshape the whole dependency graph.
        if build_files.iter().any(|f| workspace.contains(&f.path)) {
            self.dependencies.invalidate(id)?;
            outcome.dependency_results_invalidated = true;
        }

        let source_changed = affected
            .iter()
            .any(|f| !f.is_dir && workspace.contains(&f.path) && self.formats.is_supported(&f.path));
        if source_changed && self.analysis.is_analysis_in_progress(id)? {
            ensure_live(workspace)?;
            self.queue.reschedule_rescan(
                workspace,
                RescanRequest {
                    delay_ms: self.settings.rescan_delay_ms,
                    force_full_rescan: false,
                    clear_cache_first: false,
                },
            );
            outcome.rescan_restarted = true;
            info!(workspace = %id, "restarting in-flight analysis on changed sources");
        }

        let files_to_evict: Vec<PathBuf> = self
            .analysis
            .all_cached_files(id)?
            .into_iter()
            .filter(|path| affected.covers(path))
            .collect();
        if !files_to_evict.is_empty() {
            ensure_live(workspace)?;
            outcome.eviction = Some(self.schedule_eviction(workspace, files_to_evict));
        }

        outcome.ignore_rules_cleaned = self.ignore.clean_if_affected(workspace, affected)?;
        Ok(())
    }

    /// Enqueue a single maintenance job: bulk eviction above the threshold,
    /// exact removal otherwise.
    fn schedule_eviction(&self, workspace: &Arc<Workspace>, files: Vec<PathBuf>) -> Eviction {
        let analysis = Arc::clone(&self.analysis);
        let id = workspace.id();

        if files.len() > self.settings.bulk_eviction_threshold {
            let affected = files.len();
            debug!(workspace = %id, affected, "bulk change, dropping workspace analysis cache");
            self.queue.schedule_named(
                workspace,
                CACHE_UPDATE_LABEL,
                Box::new(move || -> Result<()> {
                    analysis.evict_workspace(id)?;
                    Ok(())
                }),
            );
            Eviction::Workspace { affected }
        } else {
            let count = files.len();
            debug!(workspace = %id, count, "removing changed files from analysis cache");
            self.queue.schedule_named(
                workspace,
                CACHE_UPDATE_LABEL,
                Box::new(move || -> Result<()> {
                    analysis.remove_files(id, &files)?;
                    Ok(())
                }),
            );
            Eviction::Files { count }
        }
    }

    fn update_workspace(
        &self,
        workspace: &Arc<Workspace>,
        affected: &AffectedFileSet,
        outcome: &mut WorkspaceOutcome,
    ) -> Result<()> {
        ensure_live(workspace)?;

        let ignore_files = ignore_files_in(affected, workspace);
        if ignore_files.is_empty() {
            return Ok(());
        }
        outcome.ignore_files_refreshed = ignore_files.len();

        let ignore = Arc::clone(&self.ignore);
        let analysis = Arc::clone(&self.analysis);
        let target = Arc::clone(workspace);
        self.queue.schedule_named(
            workspace,
            IGNORE_REFRESH_LABEL,
            Box::new(move || -> Result<()> {
                ignore.refresh(&target, &ignore_files)?;
                let id = target.id();
                let now_ignored: Vec<PathBuf> = analysis
                    .all_cached_files(id)?
                    .into_iter()
                    .filter(|path| ignore.is_ignored(id, path, false))
                    .collect();
                if !now_ignored.is_empty() {
                    analysis.remove_files(id, &now_ignored)?;
                }
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Per-workspace failures are logged and recorded, never propagated.
fn record_failure(workspace: &Workspace, result: Result<()>, outcome: &mut WorkspaceOutcome) {
    match result {
        Ok(()) => {}
        Err(CacheSyncError::WorkspaceDisposed(id)) => {
            debug!(workspace = %id, "workspace disposed, skipping");
            outcome.status = WorkspaceStatus::Skipped {
                reason: "disposed".to_string(),
            };
        }
        Err(err) => {
            warn!(workspace = %workspace.id(), "cache invalidation failed: {err}");
            outcome.status = WorkspaceStatus::Failed {
                reason: err.to_string(),
            };
        }
    }
}
