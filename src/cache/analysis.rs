use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::error::{CacheSyncError, Result};
use crate::workspace::WorkspaceId;

/// Last-computed static-analysis result for one file.
///
/// The pipeline treats this as opaque; the fingerprint lets a rescan tell
/// whether the file changed since it was analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub size: u64,
    pub mtime_secs: u64,
    pub issue_count: usize,
}

/// The operations the invalidation pipeline needs from the analysis cache.
///
/// Implementations are called from the dispatch thread while background
/// analyses write new entries, so they must synchronize internally.
pub trait AnalysisCache: Send + Sync {
    fn is_analysis_in_progress(&self, workspace: WorkspaceId) -> Result<bool>;
    fn all_cached_files(&self, workspace: WorkspaceId) -> Result<Vec<PathBuf>>;
    /// Remove the given files. Absent entries are ignored.
    fn remove_files(&self, workspace: WorkspaceId, files: &[PathBuf]) -> Result<usize>;
    /// Drop every entry for the workspace. Returns how many were dropped.
    fn evict_workspace(&self, workspace: WorkspaceId) -> Result<usize>;
}

#[derive(Debug, Default)]
struct WorkspaceEntries {
    files: HashMap<PathBuf, AnalysisResult>,
    in_progress: bool,
}

/// In-memory analysis cache keyed by workspace, then file path.
#[derive(Debug, Default)]
pub struct InMemoryAnalysisCache {
    inner: RwLock<HashMap<WorkspaceId, WorkspaceEntries>>,
}

/// Marks a full analysis as in flight for one workspace. Dropping the guard
/// clears the flag, so a panicking analysis cannot wedge the workspace.
#[derive(Debug)]
pub struct AnalysisGuard {
    cache: Arc<InMemoryAnalysisCache>,
    workspace: WorkspaceId,
}

impl Drop for AnalysisGuard {
    fn drop(&mut self) {
        let mut inner = self
            .cache
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entries) = inner.get_mut(&self.workspace) {
            entries.in_progress = false;
        }
    }
}

impl InMemoryAnalysisCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the workspace's analysis slot. Returns `None` if another
    /// analysis already holds it.
    pub fn try_begin_analysis(self: &Arc<Self>, workspace: WorkspaceId) -> Result<Option<AnalysisGuard>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        let entries = inner.entry(workspace).or_default();
        if entries.in_progress {
            return Ok(None);
        }
        entries.in_progress = true;
        Ok(Some(AnalysisGuard {
            cache: Arc::clone(self),
            workspace,
        }))
    }

    pub fn insert(&self, workspace: WorkspaceId, path: PathBuf, result: AnalysisResult) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        inner.entry(workspace).or_default().files.insert(path, result);
        Ok(())
    }

    /// Store a batch of results unless `cancelled` reports true. The check
    /// happens under the write lock, so an eviction scheduled after the
    /// cancellation always sees the stored entries.
    pub fn store_unless(
        &self,
        workspace: WorkspaceId,
        results: Vec<(PathBuf, AnalysisResult)>,
        cancelled: impl FnOnce() -> bool,
    ) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        if cancelled() {
            return Ok(false);
        }
        inner.entry(workspace).or_default().files.extend(results);
        Ok(true)
    }

    pub fn get(&self, workspace: WorkspaceId, path: &Path) -> Option<AnalysisResult> {
        let inner = self.inner.read().ok()?;
        inner.get(&workspace)?.files.get(path).cloned()
    }

    pub fn len(&self, workspace: WorkspaceId) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.get(&workspace).map(|e| e.files.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, workspace: WorkspaceId) -> bool {
        self.len(workspace) == 0
    }

    /// Forget a closed workspace entirely, including its in-progress flag.
    pub fn forget_workspace(&self, workspace: WorkspaceId) {
        if let Ok(mut inner) = self.inner.write() {
            inner.remove(&workspace);
        }
    }
}

impl AnalysisCache for InMemoryAnalysisCache {
    fn is_analysis_in_progress(&self, workspace: WorkspaceId) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        Ok(inner.get(&workspace).is_some_and(|e| e.in_progress))
    }

    fn all_cached_files(&self, workspace: WorkspaceId) -> Result<Vec<PathBuf>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        Ok(inner
            .get(&workspace)
            .map(|e| e.files.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn remove_files(&self, workspace: WorkspaceId, files: &[PathBuf]) -> Result<usize> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        let Some(entries) = inner.get_mut(&workspace) else {
            return Ok(0);
        };
        let removed = files
            .iter()
            .filter(|path| entries.files.remove(path.as_path()).is_some())
            .count();
        debug!(workspace = %workspace, removed, "removed files from analysis cache");
        Ok(removed)
    }

    fn evict_workspace(&self, workspace: WorkspaceId) -> Result<usize> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CacheSyncError::poisoned("analysis cache", e))?;
        // The in-progress flag belongs to the running analysis, keep it.
        let evicted = inner
            .get_mut(&workspace)
            .map(|e| std::mem::take(&mut e.files).len())
            .unwrap_or(0);
        debug!(workspace = %workspace, evicted, "evicted workspace from analysis cache");
        Ok(evicted)
    }
}
