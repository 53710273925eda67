use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Serialize;
use tracing::info;

use crate::error::{CacheSyncError, Result};
use crate::workspace::WorkspaceId;

/// Result of the last dependency (manifest) scan for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyScanResult {
    /// Build files the scan found, relative paths not guaranteed.
    pub manifests: Vec<PathBuf>,
    pub scanned_at_secs: u64,
}

/// Dependency results are never invalidated per file: a manifest change can
/// reshape the whole dependency graph, so the pipeline only ever clears.
pub trait DependencyCache: Send + Sync {
    /// Drop the workspace's result. Returns whether one was present.
    fn invalidate(&self, workspace: WorkspaceId) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct DependencyScanStore {
    results: RwLock<HashMap<WorkspaceId, DependencyScanResult>>,
}

impl DependencyScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, workspace: WorkspaceId) -> Option<DependencyScanResult> {
        self.results.read().ok()?.get(&workspace).cloned()
    }

    pub fn set(&self, workspace: WorkspaceId, result: DependencyScanResult) -> Result<()> {
        self.results
            .write()
            .map_err(|e| CacheSyncError::poisoned("dependency results", e))?
            .insert(workspace, result);
        Ok(())
    }

    pub fn forget_workspace(&self, workspace: WorkspaceId) {
        if let Ok(mut results) = self.results.write() {
            results.remove(&workspace);
        }
    }
}

impl DependencyCache for DependencyScanStore {
    fn invalidate(&self, workspace: WorkspaceId) -> Result<bool> {
        let removed = self
            .results
            .write()
            .map_err(|e| CacheSyncError::poisoned("dependency results", e))?
            .remove(&workspace)
            .is_some();
        if removed {
            info!(workspace = %workspace, "dependency scan results invalidated");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_clears_only_target_workspace() {
        let store = DependencyScanStore::new();
        let result = DependencyScanResult {
            manifests: vec![PathBuf::from("package.json")],
            scanned_at_secs: 42,
        };
        store.set(WorkspaceId::new(1), result.clone()).unwrap();
        store.set(WorkspaceId::new(2), result.clone()).unwrap();

        assert!(store.invalidate(WorkspaceId::new(1)).unwrap());
        assert!(!store.invalidate(WorkspaceId::new(1)).unwrap(), "second clear is a no-op");
        assert!(store.get(WorkspaceId::new(1)).is_none());
        assert_eq!(store.get(WorkspaceId::new(2)), Some(result));
    }
}
