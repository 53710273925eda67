use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::build_files::is_build_file;
use crate::cache::{AnalysisResult, DependencyScanResult};
use crate::error::{CacheSyncError, Result};
use crate::walker::walk_workspace;
use crate::workspace::Workspace;

/// Adapter over the external scanning tool.
///
/// Implementations run on background workers and may block.
pub trait Scanner: Send + Sync {
    /// Static analysis of a single source file.
    fn analyze_file(&self, workspace: &Workspace, path: &Path) -> Result<AnalysisResult>;

    /// Dependency scan of the whole workspace.
    fn scan_dependencies(&self, workspace: &Workspace) -> Result<DependencyScanResult>;
}

/// Local scanner that records file fingerprints and manifest inventory
/// without running an external analyzer. Reports no issues.
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryScanner;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Scanner for InventoryScanner {
    fn analyze_file(&self, _workspace: &Workspace, path: &Path) -> Result<AnalysisResult> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| CacheSyncError::ScanFailed(format!("{}: {e}", path.display())))?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(AnalysisResult {
            size: metadata.len(),
            mtime_secs,
            issue_count: 0,
        })
    }

    fn scan_dependencies(&self, workspace: &Workspace) -> Result<DependencyScanResult> {
        let mut manifests: Vec<_> = walk_workspace(workspace)
            .into_iter()
            .filter(|p| is_build_file(p))
            .collect();
        manifests.sort();
        Ok(DependencyScanResult {
            manifests,
            scanned_at_secs: now_secs(),
        })
    }
}
