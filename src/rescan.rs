use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{AnalysisCache, DependencyScanStore, IgnoreFileCache, IgnoreRules, InMemoryAnalysisCache};
use crate::error::Result;
use crate::language::SourceFormats;
use crate::queue::{Rescan, RescanRequest};
use crate::scanner::Scanner;
use crate::walker::walk_workspace;
use crate::workspace::Workspace;

/// What one rescan did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RescanSummary {
    pub analyzed: usize,
    /// Files skipped because the cache already held a result.
    pub already_cached: usize,
    pub failed: usize,
    pub dependencies_scanned: bool,
    pub cancelled: bool,
    /// Another analysis held the workspace's slot.
    pub busy: bool,
}

impl RescanSummary {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}

/// Runs static analysis over a workspace and fills the caches.
pub struct AnalysisRunner {
    scanner: Arc<dyn Scanner>,
    analysis: Arc<InMemoryAnalysisCache>,
    ignore: Arc<IgnoreFileCache>,
    dependencies: Arc<DependencyScanStore>,
    formats: Arc<dyn SourceFormats>,
}

impl AnalysisRunner {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        analysis: Arc<InMemoryAnalysisCache>,
        ignore: Arc<IgnoreFileCache>,
        dependencies: Arc<DependencyScanStore>,
        formats: Arc<dyn SourceFormats>,
    ) -> Self {
        Self {
            scanner,
            analysis,
            ignore,
            dependencies,
            formats,
        }
    }

    /// Supported, non-ignored files of the workspace.
    fn candidates(&self, workspace: &Workspace) -> Vec<PathBuf> {
        walk_workspace(workspace)
            .into_iter()
            .filter(|p| self.formats.is_supported(p))
            .filter(|p| !self.ignore.is_ignored(workspace.id(), p, false))
            .collect()
    }
}

impl Rescan for AnalysisRunner {
    fn rescan(
        &self,
        workspace: &Workspace,
        request: RescanRequest,
        cancel: &CancellationToken,
    ) -> Result<RescanSummary> {
        let id = workspace.id();
        let Some(_guard) = self.analysis.try_begin_analysis(id)? else {
            debug!(workspace = %id, "analysis already in progress");
            return Ok(RescanSummary {
                busy: true,
                ..RescanSummary::default()
            });
        };

        if request.clear_cache_first {
            self.analysis.evict_workspace(id)?;
        }

        let candidates = self.candidates(workspace);
        let total = candidates.len();
        let pending: Vec<PathBuf> = if request.force_full_rescan {
            candidates
        } else {
            candidates
                .into_iter()
                .filter(|p| self.analysis.get(id, p).is_none())
                .collect()
        };
        let mut summary = RescanSummary {
            already_cached: total - pending.len(),
            ..RescanSummary::default()
        };

        let outcomes: Vec<_> = pending
            .par_iter()
            .filter_map(|path| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((path.clone(), self.scanner.analyze_file(workspace, path)))
            })
            .collect();

        let mut results = Vec::with_capacity(outcomes.len());
        for (path, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push((path, result)),
                Err(err) => {
                    debug!(workspace = %id, path = %path.display(), "analysis failed: {err}");
                    summary.failed += 1;
                }
            }
        }
        summary.analyzed = results.len();

        // Results computed before a cancellation may describe files that have
        // changed since; the superseding run recomputes them.
        if !self.analysis.store_unless(id, results, || cancel.is_cancelled())? {
            info!(workspace = %id, "analysis cancelled");
            return Ok(RescanSummary::cancelled());
        }
        if summary.failed > 0 {
            warn!(workspace = %id, failed = summary.failed, "some files could not be analyzed");
        }

        if request.force_full_rescan || self.dependencies.get(id).is_none() {
            let result = self.scanner.scan_dependencies(workspace)?;
            if !cancel.is_cancelled() {
                self.dependencies.set(id, result)?;
                summary.dependencies_scanned = true;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AnalysisResult;
    use crate::language::ExtensionFormats;
    use crate::scanner::InventoryScanner;
    use crate::workspace::WorkspaceId;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        workspace: Workspace,
        analysis: Arc<InMemoryAnalysisCache>,
        ignore: Arc<IgnoreFileCache>,
        dependencies: Arc<DependencyScanStore>,
        runner: AnalysisRunner,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("src").join("a.py"), "import os\n").unwrap();
        fs::write(dir.path().join("src").join("b.ts"), "export {}\n").unwrap();
        fs::write(dir.path().join("vendor").join("lib.js"), "x\n").unwrap();
        fs::write(dir.path().join("README.md"), "# hi\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        fs::write(dir.path().join(".dcignore"), "vendor/\n").unwrap();

        let workspace = Workspace::new(WorkspaceId::new(1), dir.path().to_path_buf(), vec![]);
        let analysis = InMemoryAnalysisCache::new();
        let ignore = Arc::new(IgnoreFileCache::new());
        ignore.load_workspace(&workspace).unwrap();
        let dependencies = Arc::new(DependencyScanStore::new());
        let runner = AnalysisRunner::new(
            Arc::new(InventoryScanner),
            Arc::clone(&analysis),
            Arc::clone(&ignore),
            Arc::clone(&dependencies),
            Arc::new(ExtensionFormats::default()),
        );
        Fixture {
            dir,
            workspace,
            analysis,
            ignore,
            dependencies,
            runner,
        }
    }

    fn request(force: bool, clear: bool) -> RescanRequest {
        RescanRequest {
            delay_ms: 0,
            force_full_rescan: force,
            clear_cache_first: clear,
        }
    }

    #[test]
    fn test_full_scan_caches_supported_non_ignored_files() {
        let f = fixture();
        let summary = f
            .runner
            .rescan(&f.workspace, request(true, false), &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.analyzed, 2);
        assert!(summary.dependencies_scanned);
        let mut cached = f.analysis.all_cached_files(f.workspace.id()).unwrap();
        cached.sort();
        assert_eq!(
            cached,
            vec![f.dir.path().join("src/a.py"), f.dir.path().join("src/b.ts")]
        );
        assert!(!f.analysis.is_analysis_in_progress(f.workspace.id()).unwrap());
        let deps = f.dependencies.get(f.workspace.id()).unwrap();
        assert_eq!(deps.manifests, vec![f.dir.path().join("requirements.txt")]);
        assert!(f.ignore.is_ignored(f.workspace.id(), &f.dir.path().join("vendor/lib.js"), false));
    }

    #[test]
    fn test_incremental_scan_only_fills_gaps() {
        let f = fixture();
        let id = f.workspace.id();
        let marker = AnalysisResult {
            size: 999,
            mtime_secs: 1,
            issue_count: 3,
        };
        f.analysis
            .insert(id, f.dir.path().join("src/a.py"), marker.clone())
            .unwrap();

        let summary = f
            .runner
            .rescan(&f.workspace, request(false, false), &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.analyzed, 1);
        assert_eq!(summary.already_cached, 1);
        assert_eq!(f.analysis.get(id, &f.dir.path().join("src/a.py")), Some(marker));
    }

    #[test]
    fn test_clear_cache_first_drops_stale_entries() {
        let f = fixture();
        let id = f.workspace.id();
        f.analysis
            .insert(
                id,
                f.dir.path().join("gone.py"),
                AnalysisResult {
                    size: 0,
                    mtime_secs: 0,
                    issue_count: 0,
                },
            )
            .unwrap();

        f.runner
            .rescan(&f.workspace, request(false, true), &CancellationToken::new())
            .unwrap();

        assert!(f.analysis.get(id, &f.dir.path().join("gone.py")).is_none());
        assert_eq!(f.analysis.len(id), 2);
    }

    #[test]
    fn test_cancelled_scan_stores_nothing() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = f.runner.rescan(&f.workspace, request(true, false), &cancel).unwrap();

        assert!(summary.cancelled);
        assert!(f.analysis.is_empty(f.workspace.id()));
        assert!(f.dependencies.get(f.workspace.id()).is_none());
    }

    #[test]
    fn test_busy_when_another_analysis_holds_the_slot() {
        let f = fixture();
        let _guard = f.analysis.try_begin_analysis(f.workspace.id()).unwrap().unwrap();

        let summary = f
            .runner
            .rescan(&f.workspace, request(true, false), &CancellationToken::new())
            .unwrap();

        assert!(summary.busy);
        assert!(f.analysis.is_empty(f.workspace.id()));
    }
}
