use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::walker::{is_excluded_by_patterns, path_contains_node_modules};

/// Opaque identity of an open workspace. Cheap to copy and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkspaceId(u64);

impl WorkspaceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open project root tracked by the host.
///
/// The disposed flag can flip at any time from another thread; anything
/// holding an `Arc<Workspace>` must re-check it before doing work.
#[derive(Debug)]
pub struct Workspace {
    id: WorkspaceId,
    name: String,
    root: PathBuf,
    exclude: Vec<String>,
    disposed: AtomicBool,
}

impl Workspace {
    pub fn new(id: WorkspaceId, root: PathBuf, exclude: Vec<String>) -> Self {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .unwrap_or_else(|| root.display().to_string());
        Self {
            id,
            name,
            root,
            exclude,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Glob patterns excluded from the workspace content.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Content-root membership: under the root, outside `node_modules`, and
    /// not matched by any exclusion pattern.
    pub fn contains(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        !path_contains_node_modules(relative) && !is_excluded_by_patterns(relative, &self.exclude)
    }
}

/// Enumerates the workspaces the pipeline should visit for a batch.
pub trait WorkspaceRegistry: Send + Sync {
    /// Snapshot of currently open workspaces. Entries may be disposed by the
    /// time the caller looks at them.
    fn open_workspaces(&self) -> Vec<Arc<Workspace>>;
}

/// The registry of workspaces opened by this process.
#[derive(Debug, Default)]
pub struct OpenWorkspaces {
    next_id: AtomicU64,
    workspaces: RwLock<Vec<Arc<Workspace>>>,
}

impl OpenWorkspaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a workspace rooted at `root`. Opening the same root twice returns
    /// the existing workspace.
    pub fn open(&self, root: PathBuf, exclude: Vec<String>) -> Arc<Workspace> {
        let mut workspaces = self
            .workspaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = workspaces.iter().find(|w| w.root == root) {
            return Arc::clone(existing);
        }
        let id = WorkspaceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let workspace = Arc::new(Workspace::new(id, root, exclude));
        workspaces.push(Arc::clone(&workspace));
        workspace
    }

    /// Dispose and forget a workspace. Returns it so the caller can drop its
    /// cache entries.
    pub fn close(&self, id: WorkspaceId) -> Option<Arc<Workspace>> {
        let mut workspaces = self
            .workspaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pos = workspaces.iter().position(|w| w.id == id)?;
        let workspace = workspaces.remove(pos);
        workspace.dispose();
        Some(workspace)
    }
}

impl WorkspaceRegistry for OpenWorkspaces {
    fn open_workspaces(&self) -> Vec<Arc<Workspace>> {
        self.workspaces
            .read()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(root: &str, exclude: &[&str]) -> Workspace {
        Workspace::new(
            WorkspaceId::new(1),
            PathBuf::from(root),
            exclude.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_contains_paths_under_root() {
        let w = ws("/repo", &[]);
        assert!(w.contains(Path::new("/repo/package.json")));
        assert!(w.contains(Path::new("/repo/src/app.ts")));
        assert!(!w.contains(Path::new("/other/package.json")));
        assert!(!w.contains(Path::new("/repository/package.json")));
    }

    #[test]
    fn test_contains_skips_node_modules_and_exclusions() {
        let w = ws("/repo", &["dist"]);
        assert!(!w.contains(Path::new("/repo/node_modules/left-pad/package.json")));
        assert!(!w.contains(Path::new("/repo/dist/bundle.js")));
        assert!(w.contains(Path::new("/repo/distribution/notes.md")));
    }

    #[test]
    fn test_open_is_idempotent_per_root() {
        let registry = OpenWorkspaces::new();
        let a = registry.open(PathBuf::from("/a"), vec![]);
        let again = registry.open(PathBuf::from("/a"), vec![]);
        let b = registry.open(PathBuf::from("/b"), vec![]);
        assert_eq!(a.id(), again.id());
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.open_workspaces().len(), 2);
    }

    #[test]
    fn test_close_disposes_and_removes() {
        let registry = OpenWorkspaces::new();
        let a = registry.open(PathBuf::from("/a"), vec![]);
        let closed = registry.close(a.id()).expect("workspace was open");
        assert!(closed.is_disposed());
        assert!(a.is_disposed(), "shared handle observes disposal");
        assert!(registry.open_workspaces().is_empty());
        assert!(registry.close(a.id()).is_none());
    }
}
