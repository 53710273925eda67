use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use crate::error::{CacheSyncError, Result};
use crate::walker::find_ignore_files;
use crate::watcher::classify::AffectedFileSet;
use crate::workspace::{Workspace, WorkspaceId};

/// File names whose contents decide what static analysis skips.
pub const IGNORE_FILE_NAMES: &[&str] = &[".dcignore", ".gitignore"];

pub fn is_ignore_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| IGNORE_FILE_NAMES.contains(&name))
        .unwrap_or(false)
}

/// Ignore files of `workspace` among the affected files.
pub fn ignore_files_in(affected: &AffectedFileSet, workspace: &Workspace) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = affected
        .iter()
        .filter(|f| !f.is_dir && is_ignore_file(&f.path) && workspace.contains(&f.path))
        .map(|f| f.path.clone())
        .collect();
    files.sort();
    files
}

/// Per-workspace ignore rules, as seen by the invalidation pipeline.
pub trait IgnoreRules: Send + Sync {
    /// Drop rule sets whose ignore file is affected, directly or through a
    /// deleted/moved parent directory. In-memory only; returns how many were
    /// dropped.
    fn clean_if_affected(&self, workspace: &Workspace, affected: &AffectedFileSet) -> Result<usize>;

    /// Re-parse the given ignore files. Files that no longer exist lose their
    /// rule set. Reads from disk, so callers run it off the dispatch thread.
    fn refresh(&self, workspace: &Workspace, ignore_files: &[PathBuf]) -> Result<usize>;

    fn is_ignored(&self, workspace: WorkspaceId, path: &Path, is_dir: bool) -> bool;

    /// Ignore files with a cached rule set, sorted.
    fn cached_ignore_files(&self, workspace: WorkspaceId) -> Vec<PathBuf>;
}

/// Parsed `.dcignore`/`.gitignore` rule sets keyed by workspace, then by
/// ignore file path.
#[derive(Debug, Default)]
pub struct IgnoreFileCache {
    rules: RwLock<HashMap<WorkspaceId, HashMap<PathBuf, Gitignore>>>,
}

impl IgnoreFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every ignore file in the workspace. Used when a workspace opens.
    pub fn load_workspace(&self, workspace: &Workspace) -> Result<usize> {
        let files = find_ignore_files(workspace.root());
        self.refresh(workspace, &files)
    }

    pub fn forget_workspace(&self, workspace: WorkspaceId) {
        if let Ok(mut rules) = self.rules.write() {
            rules.remove(&workspace);
        }
    }

}

fn parse_ignore_file(path: &Path) -> Result<Gitignore> {
    let dir = path.parent().unwrap_or(Path::new("/"));
    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(path) {
        // Partial errors still leave the valid lines in the builder.
        warn!(path = %path.display(), "ignore file has invalid lines: {err}");
    }
    builder.build().map_err(|e| CacheSyncError::InvalidIgnoreFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl IgnoreRules for IgnoreFileCache {
    fn clean_if_affected(&self, workspace: &Workspace, affected: &AffectedFileSet) -> Result<usize> {
        let mut rules = self
            .rules
            .write()
            .map_err(|e| CacheSyncError::poisoned("ignore rules", e))?;
        let Some(sets) = rules.get_mut(&workspace.id()) else {
            return Ok(0);
        };
        let before = sets.len();
        sets.retain(|ignore_file, _| !affected.covers(ignore_file));
        let cleaned = before - sets.len();
        if cleaned > 0 {
            debug!(workspace = %workspace.id(), cleaned, "dropped affected ignore rule sets");
        }
        Ok(cleaned)
    }

    fn refresh(&self, workspace: &Workspace, ignore_files: &[PathBuf]) -> Result<usize> {
        // Parse outside the lock; only the swap needs it.
        let mut parsed = Vec::with_capacity(ignore_files.len());
        for path in ignore_files {
            if path.is_file() {
                parsed.push((path.clone(), Some(parse_ignore_file(path)?)));
            } else {
                parsed.push((path.clone(), None));
            }
        }

        let mut rules = self
            .rules
            .write()
            .map_err(|e| CacheSyncError::poisoned("ignore rules", e))?;
        let sets = rules.entry(workspace.id()).or_default();
        let mut refreshed = 0;
        for (path, matcher) in parsed {
            match matcher {
                Some(matcher) => {
                    sets.insert(path, matcher);
                    refreshed += 1;
                }
                None => {
                    sets.remove(&path);
                }
            }
        }
        debug!(workspace = %workspace.id(), refreshed, "refreshed ignore rule sets");
        Ok(refreshed)
    }

    fn is_ignored(&self, workspace: WorkspaceId, path: &Path, is_dir: bool) -> bool {
        let Ok(rules) = self.rules.read() else {
            return false;
        };
        let Some(sets) = rules.get(&workspace) else {
            return false;
        };

        // Deepest ignore file wins, so a nested whitelist overrides a parent rule.
        let mut applicable: Vec<&Gitignore> = sets
            .values()
            .filter(|g| path.starts_with(g.path()))
            .collect();
        applicable.sort_by_key(|g| std::cmp::Reverse(g.path().components().count()));

        for matcher in applicable {
            match matcher.matched_path_or_any_parents(path, is_dir) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }
        false
    }

    fn cached_ignore_files(&self, workspace: WorkspaceId) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .rules
            .read()
            .ok()
            .and_then(|rules| rules.get(&workspace).map(|r| r.keys().cloned().collect()))
            .unwrap_or_default();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::classify::{Phase, affected_files};
    use crate::watcher::event::{EventKind, FileChangeEvent, FileRef};
    use std::fs;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(WorkspaceId::new(1), root.to_path_buf(), vec![])
    }

    #[test]
    fn test_load_workspace_and_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".dcignore"), "vendor/\n*.generated.py\n").unwrap();
        let ws = workspace(dir.path());
        let cache = IgnoreFileCache::new();

        assert_eq!(cache.load_workspace(&ws).unwrap(), 1);

        let root = dir.path();
        assert!(cache.is_ignored(ws.id(), &root.join("vendor/lib/x.py"), false));
        assert!(cache.is_ignored(ws.id(), &root.join("api.generated.py"), false));
        assert!(!cache.is_ignored(ws.id(), &root.join("src/app.py"), false));
        assert!(!cache.is_ignored(WorkspaceId::new(9), &root.join("vendor/x.py"), false));
    }

    #[test]
    fn test_nested_whitelist_overrides_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join(".dcignore"), "*.js\n").unwrap();
        fs::write(dir.path().join("keep").join(".dcignore"), "!*.js\n").unwrap();
        let ws = workspace(dir.path());
        let cache = IgnoreFileCache::new();
        cache.load_workspace(&ws).unwrap();

        assert!(cache.is_ignored(ws.id(), &dir.path().join("a.js"), false));
        assert!(!cache.is_ignored(ws.id(), &dir.path().join("keep/a.js"), false));
    }

    #[test]
    fn test_clean_drops_rules_under_deleted_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join(".gitignore"), "out/\n").unwrap();
        fs::write(dir.path().join("pkg").join(".dcignore"), "tmp/\n").unwrap();
        let ws = workspace(dir.path());
        let cache = IgnoreFileCache::new();
        cache.load_workspace(&ws).unwrap();

        let events = vec![FileChangeEvent::Deleted(FileRef::dir(dir.path().join("pkg")))];
        let affected = affected_files(&events, EventKind::BEFORE_MUTATION, Phase::Before, |_| true);

        assert_eq!(cache.clean_if_affected(&ws, &affected).unwrap(), 1);
        assert_eq!(cache.cached_ignore_files(ws.id()), vec![dir.path().join(".gitignore")]);
    }

    #[test]
    fn test_refresh_reparses_and_forgets_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let ignore_path = dir.path().join(".dcignore");
        fs::write(&ignore_path, "a.py\n").unwrap();
        let ws = workspace(dir.path());
        let cache = IgnoreFileCache::new();
        cache.load_workspace(&ws).unwrap();
        assert!(!cache.is_ignored(ws.id(), &dir.path().join("b.py"), false));

        fs::write(&ignore_path, "b.py\n").unwrap();
        cache.refresh(&ws, std::slice::from_ref(&ignore_path)).unwrap();
        assert!(cache.is_ignored(ws.id(), &dir.path().join("b.py"), false));
        assert!(!cache.is_ignored(ws.id(), &dir.path().join("a.py"), false));

        fs::remove_file(&ignore_path).unwrap();
        assert_eq!(cache.refresh(&ws, &[ignore_path]).unwrap(), 0);
        assert!(cache.cached_ignore_files(ws.id()).is_empty());
    }

    #[test]
    fn test_ignore_files_in_filters_by_name_and_workspace() {
        let ws = workspace(Path::new("/repo"));
        let events = vec![
            FileChangeEvent::ContentChanged(FileRef::file("/repo/.dcignore")),
            FileChangeEvent::ContentChanged(FileRef::file("/repo/src/app.py")),
            FileChangeEvent::ContentChanged(FileRef::file("/elsewhere/.gitignore")),
            FileChangeEvent::ContentChanged(FileRef::file("/repo/node_modules/x/.gitignore")),
        ];
        let affected = affected_files(&events, EventKind::AFTER_MUTATION, Phase::After, |_| true);

        assert_eq!(ignore_files_in(&affected, &ws), vec![PathBuf::from("/repo/.dcignore")]);
    }
}
