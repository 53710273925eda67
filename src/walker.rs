use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::ignore::IGNORE_FILE_NAMES;
use crate::workspace::Workspace;

/// Walk a workspace and collect every regular file in its content.
///
/// Respects `.gitignore` rules (even outside a git repository), always
/// excludes `node_modules`, and applies the workspace's exclusion patterns.
/// Static-analysis ignore files (`.dcignore`) are applied later by the
/// ignore-rule cache, so edits to them take effect without a re-walk.
pub fn walk_workspace(workspace: &Workspace) -> Vec<PathBuf> {
    let root = workspace.root();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                warn!(workspace = %workspace.id(), "walk error: {err}");
                continue;
            }
        };

        if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if path_contains_node_modules(relative) || is_excluded_by_patterns(relative, workspace.exclude()) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    debug!(workspace = %workspace.id(), files = files.len(), "walked workspace");
    files
}

/// Find every ignore file (`.dcignore`, `.gitignore`) under `root`.
///
/// Hidden files must be visited here, and gitignore filtering is disabled so
/// a `.gitignore` that ignores itself is still found.
pub fn find_ignore_files(root: &Path) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != "node_modules" && entry.file_name() != ".git")
        .build();

    walker
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| IGNORE_FILE_NAMES.contains(&name))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Returns true if any component of `path` is named `node_modules`.
pub fn path_contains_node_modules(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s == "node_modules")
            .unwrap_or(false)
    })
}

/// Returns true if `path` matches any exclusion pattern, either as a whole
/// or through one of its components.
pub fn is_excluded_by_patterns(path: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let path_str = path.to_string_lossy();

    for pattern in patterns {
        let Ok(matcher) = glob::Pattern::new(pattern) else {
            continue;
        };
        if matcher.matches(&path_str) {
            return true;
        }
        for component in path.components() {
            if let Some(s) = component.as_os_str().to_str()
                && matcher.matches(s)
            {
                return true;
            }
        }
    }

    false
}
