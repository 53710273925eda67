use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use super::event::{EventKind, FileChangeEvent, FileRef};

/// Which side of the mutation a batch is being looked at from.
///
/// Before a move or copy lands, the touched file is the source (it still
/// sits at its old location). Afterwards it is the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
}

/// Unique files touched by one batch of events.
#[derive(Debug, Clone, Default)]
pub struct AffectedFileSet {
    files: HashSet<FileRef>,
}

impl AffectedFileSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRef> {
        self.files.iter()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(&FileRef::file(path))
    }

    pub fn directories(&self) -> impl Iterator<Item = &FileRef> {
        self.files.iter().filter(|f| f.is_dir)
    }

    /// True if `path` is affected itself or lies under an affected directory.
    /// Prefix matching is per path component.
    pub fn covers(&self, path: &Path) -> bool {
        self.contains(path) || self.directories().any(|d| path.starts_with(&d.path))
    }
}

/// Extract the files touched by events of exactly `kinds`, keeping only those
/// accepted by `filter`.
///
/// Pure and infallible: events carrying a path that cannot name a file are
/// left out of the result. Duplicate paths merge into one entry that is a
/// directory if any of the events saw one.
pub fn affected_files<F>(
    events: &[FileChangeEvent],
    kinds: &[EventKind],
    phase: Phase,
    filter: F,
) -> AffectedFileSet
where
    F: Fn(&FileRef) -> bool,
{
    let mut files: HashSet<FileRef> = HashSet::new();
    for file in events
        .iter()
        .filter(|event| kinds.contains(&event.kind()))
        .map(|event| touched_file(event, phase))
        .filter(|file| file.is_well_formed())
        .filter(|file| filter(*file))
    {
        // A path reported both as file and as directory stays a directory.
        if file.is_dir {
            files.replace(file.clone());
        } else if !files.contains(file) {
            files.insert(file.clone());
        }
    }
    AffectedFileSet { files }
}

fn touched_file(event: &FileChangeEvent, phase: Phase) -> &FileRef {
    match (event, phase) {
        (FileChangeEvent::ContentChanged(file), _) | (FileChangeEvent::Deleted(file), _) => file,
        (FileChangeEvent::Moved { from, .. }, Phase::Before)
        | (FileChangeEvent::Copied { from, .. }, Phase::Before) => from,
        (FileChangeEvent::Moved { to, .. }, Phase::After)
        | (FileChangeEvent::Copied { to, .. }, Phase::After) => to,
    }
}
