use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::Serialize;

/// A file or directory touched by a change event. Identity is the path.
#[derive(Debug, Clone, Serialize)]
pub struct FileRef {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FileRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }

    /// A path with no final component (`""`, `/`, `..`) cannot name a file.
    pub fn is_well_formed(&self) -> bool {
        self.path.file_name().is_some()
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileRef {}

impl Hash for FileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// One filesystem mutation as delivered by the host.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChangeEvent {
    ContentChanged(FileRef),
    Moved { from: FileRef, to: FileRef },
    Copied { from: FileRef, to: FileRef },
    Deleted(FileRef),
}

impl FileChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FileChangeEvent::ContentChanged(_) => EventKind::ContentChanged,
            FileChangeEvent::Moved { .. } => EventKind::Moved,
            FileChangeEvent::Copied { .. } => EventKind::Copied,
            FileChangeEvent::Deleted(_) => EventKind::Deleted,
        }
    }
}

/// Event categories the classifier can select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContentChanged,
    Moved,
    Copied,
    Deleted,
}

impl EventKind {
    /// Kinds that can invalidate cached state before the mutation lands.
    pub const BEFORE_MUTATION: &'static [EventKind] = &[
        EventKind::ContentChanged,
        EventKind::Moved,
        EventKind::Copied,
        EventKind::Deleted,
    ];

    /// Kinds whose file exists once the mutation has landed.
    pub const AFTER_MUTATION: &'static [EventKind] =
        &[EventKind::ContentChanged, EventKind::Moved, EventKind::Copied];
}
