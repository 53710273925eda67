use crate::workspace::WorkspaceId;

/// Errors raised while keeping scan caches in sync with the filesystem.
///
/// None of these are fatal to a batch: the pipeline catches them at the
/// per-workspace boundary, logs them and moves on to the next workspace.
#[derive(Debug, thiserror::Error)]
pub enum CacheSyncError {
    /// The workspace was closed between enumeration and processing.
    #[error("workspace {0} is disposed")]
    WorkspaceDisposed(WorkspaceId),

    /// A cache lock was poisoned by a panicking writer.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("invalid ignore file {}: {reason}", path.display())]
    InvalidIgnoreFile {
        path: std::path::PathBuf,
        reason: String,
    },

    /// The external scanner failed for a file or a workspace.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheSyncError>;

impl CacheSyncError {
    /// Build a `CacheUnavailable` from a poisoned lock, naming the cache.
    pub(crate) fn poisoned<T>(cache: &str, _err: std::sync::PoisonError<T>) -> Self {
        CacheSyncError::CacheUnavailable(format!("{cache} lock poisoned"))
    }
}
