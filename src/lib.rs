//! Incremental invalidation of static-analysis caches driven by batches of
//! file-change events.
//!
//! [`pipeline::InvalidationPipeline`] is the entry point: hand it each batch
//! before and after the host applies the mutation, and it keeps the analysis
//! cache, dependency-scan results and ignore rules of every open workspace
//! consistent with the file system.

pub mod build_files;
pub mod cache;
pub mod config;
pub mod error;
pub mod language;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod rescan;
pub mod scanner;
pub mod walker;
pub mod watcher;
pub mod workspace;

pub use error::{CacheSyncError, Result};
pub use pipeline::{BatchReport, Collaborators, InvalidationPipeline, InvalidationSettings};
