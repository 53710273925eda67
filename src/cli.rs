use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keeps static-analysis caches in sync with file changes.
///
/// scan-cache watches workspace roots and, for every batch of file changes,
/// invalidates cached analysis results, dependency-scan results and ignore
/// rules that the batch made stale.
#[derive(Parser, Debug)]
#[command(
    name = "scan-cache",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// A `FROM=TO` path pair for move and copy events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPair {
    pub from: PathBuf,
    pub to: PathBuf,
}

fn parse_pair(raw: &str) -> Result<PathPair, String> {
    let Some((from, to)) = raw.split_once('=') else {
        return Err(format!("expected FROM=TO, got '{raw}'"));
    };
    if from.is_empty() || to.is_empty() {
        return Err(format!("expected FROM=TO, got '{raw}'"));
    }
    Ok(PathPair {
        from: PathBuf::from(from),
        to: PathBuf::from(to),
    })
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch one or more workspace roots and keep their caches in sync.
    ///
    /// Runs an initial full analysis of every root, then invalidates and
    /// refreshes caches as files change. Stops on Ctrl-C.
    ///
    /// The first root's `scan-cache.toml` sets invalidation, analysis, watch
    /// and logging options for the whole process; `exclude` is read per root.
    Watch {
        /// Workspace roots to watch.
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },

    /// Apply one hand-written batch of change events to a freshly analyzed
    /// workspace and report what was invalidated.
    ///
    /// Paths are relative to the root unless absolute. Directories are
    /// recognized by a trailing `/` or by existing on disk.
    Simulate {
        /// Workspace root.
        root: PathBuf,

        /// Files whose content changed.
        #[arg(long, value_delimiter = ',')]
        changed: Vec<PathBuf>,

        /// Deleted files or directories.
        #[arg(long, value_delimiter = ',')]
        deleted: Vec<PathBuf>,

        /// Moves, as FROM=TO.
        #[arg(long, value_parser = parse_pair)]
        moved: Vec<PathPair>,

        /// Copies, as FROM=TO.
        #[arg(long, value_parser = parse_pair)]
        copied: Vec<PathPair>,

        /// Pretend a full analysis is still running when the batch arrives.
        #[arg(long)]
        analysis_running: bool,

        /// Output results as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}
