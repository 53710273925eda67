use std::path::PathBuf;

use serde::Serialize;

use crate::pipeline::{BatchReport, Eviction, WorkspaceStatus};
use crate::queue::RescanRequest;
use crate::rescan::RescanSummary;

/// Result of one `simulate` run.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub root: PathBuf,
    pub initial_scan: RescanSummary,
    pub before: BatchReport,
    pub after: BatchReport,
    /// Cached analysis results before the batch.
    pub cached_before: usize,
    /// Cached analysis results once every scheduled job has run.
    pub cached_after: usize,
    pub dependency_results_cached: bool,
    /// Labels of the maintenance jobs the batch scheduled, in order.
    pub jobs: Vec<String>,
    pub rescans: Vec<RescanRequest>,
}

/// Print a simulation report.
///
/// - `json = true`: emit a pretty-printed JSON object to stdout.
/// - `json = false`: emit a short human-readable summary to stdout.
///
/// Failed workspaces are also reported on stderr so stdout stays clean
/// for JSON consumers.
pub fn print_simulation(report: &SimulationReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising report: {}", e),
        }
        return;
    }

    println!(
        "Analyzed {} files in {}",
        report.initial_scan.analyzed,
        report.root.display()
    );
    println!(
        "Batch of {} events touched {} paths",
        report.before.events, report.before.affected
    );

    for outcome in &report.before.workspaces {
        if let WorkspaceStatus::Skipped { reason } | WorkspaceStatus::Failed { reason } = &outcome.status {
            eprintln!("  workspace {}: {}", outcome.name, reason);
            continue;
        }
        if outcome.dependency_results_invalidated {
            println!("  dependency results invalidated");
        }
        if outcome.rescan_restarted {
            println!("  in-flight analysis restarted");
        }
        match outcome.eviction {
            Some(Eviction::Files { count }) => println!("  evicted {} cached files", count),
            Some(Eviction::Workspace { affected }) => {
                println!("  {} cached files affected, evicted whole workspace", affected)
            }
            None => {}
        }
        if outcome.ignore_rules_cleaned > 0 {
            println!("  dropped {} ignore rule sets", outcome.ignore_rules_cleaned);
        }
    }
    for outcome in &report.after.workspaces {
        if outcome.ignore_files_refreshed > 0 {
            println!("  refreshed {} ignore files", outcome.ignore_files_refreshed);
        }
    }

    println!(
        "Cache: {} -> {} results, dependency results {}",
        report.cached_before,
        report.cached_after,
        if report.dependency_results_cached {
            "cached"
        } else {
            "cleared"
        }
    );
}
