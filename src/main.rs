mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cli::{Cli, Commands, PathPair};
use scan_cache::cache::{
    AnalysisCache, DependencyCache, DependencyScanStore, IgnoreFileCache, IgnoreRules,
    InMemoryAnalysisCache,
};
use scan_cache::config::ScanCacheConfig;
use scan_cache::language::ExtensionFormats;
use scan_cache::logging::init_tracing;
use scan_cache::output::{SimulationReport, print_simulation};
use scan_cache::pipeline::{Collaborators, InvalidationPipeline, InvalidationSettings};
use scan_cache::queue::{BackgroundQueue, InlineQueue, Rescan, RescanRequest, TaskQueue};
use scan_cache::rescan::AnalysisRunner;
use scan_cache::scanner::InventoryScanner;
use scan_cache::watcher::event::{FileChangeEvent, FileRef};
use scan_cache::watcher::{run_dispatch_loop, start_watcher};
use scan_cache::workspace::{OpenWorkspaces, WorkspaceRegistry};

const FULL_RESCAN: RescanRequest = RescanRequest {
    delay_ms: 0,
    force_full_rescan: true,
    clear_cache_first: false,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { roots } => {
            let roots = roots
                .iter()
                .map(|r| canonical_root(r))
                .collect::<Result<Vec<_>>>()?;
            let config = ScanCacheConfig::load_for_roots(&roots);
            init_tracing(&config.logging)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(watch(roots, config))?;
        }
        Commands::Simulate {
            root,
            changed,
            deleted,
            moved,
            copied,
            analysis_running,
            json,
        } => {
            let root = canonical_root(&root)?;
            let config = ScanCacheConfig::load(&root);
            init_tracing(&config.logging)?;
            let events = build_events(&root, &changed, &deleted, &moved, &copied);
            let report = simulate(root, &config, events, analysis_running)?;
            print_simulation(&report, json);
        }
    }

    Ok(())
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(root).with_context(|| format!("cannot open workspace root {}", root.display()))
}

/// Shared caches of one process.
struct Caches {
    analysis: Arc<InMemoryAnalysisCache>,
    ignore: Arc<IgnoreFileCache>,
    dependencies: Arc<DependencyScanStore>,
    formats: Arc<ExtensionFormats>,
}

impl Caches {
    fn new(config: &ScanCacheConfig) -> Self {
        Self {
            analysis: InMemoryAnalysisCache::new(),
            ignore: Arc::new(IgnoreFileCache::new()),
            dependencies: Arc::new(DependencyScanStore::new()),
            formats: Arc::new(ExtensionFormats::from_config(
                config.analysis.extensions.as_deref(),
            )),
        }
    }

    fn runner(&self) -> AnalysisRunner {
        AnalysisRunner::new(
            Arc::new(InventoryScanner),
            Arc::clone(&self.analysis),
            Arc::clone(&self.ignore),
            Arc::clone(&self.dependencies),
            self.formats.clone(),
        )
    }

    fn pipeline(
        &self,
        registry: Arc<dyn WorkspaceRegistry>,
        queue: Arc<dyn TaskQueue>,
        config: &ScanCacheConfig,
    ) -> InvalidationPipeline {
        InvalidationPipeline::new(
            Collaborators {
                registry,
                analysis: Arc::clone(&self.analysis) as Arc<dyn AnalysisCache>,
                ignore: Arc::clone(&self.ignore) as Arc<dyn IgnoreRules>,
                dependencies: Arc::clone(&self.dependencies) as Arc<dyn DependencyCache>,
                queue,
                formats: self.formats.clone(),
            },
            InvalidationSettings::from(&config.invalidation),
        )
    }
}

async fn watch(roots: Vec<PathBuf>, config: ScanCacheConfig) -> Result<()> {
    let caches = Caches::new(&config);
    let registry = Arc::new(OpenWorkspaces::new());
    let queue = Arc::new(BackgroundQueue::new(
        tokio::runtime::Handle::current(),
        Arc::new(caches.runner()),
    ));

    for root in &roots {
        let exclude = ScanCacheConfig::load(root).exclude_patterns();
        let workspace = registry.open(root.clone(), exclude);
        let rule_sets = caches.ignore.load_workspace(&workspace)?;
        info!(workspace = %workspace.id(), root = %root.display(), rule_sets, "workspace opened");
        queue.reschedule_rescan(&workspace, FULL_RESCAN);
    }

    let pipeline = Arc::new(caches.pipeline(
        Arc::clone(&registry) as Arc<dyn WorkspaceRegistry>,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
        &config,
    ));

    let (handle, rx) = start_watcher(&roots, config.watch.debounce())?;
    tokio::select! {
        _ = run_dispatch_loop(rx, pipeline) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    drop(handle);

    for workspace in registry.open_workspaces() {
        queue.shutdown_workspace(workspace.id());
        registry.close(workspace.id());
        caches.analysis.forget_workspace(workspace.id());
        caches.ignore.forget_workspace(workspace.id());
        caches.dependencies.forget_workspace(workspace.id());
    }
    Ok(())
}

fn file_ref(root: &Path, raw: &Path) -> FileRef {
    let trailing_slash = raw.as_os_str().to_string_lossy().ends_with('/');
    let path: PathBuf = root.join(raw).components().collect();
    let is_dir = trailing_slash || path.is_dir();
    FileRef { path, is_dir }
}

fn build_events(
    root: &Path,
    changed: &[PathBuf],
    deleted: &[PathBuf],
    moved: &[PathPair],
    copied: &[PathPair],
) -> Vec<FileChangeEvent> {
    let mut events = Vec::new();
    events.extend(changed.iter().map(|p| FileChangeEvent::ContentChanged(file_ref(root, p))));
    events.extend(deleted.iter().map(|p| FileChangeEvent::Deleted(file_ref(root, p))));
    events.extend(moved.iter().map(|pair| FileChangeEvent::Moved {
        from: file_ref(root, &pair.from),
        to: file_ref(root, &pair.to),
    }));
    events.extend(copied.iter().map(|pair| FileChangeEvent::Copied {
        from: file_ref(root, &pair.from),
        to: file_ref(root, &pair.to),
    }));
    events
}

/// Analyze the workspace, apply one batch, and report the resulting cache
/// state. Scheduled jobs run inline so the report shows their effect.
fn simulate(
    root: PathBuf,
    config: &ScanCacheConfig,
    events: Vec<FileChangeEvent>,
    analysis_running: bool,
) -> Result<SimulationReport> {
    let caches = Caches::new(config);
    let registry = Arc::new(OpenWorkspaces::new());
    let workspace = registry.open(root.clone(), config.exclude_patterns());
    caches.ignore.load_workspace(&workspace)?;

    let initial_scan = caches
        .runner()
        .rescan(&workspace, FULL_RESCAN, &CancellationToken::new())?;
    let cached_before = caches.analysis.len(workspace.id());

    let queue = Arc::new(InlineQueue::new());
    let pipeline = caches.pipeline(
        Arc::clone(&registry) as Arc<dyn WorkspaceRegistry>,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
        config,
    );

    let guard = if analysis_running {
        caches.analysis.try_begin_analysis(workspace.id())?
    } else {
        None
    };
    let (before, after) = pipeline.handle_batch(&events);
    drop(guard);

    Ok(SimulationReport {
        root,
        initial_scan,
        before,
        after,
        cached_before,
        cached_after: caches.analysis.len(workspace.id()),
        dependency_results_cached: caches.dependencies.get(workspace.id()).is_some(),
        jobs: queue.labels(),
        rescans: queue.rescans().into_iter().map(|(_, request)| request).collect(),
    })
}
