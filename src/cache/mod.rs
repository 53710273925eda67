pub mod analysis;
pub mod dependency;
pub mod ignore;

pub use analysis::{AnalysisCache, AnalysisGuard, AnalysisResult, InMemoryAnalysisCache};
pub use dependency::{DependencyCache, DependencyScanResult, DependencyScanStore};
pub use ignore::{IgnoreFileCache, IgnoreRules};
