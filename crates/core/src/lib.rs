pub mod analysis;
pub mod changes;
pub mod config;
pub mod depmap;
pub mod error;
pub mod impact;
pub mod models;
pub mod registry;
pub mod resolver;

pub use analysis::{affected, full_map, AffectedReport, Collaborators, FullMapReport, Workspace};
pub use changes::{ChangeInput, ChangeSet, ChangeSource, GitChangeSource};
pub use config::{parse_dir_list, AnalysisConfig, ResolverFailurePolicy};
pub use error::{BlastError, BlastResult, ResolverError, ResolverWarning};
pub use impact::ServiceGraph;
pub use models::{
    is_path_ancestor, module_relative, Cause, DependencyMap, FullMap, ImpactResult, PackageId,
    ReverseEntry, Service,
};
pub use resolver::{GoListResolver, GoOptions, PackageResolver};

/// Version of the analysis engine, recorded when a workspace is loaded.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
