use crate::changes::{normalize, ChangeInput, ChangeSet, ChangeSource, GitChangeSource};
use crate::config::{read_module_root, AnalysisConfig};
use crate::depmap::{build_dependency_map, BuildOptions};
use crate::error::{BlastResult, ResolverWarning};
use crate::impact::ServiceGraph;
use crate::models::{FullMap, ImpactResult, Service};
use crate::registry::discover;
use crate::resolver::{GoListResolver, PackageResolver};
use std::sync::Arc;
use tracing::info;

/// Collaborators used by an analysis run.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn PackageResolver>,
    pub changes: Arc<dyn ChangeSource>,
}

impl Collaborators {
    /// `go list` and `git diff`, both rooted at the repository.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            resolver: Arc::new(GoListResolver::new(config.go_options())),
            changes: Arc::new(GitChangeSource::new(
                config.repo_root.clone(),
                config.resolver_timeout,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AffectedReport {
    pub module: String,
    pub changes: ChangeSet,
    pub impact: ImpactResult,
    pub warnings: Vec<ResolverWarning>,
}

#[derive(Debug, Clone)]
pub struct FullMapReport {
    pub module: String,
    pub map: FullMap,
    pub warnings: Vec<ResolverWarning>,
}

/// Validated configuration, module path and discovered services.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: AnalysisConfig,
    pub module: String,
    pub services: Vec<Service>,
}

impl Workspace {
    pub fn load(config: &AnalysisConfig) -> BlastResult<Self> {
        let config = config.validate()?;
        let module = read_module_root(&config.repo_root)?;
        let services = discover(&config.repo_root, &config.services_dir, &config.entry)?;
        info!(
            version = crate::version(),
            module = %module,
            services = services.len(),
            "loaded workspace"
        );
        Ok(Self {
            config,
            module,
            services,
        })
    }

    pub async fn graph(
        &self,
        resolver: Arc<dyn PackageResolver>,
    ) -> BlastResult<(ServiceGraph, Vec<ResolverWarning>)> {
        let opts = BuildOptions {
            module: self.module.clone(),
            jobs: self.config.jobs,
            timeout: self.config.resolver_timeout,
            failure_policy: self.config.failure_policy,
        };
        let build = build_dependency_map(&self.services, resolver, &opts).await?;
        let graph = ServiceGraph {
            module: self.module.clone(),
            services_root: self.config.services_root(),
            shared_roots: self.config.shared_roots.clone(),
            services: self.services.clone(),
            dependencies: build.map,
        };
        Ok((graph, build.warnings))
    }
}

pub async fn affected(
    config: &AnalysisConfig,
    input: &ChangeInput,
    collaborators: &Collaborators,
) -> BlastResult<AffectedReport> {
    let workspace = Workspace::load(config)?;
    // A bad revision range fails before any resolver work starts.
    let changes = normalize(
        input,
        collaborators.changes.as_ref(),
        &workspace.module,
        &workspace.config,
    )
    .await?;

    let (graph, warnings) = workspace.graph(Arc::clone(&collaborators.resolver)).await?;
    let impact = graph.resolve(&changes.packages, &changes.files)?;
    info!(
        changed_packages = changes.packages.len(),
        changed_files = changes.files.len(),
        affected = impact.len(),
        "computed affected services"
    );

    Ok(AffectedReport {
        module: workspace.module,
        changes,
        impact,
        warnings,
    })
}

pub async fn full_map(
    config: &AnalysisConfig,
    collaborators: &Collaborators,
) -> BlastResult<FullMapReport> {
    let workspace = Workspace::load(config)?;
    let (graph, warnings) = workspace.graph(Arc::clone(&collaborators.resolver)).await?;
    let map = graph.full_map()?;
    info!(
        services = map.forward.len(),
        shared_packages = map.reverse.len(),
        "computed full dependency map"
    );

    Ok(FullMapReport {
        module: workspace.module,
        map,
        warnings,
    })
}
