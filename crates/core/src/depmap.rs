use crate::config::ResolverFailurePolicy;
use crate::error::{BlastError, BlastResult, ResolverError, ResolverWarning};
use crate::models::{is_path_ancestor, DependencyMap, PackageId, Service};
use crate::resolver::PackageResolver;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub module: String,
    pub jobs: usize,
    pub timeout: Duration,
    pub failure_policy: ResolverFailurePolicy,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyMapBuild {
    pub map: DependencyMap,
    pub warnings: Vec<ResolverWarning>,
}

/// Resolves every service's internal dependency set with at most
/// `opts.jobs` resolver calls in flight.
pub async fn build_dependency_map(
    services: &[Service],
    resolver: Arc<dyn PackageResolver>,
    opts: &BuildOptions,
) -> BlastResult<DependencyMapBuild> {
    let permits = Arc::new(Semaphore::new(opts.jobs.max(1)));
    let mut tasks = JoinSet::new();

    for service in services {
        let service = service.clone();
        let resolver = Arc::clone(&resolver);
        let permits = Arc::clone(&permits);
        let limit = opts.timeout;
        tasks.spawn(async move {
            let resolved = match permits.acquire_owned().await {
                Ok(_permit) => resolve_with_timeout(resolver.as_ref(), &service, limit).await,
                Err(_) => Err(ResolverError::InvalidOutput(
                    "resolver pool closed".to_string(),
                )),
            };
            (service, resolved)
        });
    }

    let mut build = DependencyMapBuild::default();
    while let Some(joined) = tasks.join_next().await {
        let (service, resolved) = match joined {
            Ok(done) => done,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                warn!(error = %err, "resolver task cancelled");
                continue;
            }
        };

        let deps = match resolved {
            Ok(packages) => filter_internal(&service, &opts.module, packages),
            Err(error) => match opts.failure_policy {
                ResolverFailurePolicy::Fail => {
                    tasks.abort_all();
                    return Err(BlastError::Resolver {
                        service: service.name,
                        source: error,
                    });
                }
                ResolverFailurePolicy::Warn => {
                    warn!(service = %service.name, error = %error, "dependency resolution failed; treating as empty");
                    build.warnings.push(ResolverWarning {
                        service: service.name.clone(),
                        error,
                    });
                    BTreeSet::new()
                }
            },
        };

        debug!(service = %service.name, deps = deps.len(), "resolved service dependencies");
        build.map.insert(service.name, deps);
    }

    build.warnings.sort_by(|a, b| a.service.cmp(&b.service));
    info!(
        services = build.map.len(),
        warnings = build.warnings.len(),
        "built dependency map"
    );
    Ok(build)
}

async fn resolve_with_timeout(
    resolver: &dyn PackageResolver,
    service: &Service,
    limit: Duration,
) -> Result<Vec<PackageId>, ResolverError> {
    match timeout(limit, resolver.resolve(&service.build_target())).await {
        Ok(result) => result,
        Err(_) => Err(ResolverError::Timeout(limit)),
    }
}

/// Keeps packages inside `module` that the service does not own itself.
pub fn filter_internal(
    service: &Service,
    module: &str,
    packages: impl IntoIterator<Item = PackageId>,
) -> BTreeSet<PackageId> {
    let own = service.package_prefix(module);
    packages
        .into_iter()
        .filter(|pkg| is_path_ancestor(module, pkg))
        .filter(|pkg| !is_path_ancestor(&own, pkg))
        .collect()
}
