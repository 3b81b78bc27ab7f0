use crate::error::{BlastError, BlastResult};
use crate::models::{
    is_path_ancestor, module_relative, Cause, DependencyMap, FullMap, ImpactResult, PackageId,
    ReverseEntry, Service,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::PathBuf;

/// Discovered services together with their resolved dependency sets.
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    pub module: String,
    pub services_root: PathBuf,
    pub shared_roots: Vec<String>,
    pub services: Vec<Service>,
    pub dependencies: DependencyMap,
}

impl ServiceGraph {
    /// Services affected by `changed` packages or by `direct_files` under their roots.
    pub fn resolve(
        &self,
        changed: &BTreeSet<PackageId>,
        direct_files: &[String],
    ) -> BlastResult<ImpactResult> {
        self.ensure_services()?;

        let mut result = ImpactResult::default();
        for service in &self.services {
            let mut causes = BTreeSet::new();

            if let Some(deps) = self.dependencies.get(&service.name) {
                causes.extend(
                    changed
                        .iter()
                        .filter(|pkg| depends_on(deps, pkg))
                        .map(|pkg| Cause::Package(pkg.clone())),
                );
            }

            if direct_files.iter().any(|file| service.owns_file(file)) {
                causes.insert(Cause::Direct);
            }

            if !causes.is_empty() {
                result.affected.insert(service.name.clone(), causes);
            }
        }
        Ok(result)
    }

    /// Forward dependency sets plus the reverse index of shared packages.
    pub fn full_map(&self) -> BlastResult<FullMap> {
        self.ensure_services()?;

        let mut consumers: BTreeMap<PackageId, BTreeSet<String>> = BTreeMap::new();
        for (service, deps) in &self.dependencies {
            for pkg in deps.iter().filter(|pkg| self.is_shared_package(pkg)) {
                consumers
                    .entry(pkg.clone())
                    .or_default()
                    .insert(service.clone());
            }
        }

        let reverse = consumers
            .into_iter()
            .map(|(pkg, consumers)| {
                let count = consumers.len();
                (pkg, ReverseEntry { consumers, count })
            })
            .collect();

        Ok(FullMap {
            forward: self.dependencies.clone(),
            reverse,
        })
    }

    pub fn is_shared_package(&self, package: &str) -> bool {
        let relative = module_relative(&self.module, package);
        relative != package
            && self
                .shared_roots
                .iter()
                .any(|root| is_path_ancestor(root, relative))
    }

    fn ensure_services(&self) -> BlastResult<()> {
        if self.services.is_empty() {
            return Err(BlastError::NoServicesFound {
                root: self.services_root.clone(),
            });
        }
        Ok(())
    }
}

/// Whether `changed` equals or is a path ancestor of any package in `deps`.
fn depends_on(deps: &BTreeSet<PackageId>, changed: &str) -> bool {
    // Every string with `changed` as a prefix sorts contiguously from `changed`.
    deps.range::<str, _>((Bound::Included(changed), Bound::Unbounded))
        .take_while(|dep| dep.starts_with(changed))
        .any(|dep| is_path_ancestor(changed, dep))
}
