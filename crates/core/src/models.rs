use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Fully qualified import path, e.g. `example.com/mono/shared/models`.
pub type PackageId = String;

/// Service name to its transitive internal dependency set, sorted by name.
pub type DependencyMap = BTreeMap<String, BTreeSet<PackageId>>;

/// A deployable unit discovered under the services directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Service {
    pub name: String,
    /// Repository-relative root, forward-slash separated (`services/orders`).
    pub root: String,
    #[serde(skip)]
    pub path: PathBuf,
}

impl Service {
    /// Target handed to the package resolver, relative to the repository root.
    pub fn build_target(&self) -> String {
        format!("./{}/...", self.root)
    }

    /// Import path prefix owned by this service inside `module`.
    pub fn package_prefix(&self, module: &str) -> PackageId {
        join_package(module, &self.root)
    }

    pub fn owns_file(&self, repo_relative: &str) -> bool {
        is_path_ancestor(&self.root, normalize_path(repo_relative))
    }
}

/// Why a service landed in the affected set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cause {
    /// Files under the service's own root changed.
    Direct,
    Package(PackageId),
}

impl Cause {
    pub fn package(&self) -> Option<&str> {
        match self {
            Cause::Direct => None,
            Cause::Package(pkg) => Some(pkg),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Direct => f.write_str("<direct>"),
            Cause::Package(pkg) => f.write_str(pkg),
        }
    }
}

impl Serialize for Cause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactResult {
    /// Affected service name to its contributing causes.
    pub affected: BTreeMap<String, BTreeSet<Cause>>,
}

impl ImpactResult {
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.affected.len()
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.affected.keys().map(String::as_str)
    }

    /// Regroups the result by cause; each list of services is sorted.
    pub fn by_cause(&self) -> BTreeMap<Cause, Vec<String>> {
        let mut grouped: BTreeMap<Cause, Vec<String>> = BTreeMap::new();
        for (service, causes) in &self.affected {
            for cause in causes {
                grouped
                    .entry(cause.clone())
                    .or_default()
                    .push(service.clone());
            }
        }
        grouped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReverseEntry {
    pub consumers: BTreeSet<String>,
    pub count: usize,
}

/// Forward and reverse adjacency for full-map mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullMap {
    pub forward: DependencyMap,
    pub reverse: BTreeMap<PackageId, ReverseEntry>,
}

/// `ancestor` equals `path` or is one of its leading path segments.
///
/// `shared/a` is an ancestor of `shared/a/b` but not of `shared/ab`.
pub fn is_path_ancestor(ancestor: &str, path: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => ancestor.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Trims `./` prefixes and trailing slashes from a repository-relative path.
pub fn normalize_path(path: &str) -> &str {
    let mut trimmed = path.trim();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.trim_end_matches('/')
}

pub fn join_package(module: &str, relative: &str) -> PackageId {
    let relative = normalize_path(relative);
    if relative.is_empty() {
        module.to_string()
    } else {
        format!("{module}/{relative}")
    }
}

/// Strips `module/` from an import path; paths outside the module are returned as-is.
pub fn module_relative<'a>(module: &str, package: &'a str) -> &'a str {
    match package.strip_prefix(module) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => package,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seq_macro::seq;

    #[test]
    fn ancestor_requires_segment_boundary() {
        assert!(is_path_ancestor("shared", "shared/models"));
        assert!(is_path_ancestor("shared/models", "shared/models"));
        assert!(!is_path_ancestor("shared/a", "shared/ab"));
        assert!(!is_path_ancestor("shared/models", "shared"));
    }

    seq!(N in 1..6 {
        #[test]
        fn ancestor_depth_~N() {
            let segments: Vec<String> = (0..N).map(|i| format!("seg{i}")).collect();
            let full = segments.join("/");
            for depth in 1..=N {
                let prefix = segments[..depth].join("/");
                assert!(is_path_ancestor(&prefix, &full));
                assert!(!is_path_ancestor(&format!("{prefix}x"), &full));
            }
        }
    });

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize_path("./services/orders/"), "services/orders");
        assert_eq!(normalize_path("shared"), "shared");
    }

    #[test]
    fn module_relative_only_strips_on_boundary() {
        let module = "example.com/mono";
        assert_eq!(
            module_relative(module, "example.com/mono/shared/models"),
            "shared/models"
        );
        assert_eq!(
            module_relative(module, "example.com/monolith/x"),
            "example.com/monolith/x"
        );
    }

    #[test]
    fn service_owns_files_under_its_root() {
        let service = Service {
            name: "billing".into(),
            root: "services/billing".into(),
            path: PathBuf::from("/repo/services/billing"),
        };
        assert!(service.owns_file("services/billing/handler.go"));
        assert!(!service.owns_file("services/billing-v2/handler.go"));
        assert_eq!(service.build_target(), "./services/billing/...");
        assert_eq!(
            service.package_prefix("example.com/mono"),
            "example.com/mono/services/billing"
        );
    }

    #[test]
    fn only_package_causes_name_a_package() {
        assert_eq!(Cause::Direct.package(), None);
        assert_eq!(
            Cause::Package("m/shared/models".into()).package(),
            Some("m/shared/models")
        );
    }

    #[test]
    fn by_cause_groups_services() {
        let mut result = ImpactResult::default();
        result.affected.insert(
            "orders".into(),
            BTreeSet::from([Cause::Package("m/shared/models".into())]),
        );
        result.affected.insert(
            "billing".into(),
            BTreeSet::from([Cause::Direct, Cause::Package("m/shared/models".into())]),
        );

        let grouped = result.by_cause();
        assert_eq!(grouped[&Cause::Direct], vec!["billing"]);
        assert_eq!(
            grouped[&Cause::Package("m/shared/models".into())],
            vec!["billing", "orders"]
        );
    }
}
