use crate::config::EntryConventions;
use crate::error::{BlastError, BlastResult};
use crate::models::Service;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files that could be a program entry point for `dir`: its own files plus
/// the files one level under each `<command_dir>/<name>/`. Sorted.
pub fn entry_candidates(dir: &Path, conventions: &EntryConventions) -> io::Result<Vec<PathBuf>> {
    let mut candidates = list_files(dir)?;

    let command_root = dir.join(&conventions.command_dir);
    if command_root.is_dir() {
        for command in sorted_entries(&command_root)? {
            if command.is_dir() {
                candidates.extend(list_files(&command)?);
            }
        }
    }

    candidates.sort();
    Ok(candidates)
}

fn is_entry_point(path: &Path, conventions: &EntryConventions) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name == conventions.entry_file)
        .unwrap_or(false)
}

/// Discovers services under `repo_root/services_dir`, sorted by name.
pub fn discover(
    repo_root: &Path,
    services_dir: &str,
    conventions: &EntryConventions,
) -> BlastResult<Vec<Service>> {
    let root = repo_root.join(services_dir);
    if !root.is_dir() {
        return Err(BlastError::NoServicesFound { root });
    }

    let entries = sorted_entries(&root).map_err(|err| {
        BlastError::config(format!("failed to read {}: {err}", root.display()))
    })?;

    let mut services = Vec::new();
    for dir in entries.into_iter().filter(|p| p.is_dir()) {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let candidates = entry_candidates(&dir, conventions).map_err(|err| {
            BlastError::config(format!("failed to scan {}: {err}", dir.display()))
        })?;
        if !candidates.iter().any(|c| is_entry_point(c, conventions)) {
            debug!(service = %name, "skipping directory without entry point");
            continue;
        }

        services.push(Service {
            root: format!("{services_dir}/{name}"),
            name,
            path: dir,
        });
    }

    if services.is_empty() {
        return Err(BlastError::NoServicesFound { root });
    }
    debug!(count = services.len(), "discovered services");
    Ok(services)
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "package main\n").unwrap();
    }

    #[test]
    fn discovers_top_level_and_command_entry_points() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        touch(repo, "services/orders/main.go");
        touch(repo, "services/billing/cmd/billing/main.go");
        touch(repo, "services/docs/README.md");
        touch(repo, "services/lib/util.go");
        touch(repo, "services/deep/cmd/a/b/main.go");
        touch(repo, "services/tests/main_test.go");
        touch(repo, "services/tests/cmd/e2e/main_test.go");

        let services = discover(repo, "services", &EntryConventions::default()).unwrap();
        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "orders"]);
        assert_eq!(services[1].root, "services/orders");
    }

    #[test]
    fn missing_root_or_no_services_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let conventions = EntryConventions::default();
        assert!(matches!(
            discover(tmp.path(), "services", &conventions),
            Err(BlastError::NoServicesFound { .. })
        ));

        touch(tmp.path(), "services/empty/notes.txt");
        assert!(matches!(
            discover(tmp.path(), "services", &conventions),
            Err(BlastError::NoServicesFound { .. })
        ));
    }

    #[test]
    fn candidates_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "svc/z.go");
        touch(tmp.path(), "svc/a.go");
        touch(tmp.path(), "svc/cmd/tool/main.go");

        let candidates =
            entry_candidates(&tmp.path().join("svc"), &EntryConventions::default()).unwrap();
        let mut sorted = candidates.clone();
        sorted.sort();
        assert_eq!(candidates, sorted);
        assert_eq!(candidates.len(), 3);
    }
}
