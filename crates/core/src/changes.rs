use crate::config::AnalysisConfig;
use crate::error::{BlastError, BlastResult};
use crate::models::{is_path_ancestor, join_package, normalize_path, PackageId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Lists files changed between two revisions.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Repository-relative paths changed between `base` and `head`, restricted
    /// to `path_filter` when it is non-empty.
    async fn list_changed_files(
        &self,
        base: &str,
        head: &str,
        path_filter: &[String],
    ) -> BlastResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct GitChangeSource {
    pub workspace: PathBuf,
    pub git_path: PathBuf,
    pub timeout: Duration,
}

impl GitChangeSource {
    pub fn new(workspace: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workspace: workspace.into(),
            git_path: PathBuf::new(),
            timeout,
        }
    }

    fn git_binary(&self) -> &Path {
        if self.git_path.as_os_str().is_empty() {
            Path::new("git")
        } else {
            &self.git_path
        }
    }
}

#[async_trait]
impl ChangeSource for GitChangeSource {
    async fn list_changed_files(
        &self,
        base: &str,
        head: &str,
        path_filter: &[String],
    ) -> BlastResult<Vec<String>> {
        let mut cmd = Command::new(self.git_binary());
        cmd.arg("-C").arg(&self.workspace);
        cmd.arg("-c").arg("core.quotePath=false");
        cmd.args(["diff", "--name-only", "--relative", "--no-renames"]);
        cmd.arg(base);
        cmd.arg(head);
        if !path_filter.is_empty() {
            cmd.arg("--");
            cmd.args(path_filter);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        debug!(base, head, filter = ?path_filter, "listing changed files");
        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                BlastError::ChangeSource(format!("git diff timed out after {:?}", self.timeout))
            })?
            .map_err(|err| BlastError::ChangeSource(format!("failed to run git diff: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BlastError::ChangeSource(format!(
                "git diff {base} {head} failed: {}",
                stderr.trim()
            )));
        }

        parse_changed_files(output.stdout)
    }
}

/// Splits `git diff --name-only` output; paths must be valid UTF-8.
pub fn parse_changed_files(stdout: Vec<u8>) -> BlastResult<Vec<String>> {
    let text = String::from_utf8(stdout).map_err(|err| {
        BlastError::ChangeSource(format!("git diff output is not valid UTF-8: {err}"))
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// What the caller says changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeInput {
    /// Package names or shared-relative fragments; skips the change source.
    Packages(Vec<String>),
    Range { base: String, head: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub packages: BTreeSet<PackageId>,
    /// Every changed file, used for direct service changes.
    pub files: Vec<String>,
}

/// Turns `input` into changed packages plus the raw changed-file list.
pub async fn normalize(
    input: &ChangeInput,
    source: &dyn ChangeSource,
    module: &str,
    config: &AnalysisConfig,
) -> BlastResult<ChangeSet> {
    match input {
        ChangeInput::Packages(raw) => Ok(ChangeSet {
            packages: raw
                .iter()
                .filter_map(|p| qualify_package(p, module, &config.shared_roots))
                .collect(),
            files: Vec::new(),
        }),
        ChangeInput::Range { base, head } => {
            let mut filter = config.shared_roots.clone();
            filter.push(config.services_dir.clone());
            let files = source.list_changed_files(base, head, &filter).await?;
            let packages = normalize_files(&files, module, config);
            debug!(
                files = files.len(),
                packages = packages.len(),
                "normalized changed files"
            );
            Ok(ChangeSet { packages, files })
        }
    }
}

/// Maps changed source files under shared roots to their package directories.
pub fn normalize_files(
    files: &[String],
    module: &str,
    config: &AnalysisConfig,
) -> BTreeSet<PackageId> {
    files
        .iter()
        .map(|f| normalize_path(f))
        .filter(|f| config.is_shared(f))
        .filter(|f| config.has_source_extension(f))
        .filter_map(|f| f.rsplit_once('/').map(|(dir, _)| dir))
        .map(|dir| join_package(module, dir))
        .collect()
}

/// Qualifies an explicitly named package to a full import path.
///
/// Module-qualified paths are kept, paths starting with a shared root get the
/// module prefix, anything else is taken relative to the first shared root.
pub fn qualify_package(raw: &str, module: &str, shared_roots: &[String]) -> Option<PackageId> {
    let name = normalize_path(raw);
    if name.is_empty() {
        return None;
    }
    if is_path_ancestor(module, name) {
        return Some(name.to_string());
    }
    if shared_roots.iter().any(|root| is_path_ancestor(root, name)) {
        return Some(join_package(module, name));
    }
    match shared_roots.first() {
        Some(root) => Some(join_package(module, &format!("{root}/{name}"))),
        None => Some(join_package(module, name)),
    }
}
