use crate::error::{BlastError, BlastResult};
use crate::models::{is_path_ancestor, normalize_path};
use crate::resolver::GoOptions;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MODULE_MANIFEST: &str = "go.mod";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// What to do when the package resolver fails for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolverFailurePolicy {
    /// Record a warning and continue with an empty dependency set.
    #[default]
    Warn,
    /// Abort the whole analysis.
    Fail,
}

/// How a directory is recognized as a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryConventions {
    pub entry_file: String,
    pub command_dir: String,
}

impl Default for EntryConventions {
    fn default() -> Self {
        Self {
            entry_file: "main.go".to_string(),
            command_dir: "cmd".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub repo_root: PathBuf,
    /// Repository-relative directory holding one subdirectory per service.
    pub services_dir: String,
    /// Repository-relative shared directories.
    pub shared_roots: Vec<String>,
    pub source_extensions: Vec<String>,
    pub entry: EntryConventions,
    pub go_binary: PathBuf,
    pub go_flags: Vec<String>,
    pub jobs: usize,
    pub resolver_timeout: Duration,
    pub failure_policy: ResolverFailurePolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            services_dir: "services".to_string(),
            shared_roots: vec!["shared".to_string()],
            source_extensions: vec!["go".to_string()],
            entry: EntryConventions::default(),
            go_binary: PathBuf::new(),
            go_flags: Vec::new(),
            jobs: default_jobs(),
            resolver_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            failure_policy: ResolverFailurePolicy::Warn,
        }
    }
}

impl AnalysisConfig {
    pub fn services_root(&self) -> PathBuf {
        self.repo_root.join(&self.services_dir)
    }

    pub fn go_options(&self) -> GoOptions {
        GoOptions {
            workspace: self.repo_root.clone(),
            go_path: self.go_binary.clone(),
            list_flags: self.go_flags.clone(),
        }
    }

    /// Whether a module-relative path lies under one of the shared roots.
    pub fn is_shared(&self, relative: &str) -> bool {
        self.shared_roots
            .iter()
            .any(|root| is_path_ancestor(root, relative))
    }

    pub fn has_source_extension(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.source_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    /// Checks roots and limits and returns a copy with normalized directory names.
    pub fn validate(&self) -> BlastResult<Self> {
        if !self.repo_root.is_dir() {
            return Err(BlastError::config(format!(
                "repository root {} is not a directory",
                self.repo_root.display()
            )));
        }
        if self.jobs == 0 {
            return Err(BlastError::config("concurrency limit must be at least 1"));
        }
        if self.resolver_timeout.is_zero() {
            return Err(BlastError::config("resolver timeout must be non-zero"));
        }

        let services_dir = normalize_path(&self.services_dir).to_string();
        if services_dir.is_empty() {
            return Err(BlastError::config("services directory must not be empty"));
        }

        let shared_roots = parse_dir_list(&self.shared_roots.join(","));
        for root in &shared_roots {
            if is_path_ancestor(root, &services_dir) || is_path_ancestor(&services_dir, root) {
                return Err(BlastError::config(format!(
                    "shared root {root} overlaps services directory {services_dir}"
                )));
            }
        }

        Ok(Self {
            services_dir,
            shared_roots,
            ..self.clone()
        })
    }
}

/// Splits a comma-separated directory list, dropping blanks and duplicates.
pub fn parse_dir_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in raw.split(',') {
        let dir = normalize_path(entry);
        if !dir.is_empty() && !out.iter().any(|d| d == dir) {
            out.push(dir.to_string());
        }
    }
    out
}

/// Reads the module path from the `module` directive of `go.mod`.
pub fn read_module_root(repo_root: &Path) -> BlastResult<String> {
    let manifest = repo_root.join(MODULE_MANIFEST);
    let contents = fs::read_to_string(&manifest).map_err(|err| {
        BlastError::config(format!("failed to read {}: {err}", manifest.display()))
    })?;
    parse_module_directive(&contents).ok_or_else(|| {
        BlastError::config(format!(
            "{} has no module directive",
            manifest.display()
        ))
    })
}

fn parse_module_directive(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default().trim())
        .find_map(|line| {
            line.strip_prefix("module")
                .filter(|rest| rest.starts_with(char::is_whitespace))
        })
        .map(|rest| rest.trim().trim_matches('"').to_string())
        .filter(|module| !module.is_empty())
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
