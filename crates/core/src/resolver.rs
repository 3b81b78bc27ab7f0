use crate::error::ResolverError;
use crate::models::PackageId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Resolves the transitive import paths of a build target.
#[async_trait]
pub trait PackageResolver: Send + Sync {
    async fn resolve(&self, target: &str) -> Result<Vec<PackageId>, ResolverError>;
}

#[derive(Debug, Clone, Default)]
pub struct GoOptions {
    pub workspace: PathBuf,
    pub go_path: PathBuf,
    pub list_flags: Vec<String>,
}

impl GoOptions {
    pub fn go_binary(&self) -> &Path {
        if self.go_path.as_os_str().is_empty() {
            Path::new("go")
        } else {
            &self.go_path
        }
    }
}

/// Runs `go list -deps <target>` from the workspace root.
#[derive(Debug, Clone)]
pub struct GoListResolver {
    opts: GoOptions,
}

impl GoListResolver {
    pub fn new(opts: GoOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl PackageResolver for GoListResolver {
    async fn resolve(&self, target: &str) -> Result<Vec<PackageId>, ResolverError> {
        let program = self.opts.go_binary();
        let mut cmd = Command::new(program);
        cmd.arg("list");
        cmd.arg("-deps");
        cmd.args(&self.opts.list_flags);
        cmd.arg(target);
        cmd.current_dir(&self.opts.workspace);
        cmd.stdin(Stdio::null());
        // Dropping the future on timeout must not leave `go` running.
        cmd.kill_on_drop(true);

        debug!(target, program = %program.display(), "running go list");
        let output = cmd.output().await.map_err(|err| ResolverError::Spawn {
            program: program.display().to_string(),
            message: err.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolverError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| ResolverError::InvalidOutput("output is not valid UTF-8".into()))?;
        parse_import_list(&stdout)
    }
}

/// Parses newline-separated import paths, skipping blank lines.
pub fn parse_import_list(stdout: &str) -> Result<Vec<PackageId>, ResolverError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.chars().any(char::is_whitespace) {
                Err(ResolverError::InvalidOutput(format!(
                    "unexpected line {line:?}"
                )))
            } else {
                Ok(line.to_string())
            }
        })
        .collect()
}
