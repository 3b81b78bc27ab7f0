use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use tempfile::TempDir;

static RUST_CLI_PATH: OnceCell<PathBuf> = OnceCell::new();

pub const MODULE: &str = "example.com/mono";

/// Root of the workspace (two levels up from this crate).
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root is two directories above the integration-tests crate")
        .to_path_buf()
}

/// Build (once) and return the path to the blast-radius CLI binary.
pub fn rust_cli_path() -> Result<PathBuf> {
    RUST_CLI_PATH.get_or_try_init(build_rust_cli).cloned()
}

fn build_rust_cli() -> Result<PathBuf> {
    let root = workspace_root();
    let status = StdCommand::new("cargo")
        .args(["build", "-p", "blast-radius-cli", "--bin", "blast-radius"])
        .current_dir(&root)
        .status()
        .context("failed to start cargo build for blast-radius")?;

    if !status.success() {
        return Err(anyhow!("cargo build for blast-radius failed with {status:?}"));
    }

    let mut path = root.join("target/debug/blast-radius");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    Ok(path)
}

/// Whether a usable `git` is on PATH.
pub fn git_available() -> bool {
    let available = StdCommand::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("skipping git-backed test; git is not available");
    }
    available
}

/// A throwaway Go monorepo plus a fake `go` binary that answers
/// `go list -deps ./services/<name>/...` from canned dependency lists.
pub struct FixtureRepo {
    repo: TempDir,
    tools: TempDir,
}

impl FixtureRepo {
    pub fn new() -> Result<Self> {
        let fixture = Self {
            repo: TempDir::new()?,
            tools: TempDir::new()?,
        };
        fixture.write("go.mod", &format!("module {MODULE}\n\ngo 1.22\n"))?;
        fixture.install_fake_go()?;
        Ok(fixture)
    }

    /// Standard layout: `orders` uses shared/models and shared/auth,
    /// `billing` uses nothing shared.
    pub fn standard() -> Result<Self> {
        let fixture = Self::new()?;
        fixture.write("services/orders/main.go", "package main\n")?;
        fixture.write("services/billing/cmd/billing/main.go", "package main\n")?;
        fixture.write("services/billing/handler.go", "package billing\n")?;
        fixture.write("shared/models/user.go", "package models\n")?;
        fixture.write("shared/auth/token.go", "package auth\n")?;
        fixture.write("shared/metrics/metrics.go", "package metrics\n")?;
        fixture.service_deps(
            "orders",
            &[
                "fmt",
                "github.com/google/uuid",
                "services/orders",
                "shared/models",
                "shared/auth",
            ],
        )?;
        fixture.service_deps("billing", &["fmt", "services/billing/cmd/billing"])?;
        Ok(fixture)
    }

    pub fn root(&self) -> &Path {
        self.repo.path()
    }

    pub fn go_binary(&self) -> PathBuf {
        self.tools.path().join("go")
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Canned `go list -deps` output for a service; module-relative entries
    /// are qualified, anything without a `/` is left as a stdlib import.
    pub fn service_deps(&self, service: &str, deps: &[&str]) -> Result<()> {
        let lines: Vec<String> = deps
            .iter()
            .map(|dep| {
                if dep.contains('/') && !dep.contains('.') {
                    format!("{MODULE}/{dep}")
                } else {
                    dep.to_string()
                }
            })
            .collect();
        let path = self.tools.path().join("deps").join(format!("{service}.txt"));
        fs::create_dir_all(path.parent().expect("deps file has a parent"))?;
        fs::write(path, lines.join("\n") + "\n")?;
        Ok(())
    }

    /// Runs git in the fixture repo with a throwaway identity.
    pub fn git(&self, args: &[&str]) -> Result<()> {
        let status = StdCommand::new("git")
            .args([
                "-c",
                "user.name=fixture",
                "-c",
                "user.email=fixture@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(self.root())
            .status()
            .with_context(|| format!("failed to run git {args:?}"))?;
        if !status.success() {
            return Err(anyhow!("git {args:?} failed with {status:?}"));
        }
        Ok(())
    }

    fn install_fake_go(&self) -> Result<()> {
        let script = r#"#!/bin/sh
for target; do :; done
name=$(printf '%s' "$target" | sed -e 's#^\./services/##' -e 's#/\.\.\.$##')
deps="$(dirname "$0")/deps/$name.txt"
if [ -f "$deps" ]; then
    cat "$deps"
else
    echo "can't load package: $target" >&2
    exit 1
fi
"#;
        let path = self.go_binary();
        fs::write(&path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}
