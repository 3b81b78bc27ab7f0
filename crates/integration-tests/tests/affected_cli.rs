#![cfg(unix)]

use anyhow::Result;
use assert_cmd::Command;
use blast_radius_integration_tests::{git_available, rust_cli_path, FixtureRepo};
use predicates::str::contains;
use serde_json::Value;

fn cli(fixture: &FixtureRepo) -> Result<Command> {
    let mut cmd = Command::new(rust_cli_path()?);
    cmd.env_remove("BLAST_PACKAGES")
        .env_remove("RUST_LOG")
        .arg("affected")
        .arg("--repo")
        .arg(fixture.root())
        .arg("--go-bin")
        .arg(fixture.go_binary());
    Ok(cmd)
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("stdout is UTF-8")
}

#[test]
fn explicit_package_lists_consumers() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    let out = stdout_of(cli(&fixture)?.args(["--packages", "shared/models"]));
    assert_eq!(out, "orders\n");
    Ok(())
}

#[test]
fn coarse_shared_directory_matches_sub_packages() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    let out = stdout_of(cli(&fixture)?.args(["--packages", "shared", "--format", "json"]));
    let json: Value = serde_json::from_str(&out)?;
    assert_eq!(json["affected"][0]["service"], "orders");
    assert_eq!(json["affected"][0]["causes"][0], "shared");
    Ok(())
}

#[test]
fn unused_package_is_empty_not_error() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    let out = stdout_of(cli(&fixture)?.args(["--packages", "metrics"]));
    assert_eq!(out, "");
    Ok(())
}

#[test]
fn packages_from_environment() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    let out = stdout_of(
        cli(&fixture)?
            .env("BLAST_PACKAGES", "shared/auth,shared/metrics")
            .args(["--format", "detail"]),
    );
    assert!(out.contains("orders\n  <- shared/auth\n"));
    Ok(())
}

#[test]
fn missing_change_input_is_rejected() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    cli(&fixture)?
        .assert()
        .failure()
        .stderr(contains("either --packages or --base is required"));
    Ok(())
}

#[test]
fn revision_range_reports_shared_and_direct_changes() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let fixture = FixtureRepo::standard()?;
    fixture.git(&["init", "-q"])?;
    fixture.git(&["add", "."])?;
    fixture.git(&["commit", "-q", "-m", "initial"])?;

    fixture.write("shared/models/user.go", "package models\n\ntype User struct{}\n")?;
    fixture.write("shared/models/README.md", "docs\n")?;
    fixture.write("services/billing/handler.go", "package billing\n\nfunc H() {}\n")?;
    fixture.git(&["commit", "-q", "-am", "change"])?;

    let out = stdout_of(cli(&fixture)?.args(["--base", "HEAD~1", "--format", "json"]));
    let json: Value = serde_json::from_str(&out)?;

    assert_eq!(json["changedPackages"], serde_json::json!(["shared/models"]));
    assert_eq!(json["affected"][0]["service"], "billing");
    assert_eq!(
        json["affected"][0]["causes"],
        serde_json::json!(["(direct change)"])
    );
    assert_eq!(json["affected"][1]["service"], "orders");
    assert_eq!(
        json["affected"][1]["causes"],
        serde_json::json!(["shared/models"])
    );
    Ok(())
}

#[test]
fn unknown_revision_fails() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let fixture = FixtureRepo::standard()?;
    fixture.git(&["init", "-q"])?;
    fixture.git(&["add", "."])?;
    fixture.git(&["commit", "-q", "-m", "initial"])?;

    cli(&fixture)?
        .args(["--base", "no-such-rev"])
        .assert()
        .failure()
        .stderr(contains("failed to list changed files"));
    Ok(())
}

#[test]
fn resolver_failure_warns_unless_strict() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    fixture.write("services/broken/main.go", "package main\n")?;

    let quiet = cli(&fixture)?
        .args(["--packages", "shared/models"])
        .assert()
        .success()
        .stdout("orders\n")
        .get_output()
        .stderr
        .clone();
    assert!(!String::from_utf8_lossy(&quiet).contains("dependency resolution failed"));

    let verbose = cli(&fixture)?
        .args(["--packages", "shared/models", "-v"])
        .assert()
        .success()
        .stdout("orders\n")
        .get_output()
        .stderr
        .clone();
    let verbose = String::from_utf8_lossy(&verbose);
    let warning = verbose
        .lines()
        .find(|line| line.contains("dependency resolution failed"))
        .expect("verbose run logs the recovered resolver failure");
    assert!(warning.contains("broken"));

    cli(&fixture)?
        .args(["--packages", "shared/models", "--strict"])
        .assert()
        .failure()
        .stderr(contains("broken"));
    Ok(())
}

#[test]
fn missing_manifest_is_fatal() -> Result<()> {
    let fixture = FixtureRepo::standard()?;
    std::fs::remove_file(fixture.root().join("go.mod"))?;
    cli(&fixture)?
        .args(["--packages", "shared/models"])
        .assert()
        .failure()
        .stderr(contains("go.mod"));
    Ok(())
}

#[test]
fn no_services_is_fatal() -> Result<()> {
    let fixture = FixtureRepo::new()?;
    fixture.write("services/docs/README.md", "docs\n")?;
    cli(&fixture)?
        .args(["--packages", "shared/models"])
        .assert()
        .failure()
        .stderr(contains("no services found"));
    Ok(())
}
