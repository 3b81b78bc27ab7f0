mod report;

use anyhow::{bail, Context, Result};
use blast_radius_core as core;
use clap::{ArgAction, Args, Parser, Subcommand};
use report::{AffectedFormat, MapFormat, ReportOptions, ServicesFormat};
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "blast-radius",
    about = "Report which services are affected by changes to shared packages",
    version,
    author,
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(short = 'v', long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List services affected by changed packages or a revision range.
    Affected(AffectedArgs),
    /// Print every service's dependencies and the shared package reverse index.
    Map(MapArgs),
    /// List discovered services.
    Services(ServicesArgs),
}

#[derive(Args, Debug)]
struct WorkspaceArgs {
    /// Repository root containing go.mod.
    #[arg(
        short = 'r',
        long = "repo",
        env = "BLAST_REPO_ROOT",
        value_name = "DIR",
        default_value = "."
    )]
    repo: PathBuf,
    /// Directory holding one subdirectory per service, relative to the repo.
    #[arg(long = "services-dir", env = "BLAST_SERVICES_DIR", default_value = "services")]
    services_dir: String,
    /// Comma-separated shared directories, relative to the repo.
    #[arg(long = "shared-dirs", env = "BLAST_SHARED_DIRS", default_value = "shared")]
    shared_dirs: String,
    /// Go binary used to resolve package dependencies.
    #[arg(long = "go-bin", env = "BLAST_GO_BIN", value_name = "PATH")]
    go_bin: Option<PathBuf>,
    /// Extra flags passed to `go list`, e.g. `--go-flags="-mod=vendor -tags=x"`.
    #[arg(long = "go-flags", value_delimiter = ' ', num_args = 1)]
    go_flags: Vec<String>,
    /// Maximum concurrent resolver invocations.
    #[arg(short = 'j', long = "jobs", env = "BLAST_JOBS")]
    jobs: Option<usize>,
    /// Per-call timeout for external tools, in seconds.
    #[arg(long = "timeout", env = "BLAST_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,
    /// Fail instead of warning when a service's dependencies cannot be resolved.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
}

impl WorkspaceArgs {
    fn to_config(&self) -> core::AnalysisConfig {
        let defaults = core::AnalysisConfig::default();
        core::AnalysisConfig {
            repo_root: self.repo.clone(),
            services_dir: self.services_dir.clone(),
            shared_roots: core::parse_dir_list(&self.shared_dirs),
            go_binary: self.go_bin.clone().unwrap_or_default(),
            go_flags: self.go_flags.iter().filter(|f| !f.is_empty()).cloned().collect(),
            jobs: self.jobs.unwrap_or(defaults.jobs),
            resolver_timeout: Duration::from_secs(self.timeout_secs),
            failure_policy: if self.strict {
                core::ResolverFailurePolicy::Fail
            } else {
                core::ResolverFailurePolicy::Warn
            },
            ..defaults
        }
    }
}

#[derive(Args, Debug)]
struct AffectedArgs {
    #[command(flatten)]
    workspace: WorkspaceArgs,
    /// Base revision of the range to diff.
    #[arg(short = 'b', long = "base", value_name = "REV")]
    base: Option<String>,
    /// Head revision of the range to diff.
    #[arg(long = "head", value_name = "REV", default_value = "HEAD")]
    head: String,
    /// Explicit changed packages; skips the revision diff entirely.
    #[arg(
        short = 'p',
        long = "packages",
        env = "BLAST_PACKAGES",
        value_delimiter = ','
    )]
    packages: Vec<String>,
    #[arg(short = 'f', long = "format", value_enum, default_value_t = AffectedFormat::List)]
    format: AffectedFormat,
    /// Print fully qualified import paths.
    #[arg(long = "full-paths", action = ArgAction::SetTrue)]
    full_paths: bool,
    /// Optional output path (stdout if omitted).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MapArgs {
    #[command(flatten)]
    workspace: WorkspaceArgs,
    #[arg(short = 'f', long = "format", value_enum, default_value_t = MapFormat::Json)]
    format: MapFormat,
    #[arg(long = "full-paths", action = ArgAction::SetTrue)]
    full_paths: bool,
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServicesArgs {
    #[command(flatten)]
    workspace: WorkspaceArgs,
    #[arg(short = 'f', long = "format", value_enum, default_value_t = ServicesFormat::List)]
    format: ServicesFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "command failed");
        eprintln!("{err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Affected(args) => handle_affected(args).await,
        Commands::Map(args) => handle_map(args).await,
        Commands::Services(args) => handle_services(args),
    }
}

async fn handle_affected(args: AffectedArgs) -> Result<()> {
    let packages: Vec<String> = args
        .packages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let input = if !packages.is_empty() {
        core::ChangeInput::Packages(packages)
    } else if let Some(base) = args.base.clone() {
        core::ChangeInput::Range {
            base,
            head: args.head.clone(),
        }
    } else {
        bail!("either --packages or --base is required");
    };

    let config = args.workspace.to_config();
    info!(repo = %config.repo_root.display(), input = ?input, "computing affected services");

    let collaborators = core::Collaborators::from_config(&config);
    let report = core::affected(&config, &input, &collaborators).await?;

    let opts = ReportOptions::new(report.module.clone(), args.full_paths);
    let mut writer = open_output(args.output.as_ref())?;
    report::write_affected(&mut writer, &report, args.format, &opts)?;
    writer.flush().context("failed to flush output")?;

    info!(
        count = report.impact.len(),
        warnings = report.warnings.len(),
        "finished computing affected services"
    );
    Ok(())
}

async fn handle_map(args: MapArgs) -> Result<()> {
    let config = args.workspace.to_config();
    let collaborators = core::Collaborators::from_config(&config);
    let report = core::full_map(&config, &collaborators).await?;

    let opts = ReportOptions::new(report.module.clone(), args.full_paths);
    let mut writer = open_output(args.output.as_ref())?;
    report::write_full_map(&mut writer, &report, args.format, &opts)?;
    writer.flush().context("failed to flush output")?;

    info!(
        services = report.map.forward.len(),
        warnings = report.warnings.len(),
        "finished full map"
    );
    Ok(())
}

fn handle_services(args: ServicesArgs) -> Result<()> {
    let config = args.workspace.to_config();
    let workspace = core::Workspace::load(&config)?;
    let mut writer = open_output(None)?;
    report::write_services(&mut writer, &workspace.services, args.format)?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("failed to create output file {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

fn init_tracing(verbose: bool) {
    // Recovered resolver failures are warnings and only surface with --verbose.
    let default_level = if verbose { "debug" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}
