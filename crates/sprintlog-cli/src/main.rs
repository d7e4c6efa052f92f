#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::CodedError;
use output::{CliError, OutputMode};
use sprintlog_core::config::{self, EffectiveConfig};
use sprintlog_core::error::ErrorCode;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "sprintlog: rebuild sprint, status and assignee history from issue changelogs",
    long_about = None
)]
struct Cli {
    /// Output format. Defaults to pretty on a terminal and text when piped.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode from flags alone, if the flags pick one.
    const fn flag_output_mode(&self) -> Option<OutputMode> {
        if self.json {
            Some(OutputMode::Json)
        } else {
            self.format
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a sprintlog project",
        long_about = "Create .sprintlog/config.toml and the projection database in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    sprintlog init\n\n    # Rewrite the config file, keeping the database\n    sprintlog init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Setup", about = "Manage sprint reference data")]
    Sprints {
        #[command(subcommand)]
        command: cmd::sprints::SprintsCommand,
    },

    #[command(
        next_help_heading = "Reconstruction",
        about = "Rebuild intervals from a changelog",
        long_about = "Feed a JSON-lines changelog through the reconstruction engine and persist sprint membership, active-sprint stays, status and assignee intervals.",
        after_help = "EXAMPLES:\n    # Reconstruct from an export\n    sprintlog reconcile changelog.jsonl\n\n    # Use four workers\n    sprintlog reconcile changelog.jsonl --jobs 4\n\n    # See what would happen without writing\n    sprintlog reconcile changelog.jsonl --dry-run --json"
    )]
    Reconcile(cmd::reconcile::ReconcileArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the reconstructed history of one issue",
        after_help = "EXAMPLES:\n    # Show issue 10042\n    sprintlog history 10042\n\n    # Emit machine-readable output\n    sprintlog history 10042 --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "List recent reconcile runs",
        after_help = "EXAMPLES:\n    # Last ten runs\n    sprintlog runs\n\n    # Last run only, as JSON\n    sprintlog runs --limit 1 --json"
    )]
    Runs(cmd::runs::RunsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SPRINTLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "sprintlog=debug,info"
        } else {
            "sprintlog=info,warn"
        })
    });

    let format = env::var("SPRINTLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output; logs go to stderr.
    match format.as_str() {
        "json" => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(
    cli: &Cli,
    effective: &EffectiveConfig,
    output: OutputMode,
    root: &Path,
) -> anyhow::Result<()> {
    let project = &effective.project;
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, root),
        Commands::Sprints { command } => cmd::sprints::run_sprints(command, project, output, root),
        Commands::Reconcile(args) => cmd::reconcile::run_reconcile(args, project, output, root),
        Commands::History(args) => cmd::history::run_history(args, project, output, root),
        Commands::Runs(args) => cmd::runs::run_runs(args, output, root),
    }
}

fn to_cli_error(error: &anyhow::Error) -> CliError {
    error.downcast_ref::<CodedError>().map_or_else(
        || CliError {
            message: format!("{error:#}"),
            suggestion: None,
            error_code: None,
        },
        |coded| CliError::from_code(coded.code, coded.to_string()),
    )
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let flag_mode = cli.flag_output_mode();

    let project_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            let mode = flag_mode.unwrap_or(OutputMode::Text);
            let error = CliError::from_code(ErrorCode::InternalUnexpected, e.to_string());
            let _ = output::render_error(mode, &error);
            return ExitCode::FAILURE;
        }
    };

    let effective = match config::resolve_config(&project_root, cli.json) {
        Ok(effective) => effective,
        Err(e) => {
            let mode = flag_mode.unwrap_or(OutputMode::Text);
            let error = CliError::from_code(ErrorCode::ConfigParseError, format!("{e:#}"));
            let _ = output::render_error(mode, &error);
            return ExitCode::FAILURE;
        }
    };
    let output = flag_mode.unwrap_or_else(|| OutputMode::from_resolved(&effective.resolved_output));

    match run(&cli, &effective, output, &project_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            let _ = output::render_error(output, &to_cli_error(&e));
            ExitCode::FAILURE
        }
    }
}
