//! `kaizen` — the CLI surface for the autonomous test-fix-and-pull-request
//! agent (spec §6). `main.rs` only parses arguments and maps the terminal
//! result to an exit code; each subcommand's behavior lives under
//! `commands/`.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kaizen", version, about = "Autonomous test-fix-and-pull-request agent for LLM applications")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a configuration's test suite, optionally auto-fixing failures
    /// and opening a pull request.
    TestAll {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        auto_fix: bool,
        #[arg(long)]
        create_pr: bool,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        base_branch: Option<String>,
        #[arg(long)]
        pr_strategy: Option<String>,
        #[arg(long)]
        better_ai: bool,
        #[arg(long)]
        verbose: bool,
    },
    /// Run auto-fix directly against one or more test configuration files.
    FixTests {
        test_files: Vec<PathBuf>,
        #[arg(long, short = 'p')]
        project: PathBuf,
        #[arg(long)]
        make_pr: bool,
        #[arg(long, default_value_t = 1)]
        max_retries: u32,
        #[arg(long, default_value = "main")]
        base_branch: String,
    },
    /// Generate additional test cases for a configuration via the LLM.
    Augment {
        config: PathBuf,
        #[arg(long)]
        total: usize,
        #[arg(long)]
        better_ai: bool,
    },
    /// Environment preflight utilities.
    Setup {
        #[command(subcommand)]
        action: SetupAction,
    },
    /// Summarize a persisted `test-logs/*.json` report.
    AnalyzeLogs { log_file: PathBuf },
}

#[derive(Subcommand)]
enum SetupAction {
    /// Report which required environment variables are missing.
    CheckEnv {
        #[arg(long)]
        create_pr: bool,
    },
    /// Scaffold a `.env.example` listing every variable the agent uses.
    CreateEnvExample {
        #[arg(long, default_value = ".env.example")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Command::TestAll { verbose: true, .. });
    init_tracing(verbose);

    let result = match cli.command {
        Command::TestAll { config, auto_fix, create_pr, max_retries, base_branch, pr_strategy, better_ai, verbose: _ } => {
            commands::test_all::run(commands::test_all::Args { config, auto_fix, create_pr, max_retries, base_branch, pr_strategy, better_ai }).await
        }
        Command::FixTests { test_files, project, make_pr, max_retries, base_branch } => {
            commands::fix_tests::run(commands::fix_tests::Args { test_files, project, make_pr, max_retries, base_branch }).await
        }
        Command::Augment { config, total, better_ai } => commands::augment::run(commands::augment::Args { config, total, better_ai }).await,
        Command::Setup { action } => match action {
            SetupAction::CheckEnv { create_pr } => commands::setup::check_env(create_pr),
            SetupAction::CreateEnvExample { out } => commands::setup::create_env_example(&out),
        },
        Command::AnalyzeLogs { log_file } => commands::analyze_logs::run(&log_file),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            commands::exit_code_for(&e)
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
