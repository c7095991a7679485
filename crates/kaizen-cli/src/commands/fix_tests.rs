use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use kaizen_core::config::{Config, EnvDiscovery, ModelTier};
use kaizen_core::error::KaizenError;
use kaizen_core::llm::LlmClient;
use kaizen_core::pr_composer::PrComposer;
use kaizen_core::python::ExecutionEngine;
use kaizen_core::{AutofixOrchestrator, RunOutcome};

use super::{tracked_variables, write_reports};

/// `fix-tests <files…> --project <path> [--make-pr] [--max-retries N]
/// [--base-branch B]` (spec §6). Unlike `test-all`, this drives auto-fix
/// directly against one or more configuration files without a preceding
/// plain baseline-only mode — grounded in `kaizen/cli/commands/fix.py`,
/// which loops over `test_files` and calls `AutoFix.fix_code` per file.
pub struct Args {
    pub test_files: Vec<PathBuf>,
    pub project: PathBuf,
    pub make_pr: bool,
    pub max_retries: u32,
    pub base_branch: String,
}

pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    if args.test_files.is_empty() {
        return Err(KaizenError::Configuration("fix-tests requires at least one test configuration file".into()).into());
    }
    if !args.project.exists() {
        return Err(KaizenError::Configuration(format!("project path does not exist: {}", args.project.display())).into());
    }

    let missing = EnvDiscovery::check(args.make_pr);
    if !missing.is_empty() {
        return Err(KaizenError::Environment(missing.join(", ")).into());
    }

    let api_key = EnvDiscovery::google_api_key()?;
    let llm_client = LlmClient::new(api_key);
    let model = ModelTier::Default;

    let mut any_fixed = false;
    let mut any_unresolved = false;

    for test_file in &args.test_files {
        let mut config = Config::load(test_file)?;
        config.max_retries = args.max_retries;
        config.base_branch = args.base_branch.clone();
        config.create_pr = args.make_pr;

        let engine = ExecutionEngine::new(config.file_path.clone(), config.agent.clone(), config.dependencies.clone(), tracked_variables(&config));
        engine.preflight().await.map_err(|e| KaizenError::EntryPoint(kaizen_core::error::EntryPointError::SymbolNotFound(e.to_string())))?;

        let orchestrator = AutofixOrchestrator::new(&config, &engine, Some(&llm_client), model);
        let cancel = AtomicBool::new(false);
        let run = orchestrator.run(&cancel).await?;

        write_reports(&config, &run.history)?;

        match run.outcome {
            RunOutcome::Success | RunOutcome::Improved => any_fixed = true,
            RunOutcome::Failed | RunOutcome::Error => any_unresolved = true,
            RunOutcome::Cancelled => {}
        }

        if args.make_pr && run.should_open_pr(config.pr_strategy) {
            let github_token = EnvDiscovery::github_token()?;
            let best = run.history.best().ok_or_else(|| KaizenError::Hosting("no history entries to build a PR from".to_string()))?;
            let composer = PrComposer::new(&config, &run.history, &run.memory);
            let executor = kaizen_core::git::RealGitExecutor;
            match composer.compose_and_open(best, &config.files_to_fix, &config.config_dir, &github_token, &executor).await {
                Ok(url) => println!("Opened pull request for {}: {url}", test_file.display()),
                Err(e) => {
                    tracing::error!(error = %e, config = %test_file.display(), "PR creation failed");
                    return Ok(ExitCode::from(4));
                }
            }
        }
    }

    if !any_fixed && any_unresolved {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::from(0))
}
