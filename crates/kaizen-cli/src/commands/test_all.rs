use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use kaizen_core::config::{Config, EnvDiscovery, ModelTier};
use kaizen_core::error::KaizenError;
use kaizen_core::evaluator::Evaluator;
use kaizen_core::git::RealGitExecutor;
use kaizen_core::llm::LlmClient;
use kaizen_core::memory_store::MemoryStore;
use kaizen_core::model::{RunType, TestExecutionHistory};
use kaizen_core::pr_composer::PrComposer;
use kaizen_core::python::ExecutionEngine;
use kaizen_core::runner::TestRunner;
use kaizen_core::{AutofixOrchestrator, OrchestratorRun, RunOutcome};

use super::{parse_pr_strategy, tracked_variables, write_reports};

pub struct Args {
    pub config: PathBuf,
    pub auto_fix: bool,
    pub create_pr: bool,
    pub max_retries: Option<u32>,
    pub base_branch: Option<String>,
    pub pr_strategy: Option<String>,
    pub better_ai: bool,
}

/// `test-all --config <path> [--auto-fix] [--create-pr] [--max-retries N]
/// [--base-branch B] [--pr-strategy S] [--better-ai]` (spec §6).
pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(&args.config)?;
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(base_branch) = args.base_branch {
        config.base_branch = base_branch;
    }
    if let Some(strategy) = &args.pr_strategy {
        config.pr_strategy = parse_pr_strategy(strategy)?;
    }
    if args.create_pr {
        config.create_pr = true;
    }
    if args.better_ai {
        config.better_ai = true;
    }

    let missing = EnvDiscovery::check(config.create_pr);
    if !missing.is_empty() {
        return Err(KaizenError::Environment(missing.join(", ")).into());
    }

    let model = ModelTier::from_better_ai(config.better_ai);
    let api_key = EnvDiscovery::google_api_key()?;
    let llm_client = LlmClient::new(api_key);

    let engine = ExecutionEngine::new(config.file_path.clone(), config.agent.clone(), config.dependencies.clone(), tracked_variables(&config));
    engine.preflight().await.map_err(|e| KaizenError::EntryPoint(kaizen_core::error::EntryPointError::SymbolNotFound(e.to_string())))?;

    let run = if args.auto_fix {
        let orchestrator = AutofixOrchestrator::new(&config, &engine, Some(&llm_client), model);
        let cancel = AtomicBool::new(false);
        orchestrator.run(&cancel).await?
    } else {
        baseline_only(&config, &engine, &llm_client, model).await
    };

    write_reports(&config, &run.history)?;

    if config.create_pr && run.should_open_pr(config.pr_strategy) {
        match open_pr(&config, &run).await {
            Ok(url) => println!("Opened pull request: {url}"),
            Err(e) => {
                tracing::error!(error = %e, "PR creation failed");
                return Ok(ExitCode::from(4));
            }
        }
    }

    Ok(exit_code_for_outcome(run.outcome, args.auto_fix))
}

/// Plain baseline run for `test-all` without `--auto-fix`: one pass
/// through `TestRunner`, no attempts, no memory.
async fn baseline_only(config: &Config, engine: &ExecutionEngine, llm_client: &LlmClient, model: ModelTier) -> OrchestratorRun {
    let evaluator = Evaluator::new(Some(llm_client), model);
    let runner = TestRunner::new(config, engine, &evaluator);
    let mut history = TestExecutionHistory::new();
    let cancel = AtomicBool::new(false);
    let baseline = runner.execute(RunType::Baseline, &cancel).await;
    let passed = baseline.summary.passed == baseline.summary.total;
    history.add_baseline(baseline);
    let outcome = if passed { RunOutcome::Success } else { RunOutcome::Failed };
    OrchestratorRun { history, memory: MemoryStore::new(), outcome }
}

async fn open_pr(config: &Config, run: &OrchestratorRun) -> anyhow::Result<String> {
    let github_token = EnvDiscovery::github_token()?;
    let best = run
        .history
        .best()
        .ok_or_else(|| KaizenError::Hosting("no history entries to build a PR from".to_string()))?;
    let composer = PrComposer::new(config, &run.history, &run.memory);
    let executor = RealGitExecutor;
    let url = composer
        .compose_and_open(best, &config.files_to_fix, &config.config_dir, &github_token, &executor)
        .await?;
    Ok(url)
}

/// `0` all cases pass; `2` tests failed and no auto-fix was attempted;
/// `3` auto-fix ran but never reached all-passing (spec §6 exit codes).
fn exit_code_for_outcome(outcome: RunOutcome, auto_fix: bool) -> ExitCode {
    match outcome {
        RunOutcome::Success => ExitCode::from(0),
        RunOutcome::Cancelled => ExitCode::from(0),
        RunOutcome::Error => ExitCode::from(255),
        RunOutcome::Failed | RunOutcome::Improved => {
            if auto_fix {
                ExitCode::from(3)
            } else {
                ExitCode::from(2)
            }
        }
    }
}
