use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::compatibility::CompatibilityChecker;
use crate::config::{Config, ModelTier, PrStrategy};
use crate::error::{KaizenError, KaizenResult};
use crate::evaluator::Evaluator;
use crate::llm::fixer::{self, FixRequest};
use crate::llm::LlmClient;
use crate::memory_store::{self, MemoryStore};
use crate::model::{AttemptStatus, FixAttempt, LlmInteraction, MemoryRecord, RunType, TestExecutionHistory, TestExecutionResult};
use crate::python::ExecutionEngine;
use crate::runner::TestRunner;
use crate::state_manager::StateManager;

/// Maximum number of re-prompts within one attempt after a compatibility
/// failure before the attempt is abandoned (spec §4.11 `COMPAT_CHECK`).
const COMPATIBILITY_RETRY_BUDGET: u32 = 2;

/// How the run ended (spec §4.11 terminal states, collapsed to one enum
/// for the caller — the full state trace lives in `history`/`memory`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Baseline already passed every case; no attempts were made.
    Success,
    /// At least one attempt strictly improved on the baseline (and/or
    /// reached all-passing) before the attempt budget or cancellation
    /// ended the loop.
    Improved,
    /// Every attempt failed to improve on the best passed count so far.
    Failed,
    /// The baseline run itself could not complete.
    Error,
    /// An external cancel signal aborted the run mid-loop.
    Cancelled,
}

/// Everything a completed run produced: the append-only history, the
/// attempt journal, the outcome classification, and — if a PR was
/// warranted by `pr_strategy` — the set of files on disk at the best
/// attempt's state, ready for `PrComposer`.
pub struct OrchestratorRun {
    pub history: TestExecutionHistory,
    pub memory: MemoryStore,
    pub outcome: RunOutcome,
}

impl OrchestratorRun {
    /// Whether a PR should be opened per `pr_strategy`, given the final
    /// outcome (spec §4.11, boundary behaviors in §8).
    pub fn should_open_pr(&self, strategy: PrStrategy) -> bool {
        match strategy {
            PrStrategy::None => false,
            PrStrategy::AllPassing => self.outcome == RunOutcome::Success || self.outcome == RunOutcome::Improved && self.all_passing(),
            PrStrategy::AnyImprovement => self.outcome == RunOutcome::Success || self.outcome == RunOutcome::Improved,
        }
    }

    fn all_passing(&self) -> bool {
        self.history.best().map(|b| b.summary.passed == b.summary.total).unwrap_or(false)
    }
}

/// Drives baseline → N attempts → best-selection, owning all mutable
/// cross-attempt state (history, memory, on-disk snapshots) for one run
/// (spec §4.11, §9 "the orchestrator is the only owner of mutable
/// cross-attempt state").
pub struct AutofixOrchestrator<'a> {
    config: &'a Config,
    engine: &'a ExecutionEngine,
    llm_client: Option<&'a LlmClient>,
    model: ModelTier,
    attempt_timeout: Duration,
}

impl<'a> AutofixOrchestrator<'a> {
    pub fn new(config: &'a Config, engine: &'a ExecutionEngine, llm_client: Option<&'a LlmClient>, model: ModelTier) -> Self {
        Self { config, engine, llm_client, model, attempt_timeout: Duration::from_secs(300) }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Run the whole loop. `cancel` is polled between the baseline and
    /// each attempt (spec §5: "an external cancel signal aborts after the
    /// current test case"; at the orchestrator's granularity that is
    /// between attempts, since test-case-level cancellation lives inside
    /// `TestRunner`/`ExecutionEngine`).
    pub async fn run(&self, cancel: &AtomicBool) -> KaizenResult<OrchestratorRun> {
        let evaluator = Evaluator::new(self.llm_client, self.model);
        let runner = TestRunner::new(self.config, self.engine, &evaluator);
        let mut history = TestExecutionHistory::new();
        let mut memory = MemoryStore::new();

        let baseline = runner.execute(RunType::Baseline, cancel).await;
        if baseline.status == crate::model::RunStatus::Error {
            history.add_baseline(baseline);
            return Ok(OrchestratorRun { history, memory, outcome: RunOutcome::Error });
        }
        let baseline_cancelled = cancel.load(Ordering::SeqCst);
        let baseline_passed = baseline.summary.passed == baseline.summary.total;
        history.add_baseline(baseline);

        if baseline_cancelled {
            return Ok(OrchestratorRun { history, memory, outcome: RunOutcome::Cancelled });
        }

        if baseline_passed {
            return Ok(OrchestratorRun { history, memory, outcome: RunOutcome::Success });
        }

        if self.config.max_retries == 0 || self.config.files_to_fix.is_empty() {
            return Ok(OrchestratorRun { history, memory, outcome: RunOutcome::Failed });
        }

        let mut best_passed = history.baseline().map(|b| b.summary.passed).unwrap_or(0);
        let mut outcome = RunOutcome::Failed;

        'attempts: for attempt_number in 1..=self.config.max_retries {
            if cancel.load(Ordering::SeqCst) {
                outcome = RunOutcome::Cancelled;
                break;
            }

            let attempt_result = tokio::time::timeout(self.attempt_timeout, self.run_attempt(attempt_number, &runner, &history, &memory, cancel)).await;

            let attempt = match attempt_result {
                Ok(Ok(attempt)) => attempt,
                Ok(Err(e)) => return Err(e),
                Err(_) => FixAttempt {
                    attempt_number,
                    status: AttemptStatus::Error,
                    changes: HashMap::new(),
                    original_code: HashMap::new(),
                    test_result: None,
                    error: Some("attempt exceeded its time budget".to_string()),
                    compatibility_issues: vec![],
                },
            };

            if cancel.load(Ordering::SeqCst) {
                if let Some(test_result) = attempt.test_result.clone() {
                    history.add_fix_attempt(test_result);
                }
                outcome = RunOutcome::Cancelled;
                break 'attempts;
            }

            for (file_path, record) in &attempt.changes {
                memory.record(MemoryRecord {
                    attempt_number,
                    file_path: file_path.clone(),
                    original_code: record.original.clone(),
                    fixed_code: record.fixed.clone(),
                    success: matches!(attempt.status, AttemptStatus::Success),
                    results_before: best_passed,
                    results_after: attempt.passed_count(),
                    approach_description: attempt_description(&attempt),
                    code_changes: memory_store::diff_summary(&record.original, &record.fixed),
                    llm_interaction: LlmInteraction {
                        prompt: String::new(),
                        response: String::new(),
                        reasoning: None,
                        model: self.model_label(),
                        tokens: None,
                    },
                });
            }

            match attempt.status {
                AttemptStatus::Success => {
                    let test_result = attempt.test_result.expect("success attempt always carries a test result");
                    history.add_fix_attempt(test_result);
                    outcome = RunOutcome::Success;
                    break 'attempts;
                }
                AttemptStatus::Retry => {
                    let passed = attempt.passed_count();
                    let test_result = attempt.test_result.expect("improving attempt always carries a test result");
                    history.add_fix_attempt(test_result);
                    best_passed = passed;
                    outcome = RunOutcome::Improved;
                }
                AttemptStatus::Failed | AttemptStatus::Error | AttemptStatus::CompatibilityIssue => {
                    if let Some(test_result) = attempt.test_result {
                        history.add_fix_attempt(test_result);
                    }
                }
                AttemptStatus::Pending => unreachable!("run_attempt never returns Pending"),
            }
        }

        Ok(OrchestratorRun { history, memory, outcome })
    }

    /// One PROMPT → PATCH → COMPAT_CHECK → WRITE → RE_RUN cycle across
    /// every file in `files_to_fix` (spec §4.11). On any file's disk-write
    /// failure the whole attempt rolls back and the run stops (`FilesystemError`
    /// is non-recoverable per spec §7); on no improvement or exhausted
    /// compatibility budget only this attempt rolls back.
    async fn run_attempt(
        &self,
        attempt_number: u32,
        runner: &TestRunner<'_>,
        history: &TestExecutionHistory,
        memory: &MemoryStore,
        cancel: &AtomicBool,
    ) -> KaizenResult<FixAttempt> {
        let state = StateManager::snapshot(&self.config.files_to_fix)?;
        let original_code = state.original_contents()?;
        let mut attempt = FixAttempt::pending(attempt_number, original_code.clone());

        let baseline = history.baseline().cloned().unwrap_or_else(|| empty_result(self.config));
        let latest = history.latest().cloned().unwrap_or(baseline);
        let failures: Vec<_> = latest.cases.iter().filter(|c| c.status != crate::model::CaseStatus::Passed).cloned().collect();

        for file_path in &self.config.files_to_fix {
            let Some(original) = original_code.get(file_path) else { continue };
            let aux_context = self.auxiliary_context(file_path, &original_code);
            let prior_attempts: Vec<_> = memory.for_file(file_path).into_iter().cloned().collect();
            let mut compatibility_issues = Vec::new();

            for round in 0..=COMPATIBILITY_RETRY_BUDGET {
                let Some(client) = self.llm_client else {
                    attempt.status = AttemptStatus::Error;
                    attempt.error = Some("no LLM client configured for the fixer".to_string());
                    state.restore()?;
                    return Ok(attempt);
                };

                let request = FixRequest {
                    file_path,
                    original_code: original,
                    failures: &failures,
                    memory: &prior_attempts,
                    auxiliary_context: &aux_context,
                    compatibility_issues: &compatibility_issues,
                };

                let response = match fixer::propose_fix(client, &self.model, &request).await {
                    Ok(r) => r,
                    Err(e) => {
                        attempt.status = AttemptStatus::Error;
                        attempt.error = Some(e.to_string());
                        state.restore()?;
                        return Ok(attempt);
                    }
                };

                compatibility_issues = CompatibilityChecker::check(&response.fixed_code, file_path, &aux_context);

                if compatibility_issues.is_empty() {
                    attempt.changes.insert(
                        file_path.clone(),
                        crate::model::ChangeRecord { original: original.clone(), fixed: response.fixed_code.clone() },
                    );
                    std::fs::write(file_path, &response.fixed_code).map_err(|source| KaizenError::Filesystem { path: file_path.clone(), source })?;
                    break;
                }

                if round == COMPATIBILITY_RETRY_BUDGET {
                    attempt.status = AttemptStatus::CompatibilityIssue;
                    attempt.compatibility_issues = compatibility_issues;
                    state.restore()?;
                    return Ok(attempt);
                }
            }
        }

        let test_result = runner.execute(RunType::FixAttempt(attempt_number), cancel).await;
        let passed = test_result.summary.passed;
        let best_passed = history.best().map(|b| b.summary.passed).unwrap_or(0);

        if cancel.load(Ordering::SeqCst) {
            attempt.status = AttemptStatus::Error;
            attempt.error = Some("run cancelled".to_string());
            attempt.test_result = Some(test_result);
            state.restore()?;
            return Ok(attempt);
        }

        if test_result.summary.passed == test_result.summary.total {
            attempt.status = AttemptStatus::Success;
            attempt.test_result = Some(test_result);
            state.commit();
        } else if passed > best_passed {
            attempt.status = AttemptStatus::Retry;
            attempt.test_result = Some(test_result);
            state.commit();
        } else {
            attempt.status = AttemptStatus::Failed;
            attempt.test_result = Some(test_result);
            state.restore()?;
        }

        Ok(attempt)
    }

    /// Sibling files (other `files_to_fix` plus `referenced_files`) to pass
    /// as compatibility-check context and fixer auxiliary context, per spec
    /// §4.8/§4.9 — excludes the file currently being fixed.
    fn auxiliary_context(&self, file_path: &std::path::Path, original_code: &HashMap<PathBuf, String>) -> Vec<(PathBuf, String)> {
        let mut context = Vec::new();
        for sibling in self.config.files_to_fix.iter().chain(self.config.referenced_files.iter()) {
            if sibling == file_path {
                continue;
            }
            if let Some(contents) = original_code.get(sibling) {
                context.push((sibling.clone(), contents.clone()));
            } else if let Ok(contents) = std::fs::read_to_string(sibling) {
                context.push((sibling.clone(), contents));
            }
        }
        context
    }

    fn model_label(&self) -> String {
        self.model.model_id()
    }
}

fn attempt_description(attempt: &FixAttempt) -> String {
    match attempt.status {
        AttemptStatus::Success => "fixed all failing cases".to_string(),
        AttemptStatus::Retry => format!("improved pass count to {}", attempt.passed_count()),
        AttemptStatus::Failed => "no improvement over the prior best".to_string(),
        AttemptStatus::Error => "attempt errored".to_string(),
        AttemptStatus::CompatibilityIssue => "exhausted the compatibility retry budget".to_string(),
        AttemptStatus::Pending => "pending".to_string(),
    }
}

fn empty_result(config: &Config) -> TestExecutionResult {
    TestExecutionResult {
        name: config.name.clone(),
        file_path: config.file_path.clone(),
        config_path: config.config_path.clone(),
        run_type: RunType::Baseline,
        status: crate::model::RunStatus::Failed,
        start_time: chrono::Utc::now(),
        end_time: chrono::Utc::now(),
        cases: vec![],
        summary: crate::model::Summary::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentEntryPointConfig, EvaluationConfig};
    use crate::model::{Criteria, EvaluationSource, EvaluationTarget, InputDefinition, TestCase};
    use serial_test::serial;
    use std::io::Write;

    fn write_agent(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("agent.py");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn config_for(dir: &std::path::Path, file_path: PathBuf, expected: &str) -> Config {
        Config {
            name: "echo-agent".into(),
            file_path,
            agent: AgentEntryPointConfig { module: "agent".into(), class: None, method: Some("run".into()), fallback_to_function: true },
            evaluation: EvaluationConfig { evaluation_targets: vec![] },
            steps: vec![TestCase {
                name: "case-1".into(),
                region: None,
                input: vec![InputDefinition::String { value: "hello".into() }],
                expected_output: Some(expected.to_string()),
                assertions: vec![],
                evaluation_targets: vec![EvaluationTarget {
                    name: "output".into(),
                    source: EvaluationSource::Return,
                    variable_name: None,
                    criteria: Criteria::Equals { value: expected.to_string() },
                    weight: 1.0,
                }],
            }],
            regions: vec![],
            dependencies: vec![],
            referenced_files: vec![],
            files_to_fix: vec![],
            max_retries: 1,
            create_pr: false,
            base_branch: "main".into(),
            pr_strategy: PrStrategy::AllPassing,
            better_ai: false,
            config_dir: dir.to_path_buf(),
            config_path: dir.join("kaizen.yaml"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn all_pass_baseline_needs_no_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(dir.path(), "def run(x):\n    return x\n");
        let config = config_for(dir.path(), path.clone(), "hello");
        let engine = ExecutionEngine::new(path, config.agent.clone(), vec![], vec![]);
        let orchestrator = AutofixOrchestrator::new(&config, &engine, None, ModelTier::Default);

        let cancel = AtomicBool::new(false);
        let run = orchestrator.run(&cancel).await.unwrap();
        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.history.len(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn failing_baseline_without_files_to_fix_stays_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(dir.path(), "def run(x):\n    return x\n");
        let config = config_for(dir.path(), path.clone(), "HELLO");
        let engine = ExecutionEngine::new(path, config.agent.clone(), vec![], vec![]);
        let orchestrator = AutofixOrchestrator::new(&config, &engine, None, ModelTier::Default);

        let cancel = AtomicBool::new(false);
        let run = orchestrator.run(&cancel).await.unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert!(!run.should_open_pr(PrStrategy::AllPassing));
    }

    #[tokio::test]
    #[serial]
    async fn max_retries_zero_with_failing_baseline_skips_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(dir.path(), "def run(x):\n    return x\n");
        let mut config = config_for(dir.path(), path.clone(), "HELLO");
        config.max_retries = 0;
        config.files_to_fix = vec![path.clone()];
        let engine = ExecutionEngine::new(path, config.agent.clone(), vec![], vec![]);
        let orchestrator = AutofixOrchestrator::new(&config, &engine, None, ModelTier::Default);

        let cancel = AtomicBool::new(false);
        let run = orchestrator.run(&cancel).await.unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.history.len(), 1);
    }

    /// Regression test for the module-cache staleness bug: the fixer
    /// rewrites `agent.py` on disk between the baseline and the rerun, and
    /// the rerun must observe the rewritten file rather than whatever
    /// module object the baseline cached under the same module name.
    #[tokio::test]
    #[serial]
    async fn fix_attempt_observes_the_patched_file_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(dir.path(), "def run(x):\n    return x\n");
        let mut config = config_for(dir.path(), path.clone(), "HELLO");
        config.files_to_fix = vec![path.clone()];
        config.max_retries = 1;
        let engine = ExecutionEngine::new(path.clone(), config.agent.clone(), vec![], vec![]);

        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path_regex(r"^/models/.*:generateContent$"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "def run(x):\n    return x.upper()\n"}]}}]
            })))
            .mount(&server)
            .await;
        let llm_client = crate::llm::LlmClient::with_base_url("key".to_string(), server.uri());

        let orchestrator = AutofixOrchestrator::new(&config, &engine, Some(&llm_client), ModelTier::Default);
        let cancel = AtomicBool::new(false);
        let run = orchestrator.run(&cancel).await.unwrap();

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.history.len(), 2);
        let final_result = run.history.latest().unwrap();
        assert_eq!(final_result.summary.passed, final_result.summary.total);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def run(x):\n    return x.upper()\n");
    }
}
