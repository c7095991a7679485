use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{KaizenError, KaizenResult};
use crate::git::{GitExecutor, GitOps, HostingClient, PullRequestSpec, RemoteRepo};
use crate::memory_store::MemoryStore;
use crate::model::{CaseStatus, RunType, TestExecutionHistory, TestExecutionResult};

/// From `TestExecutionHistory`, renders title, body, and test-results
/// table; talks to `git` and the hosting REST API to branch, commit, push,
/// and open a PR (spec §4.12, §6). Body layout is stable and
/// machine-parseable: Agent Summary, Test Results Summary, Detailed
/// Results, Code Changes, Additional Summary, in that order.
pub struct PrComposer<'a> {
    config: &'a Config,
    history: &'a TestExecutionHistory,
    memory: &'a MemoryStore,
}

impl<'a> PrComposer<'a> {
    pub fn new(config: &'a Config, history: &'a TestExecutionHistory, memory: &'a MemoryStore) -> Self {
        Self { config, history, memory }
    }

    /// Open a PR from `best`'s disk state (spec I4: the on-disk content at
    /// this point must equal the state the PR body describes — the caller
    /// is responsible for having already restored `best`'s snapshot if it
    /// is not the current one). Returns the PR's web URL.
    pub async fn compose_and_open(
        &self,
        best: &TestExecutionResult,
        changed_files: &[PathBuf],
        repo_path: &std::path::Path,
        github_token: &str,
        executor: &dyn GitExecutor,
    ) -> KaizenResult<String> {
        let branch_name = self.derive_branch_name(executor, repo_path);
        let body = self.render_body(best);
        let title = self.render_title(best);

        let mut ops = GitOps::new(repo_path.to_path_buf(), executor);
        let original_branch = ops.current_branch()?;

        let result = self.push_and_open(&mut ops, &branch_name, changed_files, &title, &body, github_token).await;

        // Restore the original branch regardless of outcome (spec §5: the
        // Git working tree is owned by C12 "including on failure").
        let _ = ops.checkout(&original_branch);

        result
    }

    async fn push_and_open(
        &self,
        ops: &mut GitOps<'_>,
        branch_name: &str,
        changed_files: &[PathBuf],
        title: &str,
        body: &str,
        github_token: &str,
    ) -> KaizenResult<String> {
        ops.create_branch(branch_name, &self.config.base_branch)?;
        ops.stage(changed_files)?;
        ops.commit(title)?;
        ops.push(branch_name)?;

        let remote_url = ops.remote_url("origin")?;
        let repo = RemoteRepo::parse(&remote_url)
            .ok_or_else(|| KaizenError::Hosting(format!("could not parse remote URL: {remote_url}")))?;

        let hosting = HostingClient::new(github_token.to_string());
        let spec = PullRequestSpec {
            title: title.to_string(),
            body: body.to_string(),
            head_branch: branch_name.to_string(),
            base_branch: self.config.base_branch.clone(),
        };
        hosting
            .create_pull_request(&repo.api_base(), &repo, &spec)
            .await
            .map_err(|e| KaizenError::Hosting(e.to_string()))
    }

    /// `autofix-<timestamp>`, with a numeric suffix appended until the
    /// branch doesn't already exist locally (spec §4.12).
    fn derive_branch_name(&self, executor: &dyn GitExecutor, repo_path: &std::path::Path) -> String {
        let base = format!("autofix-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
        let existing = executor.execute(&["branch", "--list"], repo_path).unwrap_or_default();
        if !existing.contains(&base) {
            return base;
        }
        for suffix in 1.. {
            let candidate = format!("{base}-{suffix}");
            if !existing.contains(&candidate) {
                return candidate;
            }
        }
        unreachable!()
    }

    fn render_title(&self, best: &TestExecutionResult) -> String {
        format!("Autofix: {} ({}/{} passing)", self.config.name, best.summary.passed, best.summary.total)
    }

    fn render_body(&self, best: &TestExecutionResult) -> String {
        let mut sections = Vec::new();
        sections.push(self.agent_summary());
        sections.push(self.test_results_table());
        sections.push(self.detailed_results(best));
        sections.push(self.code_changes());
        sections.push(self.additional_summary());
        sections.join("\n\n")
    }

    /// Section 1: name/version/description.
    fn agent_summary(&self) -> String {
        format!(
            "## Agent Summary\n\n- **Name**: {}\n- **File**: {}\n- **Config**: {}",
            self.config.name,
            self.config.file_path.display(),
            self.config.config_path.display()
        )
    }

    /// Section 2: `Test Case | Baseline | Attempt 1 | ... | Attempt K |
    /// Final Status | Improvement (Yes/No)`, one row per baseline case
    /// (spec §4.12).
    fn test_results_table(&self) -> String {
        let Some(baseline) = self.history.baseline() else {
            return "## Test Results Summary\n\n_no baseline recorded_".to_string();
        };
        let attempts: Vec<&TestExecutionResult> = self.history.attempts().collect();

        let mut header = vec!["Test Case".to_string(), "Baseline".to_string()];
        for i in 1..=attempts.len() {
            header.push(format!("Attempt {i}"));
        }
        header.push("Final Status".to_string());
        header.push("Improvement".to_string());

        let mut rows = vec![header.join(" | "), header.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")];

        for case in &baseline.cases {
            let mut row = vec![case.name.clone(), format!("{:?}", case.status)];
            let mut final_status = case.status;
            for attempt in &attempts {
                let status = TestExecutionResult::status_for(&case.name, &attempt.cases);
                row.push(status.map(|s| format!("{s:?}")).unwrap_or_else(|| "-".to_string()));
                if let Some(s) = status {
                    final_status = s;
                }
            }
            let improvement = final_status == CaseStatus::Passed && case.status != CaseStatus::Passed;
            row.push(format!("{final_status:?}"));
            row.push(if improvement { "Yes".to_string() } else { "No".to_string() });
            rows.push(row.join(" | "));
        }

        format!("## Test Results Summary\n\n{}", rows.join("\n"))
    }

    /// Section 3: baseline and best attempt verbatim.
    fn detailed_results(&self, best: &TestExecutionResult) -> String {
        let mut out = vec!["## Detailed Results".to_string()];
        if let Some(baseline) = self.history.baseline() {
            out.push(format!("\n### Baseline ({})", baseline.run_type));
            out.push(render_cases(baseline));
        }
        out.push(format!("\n### Best attempt ({})", best.run_type));
        out.push(render_cases(best));
        out.join("\n")
    }

    /// Section 4: per-file bullets drawn from memory records.
    fn code_changes(&self) -> String {
        let mut by_file: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for record in self.memory.all() {
            by_file.entry(record.file_path.clone()).or_default().push(format!(
                "attempt {}: {} ({})",
                record.attempt_number, record.approach_description, record.code_changes
            ));
        }
        let mut out = vec!["## Code Changes".to_string()];
        for (file, bullets) in by_file {
            out.push(format!("\n### {}", file.display()));
            for bullet in bullets {
                out.push(format!("- {bullet}"));
            }
        }
        out.join("\n")
    }

    /// Section 5: insights across every file touched this run.
    fn additional_summary(&self) -> String {
        let mut out = vec!["## Additional Summary".to_string()];
        for (file, insights) in self.memory.all_insights() {
            out.push(format!("- **{}**: {}", file.display(), insights.join(", ")));
        }
        out.join("\n")
    }
}

fn render_cases(result: &TestExecutionResult) -> String {
    result
        .cases
        .iter()
        .map(|case| {
            format!(
                "- **{}** — status={:?}, input={}, expected={:?}, actual={:?}, error={:?}",
                case.name, case.status, case.input, case.expected_output, case.actual_output, case.error_message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentEntryPointConfig, EvaluationConfig, PrStrategy};
    use crate::model::{Summary, TestCaseResult};
    use chrono::Utc;

    fn sample_config() -> Config {
        Config {
            name: "echo-agent".into(),
            file_path: PathBuf::from("/project/agent.py"),
            agent: AgentEntryPointConfig { module: "agent".into(), class: None, method: Some("run".into()), fallback_to_function: true },
            evaluation: EvaluationConfig { evaluation_targets: vec![] },
            steps: vec![],
            regions: vec![],
            dependencies: vec![],
            referenced_files: vec![],
            files_to_fix: vec![PathBuf::from("/project/agent.py")],
            max_retries: 1,
            create_pr: true,
            base_branch: "main".into(),
            pr_strategy: PrStrategy::AllPassing,
            better_ai: false,
            config_dir: PathBuf::from("/project"),
            config_path: PathBuf::from("/project/kaizen.yaml"),
        }
    }

    fn case(name: &str, status: CaseStatus) -> TestCaseResult {
        TestCaseResult {
            name: name.into(),
            status,
            region: None,
            input: serde_json::json!([]),
            expected_output: None,
            actual_output: None,
            evaluation: vec![],
            evaluation_score: if status == CaseStatus::Passed { 1.0 } else { 0.0 },
            error_message: None,
            error_details: None,
            execution_time_ms: 1,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    fn result(run_type: RunType, cases: Vec<TestCaseResult>) -> TestExecutionResult {
        let summary = Summary::from_cases(&cases);
        TestExecutionResult {
            name: "echo-agent".into(),
            file_path: PathBuf::from("agent.py"),
            config_path: PathBuf::from("kaizen.yaml"),
            run_type,
            status: TestExecutionResult::derive_status(&cases),
            start_time: Utc::now(),
            end_time: Utc::now(),
            cases,
            summary,
        }
    }

    #[test]
    fn table_marks_improvement_for_newly_passing_case() {
        let config = sample_config();
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, vec![case("case-1", CaseStatus::Failed)]));
        history.add_fix_attempt(result(RunType::FixAttempt(1), vec![case("case-1", CaseStatus::Passed)]));
        let memory = MemoryStore::new();

        let composer = PrComposer::new(&config, &history, &memory);
        let table = composer.test_results_table();
        assert!(table.contains("case-1"));
        assert!(table.contains("Yes"));
    }

    #[test]
    fn table_marks_no_improvement_when_already_passing() {
        let config = sample_config();
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, vec![case("case-1", CaseStatus::Passed)]));
        let memory = MemoryStore::new();

        let composer = PrComposer::new(&config, &history, &memory);
        let table = composer.test_results_table();
        let row = table.lines().find(|l| l.starts_with("case-1")).unwrap();
        assert!(row.ends_with("No"));
    }

    #[test]
    fn render_title_includes_pass_count() {
        let config = sample_config();
        let history = TestExecutionHistory::new();
        let memory = MemoryStore::new();
        let composer = PrComposer::new(&config, &history, &memory);
        let best = result(RunType::FixAttempt(1), vec![case("case-1", CaseStatus::Passed)]);
        assert!(composer.render_title(&best).contains("1/1"));
    }
}
