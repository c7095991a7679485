use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;
use crate::evaluator::{Evaluator, Observed};
use crate::model::{CaseStatus, RunType, Summary, TestCaseResult, TestExecutionResult};
use crate::python::ExecutionEngine;

/// Per-test-case timeout bounding the Execution Engine call (spec §5:
/// "Timeouts are applied at three levels: per test case (in C3)..."). The
/// attempt- and run-level timeouts are `AutofixOrchestrator`'s concern.
const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(60);

/// For each case: materialize, execute, evaluate, collect a
/// `TestCaseResult`; aggregate to a `TestExecutionResult` (spec §4.5). A
/// single case failure never aborts the run. Pure with respect to the
/// orchestrator: no disk writes beyond the returned log.
pub struct TestRunner<'a> {
    config: &'a Config,
    engine: &'a ExecutionEngine,
    evaluator: &'a Evaluator<'a>,
    case_timeout: Duration,
}

impl<'a> TestRunner<'a> {
    pub fn new(config: &'a Config, engine: &'a ExecutionEngine, evaluator: &'a Evaluator<'a>) -> Self {
        Self { config, engine, evaluator, case_timeout: DEFAULT_CASE_TIMEOUT }
    }

    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Runs every case in declaration order. `cancel` is checked after each
    /// case completes; when set, the run stops immediately rather than
    /// starting the next case (spec §5: "an external cancel signal aborts
    /// after the current test case").
    pub async fn execute(&self, run_type: RunType, cancel: &AtomicBool) -> TestExecutionResult {
        let start_time = Utc::now();
        let mut cases = Vec::with_capacity(self.config.steps.len());

        for case in &self.config.steps {
            cases.push(self.run_case(case).await);
            if cancel.load(Ordering::SeqCst) {
                break;
            }
        }

        let end_time = Utc::now();
        let summary = Summary::from_cases(&cases);
        let status = TestExecutionResult::derive_status(&cases);

        TestExecutionResult {
            name: self.config.name.clone(),
            file_path: self.config.file_path.clone(),
            config_path: self.config.config_path.clone(),
            run_type,
            status,
            start_time,
            end_time,
            cases,
            summary,
        }
    }

    async fn run_case(&self, case: &crate::model::TestCase) -> TestCaseResult {
        let timestamp = Utc::now();
        let case_start = std::time::Instant::now();
        let input_json = case_input_as_json(case);

        let output = match tokio::time::timeout(self.case_timeout, self.engine.execute(case.input.clone())).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return TestCaseResult {
                    name: case.name.clone(),
                    status: CaseStatus::Error,
                    region: case.region.clone(),
                    input: input_json,
                    expected_output: case.expected_output.clone(),
                    actual_output: None,
                    evaluation: vec![],
                    evaluation_score: 0.0,
                    error_message: Some(e.to_string()),
                    error_details: None,
                    execution_time_ms: case_start.elapsed().as_millis() as u64,
                    timestamp,
                    metadata: serde_json::Map::new(),
                };
            }
            Err(_) => {
                return TestCaseResult {
                    name: case.name.clone(),
                    status: CaseStatus::Error,
                    region: case.region.clone(),
                    input: input_json,
                    expected_output: case.expected_output.clone(),
                    actual_output: None,
                    evaluation: vec![],
                    evaluation_score: 0.0,
                    error_message: Some("test case exceeded its time budget".to_string()),
                    error_details: None,
                    execution_time_ms: case_start.elapsed().as_millis() as u64,
                    timestamp,
                    metadata: serde_json::Map::new(),
                };
            }
        };

        let observed = Observed { return_value: output.return_value.clone(), tracked_values: output.tracked_values.clone() };
        let (evaluation, score, passed) = self.evaluator.evaluate(case, &observed).await;

        TestCaseResult {
            name: case.name.clone(),
            status: if passed { CaseStatus::Passed } else { CaseStatus::Failed },
            region: case.region.clone(),
            input: input_json,
            expected_output: case.expected_output.clone(),
            actual_output: Some(output.return_value),
            evaluation,
            evaluation_score: score,
            error_message: None,
            error_details: None,
            execution_time_ms: output.duration_ms,
            timestamp,
            metadata: serde_json::Map::new(),
        }
    }
}

fn case_input_as_json(case: &crate::model::TestCase) -> serde_json::Value {
    serde_json::to_value(&case.input).unwrap_or(serde_json::Value::Null)
}
