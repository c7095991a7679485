use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a single case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

/// Status of a run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Error,
}

/// Which kind of run produced a `TestExecutionResult` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Baseline,
    FixAttempt(u32),
    Final,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunType::Baseline => write!(f, "baseline"),
            RunType::FixAttempt(i) => write!(f, "fix_attempt_{i}"),
            RunType::Final => write!(f, "final"),
        }
    }
}

/// Structured per-target evaluation outcome, attached to a `TestCaseResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEvaluation {
    pub target_name: String,
    pub passed: bool,
    pub score: f64,
    pub reasoning: Option<String>,
    pub error: Option<String>,
}

/// Created once per test execution; never mutated afterward (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub region: Option<String>,
    pub input: Value,
    pub expected_output: Option<String>,
    pub actual_output: Option<Value>,
    pub evaluation: Vec<TargetEvaluation>,
    pub evaluation_score: f64,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Map<String, Value>,
}

/// Aggregate counters for a `TestExecutionResult`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub error: usize,
    pub success_rate: f64,
}

impl Summary {
    pub fn from_cases(cases: &[TestCaseResult]) -> Self {
        let total = cases.len();
        let passed = cases.iter().filter(|c| c.status == CaseStatus::Passed).count();
        let failed = cases.iter().filter(|c| c.status == CaseStatus::Failed).count();
        let error = cases.iter().filter(|c| c.status == CaseStatus::Error).count();
        let success_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };
        Self { total, passed, failed, error, success_rate }
    }
}

/// Ordered, owned collection of `TestCaseResult`s plus run metadata
/// (spec §3). Overall status is `Passed` iff every case passed; `Error`
/// if the runner itself could not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecutionResult {
    pub name: String,
    pub file_path: std::path::PathBuf,
    pub config_path: std::path::PathBuf,
    pub run_type: RunType,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub cases: Vec<TestCaseResult>,
    pub summary: Summary,
}

impl TestExecutionResult {
    pub fn passed_count(&self) -> usize {
        self.summary.passed
    }

    pub fn status_for(name: &str, cases: &[TestCaseResult]) -> Option<CaseStatus> {
        cases.iter().find(|c| c.name == name).map(|c| c.status)
    }

    /// Overall status derived from a completed case set: `Passed` iff
    /// every case passed, else `Failed`. `RunStatus::Error` is reserved
    /// for runs where the runner itself could not complete and is set
    /// explicitly by the caller, not derived here.
    pub fn derive_status(cases: &[TestCaseResult]) -> RunStatus {
        if cases.iter().all(|c| c.status == CaseStatus::Passed) {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}
