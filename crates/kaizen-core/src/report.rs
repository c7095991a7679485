use std::path::Path;

use serde::Serialize;

use crate::error::{KaizenError, KaizenResult};
use crate::model::{CaseStatus, RunStatus, TestExecutionHistory, TestExecutionResult};

/// Emoji prefix for a case/run status, matching the CLI's human-readable
/// report (spec §6 persisted artifacts; `report_writer.py`/`formatters.py`
/// `STATUS_EMOJI`).
fn status_emoji(status: &str) -> &'static str {
    match status {
        "passed" => "✅",
        "failed" => "❌",
        "error" => "💥",
        "skipped" => "⏭️",
        _ => "❓",
    }
}

fn format_case_status(status: CaseStatus) -> String {
    let label = match status {
        CaseStatus::Passed => "passed",
        CaseStatus::Failed => "failed",
        CaseStatus::Error => "error",
        CaseStatus::Skipped => "skipped",
    };
    format!("{} {}", status_emoji(label), label.to_uppercase())
}

fn format_run_status(status: RunStatus) -> String {
    let label = match status {
        RunStatus::Passed => "passed",
        RunStatus::Failed => "failed",
        RunStatus::Error => "error",
    };
    format!("{} {}", status_emoji(label), label.to_uppercase())
}

/// Writes the two persisted artifacts of a completed run: a human-readable
/// plain-text report (`test-results/*.txt`) and a machine-readable JSON log
/// (`test-logs/*.json`), both keyed by the history's baseline and attempts
/// (spec §6). Grounded in `TestReportWriter` (teacher's own `quality/`
/// report writers cover only CI status, not this repair journal — this
/// follows the original Python report format directly).
pub struct ReportWriter<'a> {
    history: &'a TestExecutionHistory,
}

impl<'a> ReportWriter<'a> {
    pub fn new(history: &'a TestExecutionHistory) -> Self {
        Self { history }
    }

    /// Write the plain-text report to `path`.
    pub fn write_text_report(&self, path: &Path) -> KaizenResult<()> {
        let mut out = String::new();
        self.write_header(&mut out);
        self.write_configuration(&mut out);
        self.write_overall_status(&mut out);
        self.write_detailed_results(&mut out);
        self.write_failed_tests(&mut out);
        self.write_autofix_attempts(&mut out);
        std::fs::write(path, out).map_err(|source| KaizenError::Filesystem { path: path.to_path_buf(), source })
    }

    /// Write the structured JSON log to `path`, for tools that consume the
    /// run programmatically (`analyze-logs`, CI dashboards).
    pub fn write_json_log(&self, path: &Path) -> KaizenResult<()> {
        let log = JsonLog::from_history(self.history);
        let serialized = serde_json::to_string_pretty(&log).map_err(|e| KaizenError::Configuration(e.to_string()))?;
        std::fs::write(path, serialized).map_err(|source| KaizenError::Filesystem { path: path.to_path_buf(), source })
    }

    fn write_header(&self, out: &mut String) {
        out.push_str("Test Results Report\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");
    }

    fn write_configuration(&self, out: &mut String) {
        let Some(baseline) = self.history.baseline() else { return };
        out.push_str("Test Configuration:\n");
        out.push_str(&format!("- Name: {}\n", baseline.name));
        out.push_str(&format!("- File: {}\n", baseline.file_path.display()));
        out.push_str(&format!("- Config: {}\n\n", baseline.config_path.display()));
    }

    fn write_overall_status(&self, out: &mut String) {
        let status = self.history.best().map(|r| format_run_status(r.status)).unwrap_or_else(|| format!("{} UNKNOWN", status_emoji("unknown")));
        out.push_str(&format!("Overall Status: {status}\n\n"));
    }

    fn write_detailed_results(&self, out: &mut String) {
        out.push_str("Detailed Test Results:\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");

        for entry in self.history.entries() {
            out.push_str(&format!("Region: {}\n", entry.run_type));
            out.push_str(&"-".repeat(30));
            out.push('\n');
            for case in &entry.cases {
                self.write_case(out, case);
            }
        }
    }

    fn write_case(&self, out: &mut String, case: &crate::model::TestCaseResult) {
        out.push_str(&format!("\nTest: {}\n", case.name));
        out.push_str(&format!("Status: {}\n", format_case_status(case.status)));
        if let Some(actual) = &case.actual_output {
            out.push_str(&format!("Output:\n{actual}\n"));
        }
        if !case.evaluation.is_empty() {
            let serialized = serde_json::to_string_pretty(&case.evaluation).unwrap_or_default();
            out.push_str(&format!("Evaluation:\n{serialized}\n"));
        }
        out.push_str(&"-".repeat(30));
        out.push('\n');
    }

    fn write_failed_tests(&self, out: &mut String) {
        let Some(latest) = self.history.latest() else { return };
        let failed: Vec<_> = latest.cases.iter().filter(|c| c.status != CaseStatus::Passed).collect();
        if failed.is_empty() {
            return;
        }

        out.push_str("\nFailed Tests Analysis:\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");
        for case in failed {
            out.push_str(&format!("Test: {} ({})\n", case.name, case.region.as_deref().unwrap_or("default")));
            out.push_str(&format!("Error: {}\n", case.error_message.as_deref().unwrap_or("unknown error")));
            out.push_str(&"-".repeat(30));
            out.push('\n');
        }
    }

    fn write_autofix_attempts(&self, out: &mut String) {
        let attempts: Vec<&TestExecutionResult> = self.history.attempts().collect();
        if attempts.is_empty() {
            return;
        }

        out.push_str("\nAuto-fix Attempts:\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");

        for attempt in attempts {
            out.push_str(&format!("{}:\n", attempt.run_type));
            out.push_str(&"-".repeat(30));
            out.push('\n');

            let fixed: Vec<_> = attempt.cases.iter().filter(|c| c.status == CaseStatus::Passed).collect();
            if fixed.is_empty() {
                out.push_str("No tests were fixed in this attempt\n");
            } else {
                out.push_str("Fixed Tests:\n");
                for case in fixed {
                    out.push_str(&format!("- {} ({})\n", case.name, case.region.as_deref().unwrap_or("default")));
                }
            }

            out.push_str(&format!("\nOverall Status: {}\n\n", format_run_status(attempt.status)));
        }
    }
}

#[derive(Serialize)]
struct JsonLog {
    baseline: Option<JsonRun>,
    attempts: Vec<JsonRun>,
    best_passed: usize,
    best_total: usize,
}

#[derive(Serialize)]
struct JsonRun {
    run_type: String,
    status: String,
    passed: usize,
    total: usize,
    cases: Vec<JsonCase>,
}

#[derive(Serialize)]
struct JsonCase {
    name: String,
    status: String,
    error_message: Option<String>,
}

impl JsonLog {
    fn from_history(history: &TestExecutionHistory) -> Self {
        let to_json_run = |r: &TestExecutionResult| JsonRun {
            run_type: r.run_type.to_string(),
            status: format!("{:?}", r.status).to_lowercase(),
            passed: r.summary.passed,
            total: r.summary.total,
            cases: r
                .cases
                .iter()
                .map(|c| JsonCase { name: c.name.clone(), status: format!("{:?}", c.status).to_lowercase(), error_message: c.error_message.clone() })
                .collect(),
        };

        let best = history.best();
        Self {
            baseline: history.baseline().map(to_json_run),
            attempts: history.attempts().map(to_json_run).collect(),
            best_passed: best.map(|b| b.summary.passed).unwrap_or(0),
            best_total: best.map(|b| b.summary.total).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunType, Summary, TestCaseResult};
    use chrono::Utc;

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
            error_message: if status == CaseStatus::Passed { None } else { Some("mismatch".to_string()) },
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
            file_path: "agent.py".into(),
            config_path: "kaizen.yaml".into(),
            run_type,
            status: TestExecutionResult::derive_status(&cases),
            start_time: Utc::now(),
            end_time: Utc::now(),
            cases,
            summary,
        }
    }

    #[test]
    fn text_report_includes_failed_test_section() {
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, vec![case("case-1", CaseStatus::Failed)]));
        let writer = ReportWriter::new(&history);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        writer.write_text_report(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Failed Tests Analysis"));
        assert!(contents.contains("case-1"));
    }

    #[test]
    fn json_log_tracks_best_pass_count() {
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, vec![case("case-1", CaseStatus::Failed)]));
        history.add_fix_attempt(result(RunType::FixAttempt(1), vec![case("case-1", CaseStatus::Passed)]));
        let writer = ReportWriter::new(&history);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        writer.write_json_log(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["best_passed"], 1);
        assert_eq!(parsed["attempts"].as_array().unwrap().len(), 1);
    }
}
