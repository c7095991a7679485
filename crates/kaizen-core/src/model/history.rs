use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::test_result::{CaseStatus, RunType, TestExecutionResult};

/// Per-case delta between two runs, used by `improvement_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseDelta {
    Unchanged,
    Fixed,
    Regressed,
    Errored,
}

/// Append-only sequence of `TestExecutionResult`s: exactly one `Baseline`,
/// zero or more `FixAttempt(i)` in attempt order, and at most one `Final`
/// (spec §3, invariant I5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestExecutionHistory {
    entries: Vec<TestExecutionResult>,
}

impl TestExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_baseline(&mut self, result: TestExecutionResult) {
        debug_assert!(result.run_type == RunType::Baseline);
        debug_assert!(self.entries.is_empty(), "baseline must be the first entry");
        self.entries.push(result);
    }

    pub fn add_fix_attempt(&mut self, result: TestExecutionResult) {
        debug_assert!(matches!(result.run_type, RunType::FixAttempt(_)));
        self.entries.push(result);
    }

    pub fn set_final(&mut self, result: TestExecutionResult) {
        debug_assert!(result.run_type == RunType::Final);
        debug_assert!(
            !self.entries.iter().any(|e| e.run_type == RunType::Final),
            "at most one final entry"
        );
        self.entries.push(result);
    }

    pub fn baseline(&self) -> Option<&TestExecutionResult> {
        self.entries.iter().find(|e| e.run_type == RunType::Baseline)
    }

    pub fn attempts(&self) -> impl Iterator<Item = &TestExecutionResult> {
        self.entries
            .iter()
            .filter(|e| matches!(e.run_type, RunType::FixAttempt(_)))
    }

    pub fn entries(&self) -> &[TestExecutionResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&TestExecutionResult> {
        self.entries.last()
    }

    /// Highest passed-count attempt, ties broken by lowest attempt number
    /// (spec I3/I4/P4). Considers the baseline too, so a run with no
    /// improving attempt still returns a sensible "best" (the baseline).
    pub fn best(&self) -> Option<&TestExecutionResult> {
        let mut best: Option<&TestExecutionResult> = None;
        for entry in &self.entries {
            if matches!(entry.run_type, RunType::Final) {
                continue;
            }
            best = match best {
                None => Some(entry),
                Some(current) if entry.passed_count() > current.passed_count() => Some(entry),
                Some(current) => Some(current),
            };
        }
        best
    }

    /// Per-case delta of `attempt` against the baseline.
    pub fn improvement_summary(&self, attempt: &TestExecutionResult) -> HashMap<String, CaseDelta> {
        let mut out = HashMap::new();
        let Some(baseline) = self.baseline() else {
            return out;
        };
        for case in &attempt.cases {
            let before = TestExecutionResult::status_for(&case.name, &baseline.cases);
            let delta = match (before, case.status) {
                (Some(CaseStatus::Passed), CaseStatus::Passed) => CaseDelta::Unchanged,
                (Some(b), CaseStatus::Passed) if b != CaseStatus::Passed => CaseDelta::Fixed,
                (Some(CaseStatus::Passed), s) if s != CaseStatus::Passed => CaseDelta::Regressed,
                (Some(_), CaseStatus::Error) => CaseDelta::Errored,
                _ => CaseDelta::Unchanged,
            };
            out.insert(case.name.clone(), delta);
        }
        out
    }

    /// Legacy projection keyed by region, preserving the final case set
    /// (spec §4.6), used by the PR composer.
    pub fn legacy_view(&self) -> HashMap<String, Vec<&TestExecutionResult>> {
        let mut view: HashMap<String, Vec<&TestExecutionResult>> = HashMap::new();
        for entry in &self.entries {
            for case in &entry.cases {
                let region = case.region.clone().unwrap_or_else(|| "default".to_string());
                view.entry(region).or_default().push(entry);
            }
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_result::{RunStatus, Summary};
    use chrono::Utc;

    fn result(run_type: RunType, passed: usize, total: usize) -> TestExecutionResult {
        TestExecutionResult {
            name: "agent".into(),
            file_path: "agent.py".into(),
            config_path: "kaizen.yaml".into(),
            run_type,
            status: if passed == total { RunStatus::Passed } else { RunStatus::Failed },
            start_time: Utc::now(),
            end_time: Utc::now(),
            cases: vec![],
            summary: Summary { total, passed, failed: total - passed, error: 0, success_rate: passed as f64 / total as f64 },
        }
    }

    #[test]
    fn best_prefers_earlier_on_tie() {
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, 1, 3));
        history.add_fix_attempt(result(RunType::FixAttempt(1), 2, 3));
        history.add_fix_attempt(result(RunType::FixAttempt(2), 2, 3));
        let best = history.best().unwrap();
        assert_eq!(best.run_type, RunType::FixAttempt(1));
    }

    #[test]
    fn best_tracks_strict_improvement() {
        let mut history = TestExecutionHistory::new();
        history.add_baseline(result(RunType::Baseline, 1, 3));
        history.add_fix_attempt(result(RunType::FixAttempt(1), 3, 3));
        history.add_fix_attempt(result(RunType::FixAttempt(2), 2, 3));
        let best = history.best().unwrap();
        assert_eq!(best.run_type, RunType::FixAttempt(1));
        assert_eq!(best.passed_count(), 3);
    }
}
