use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::test_result::TestExecutionResult;
use crate::error::CompatibilityIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
    Error,
    CompatibilityIssue,
    Retry,
}

/// A single line of a change record: a byte-exact before/after snapshot
/// of one file (spec §3, `FixAttempt.changes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub original: String,
    pub fixed: String,
}

/// `{attempt_number, status, changes, original_code, test_result, error?}`
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub changes: HashMap<PathBuf, ChangeRecord>,
    pub original_code: HashMap<PathBuf, String>,
    pub test_result: Option<TestExecutionResult>,
    pub error: Option<String>,
    pub compatibility_issues: Vec<CompatibilityIssue>,
}

impl FixAttempt {
    pub fn pending(attempt_number: u32, original_code: HashMap<PathBuf, String>) -> Self {
        Self {
            attempt_number,
            status: AttemptStatus::Pending,
            changes: HashMap::new(),
            original_code,
            test_result: None,
            error: None,
            compatibility_issues: Vec::new(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.test_result.as_ref().map(|r| r.passed_count()).unwrap_or(0)
    }
}
