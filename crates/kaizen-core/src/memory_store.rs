use std::collections::HashMap;
use std::path::{Path, PathBuf};

use similar::{ChangeTag, TextDiff};

use crate::model::MemoryRecord;

/// A short, human-readable tag summarizing one attempt, surfaced to the PR
/// body's "Additional Summary" section (spec §4.7).
pub type Insight = String;

/// Per-run journal of attempts, keyed by file path so the fixer can pull
/// "recent prompts/responses for this file" (spec §4.7). Memory never
/// reads code from disk; it only records what the orchestrator hands it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<MemoryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: MemoryRecord) {
        self.records.push(record);
    }

    pub fn all(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// Records for `file_path`, most recent last — what C8 passes as
    /// `memory_snippets` when building the next prompt.
    pub fn for_file(&self, file_path: &Path) -> Vec<&MemoryRecord> {
        self.records.iter().filter(|r| r.file_path == file_path).collect()
    }

    /// The most recent record's diff summary for `file_path`, if any.
    pub fn last_diff(&self, file_path: &Path) -> Option<String> {
        self.for_file(file_path).last().map(|r| r.code_changes.clone())
    }

    /// Derived short tags describing what each attempt on `file_path`
    /// changed, e.g. `introduced_exception_handling`, `changed_prompt_text`,
    /// `no_effective_change` (spec §4.7).
    pub fn insights(&self, file_path: &Path) -> Vec<Insight> {
        self.for_file(file_path).iter().map(|r| derive_insight(r)).collect()
    }

    /// Insights across every file touched this run, for the PR body's
    /// "Additional Summary" section.
    pub fn all_insights(&self) -> HashMap<PathBuf, Vec<Insight>> {
        let mut by_file: HashMap<PathBuf, Vec<Insight>> = HashMap::new();
        for record in &self.records {
            by_file.entry(record.file_path.clone()).or_default().push(derive_insight(record));
        }
        by_file
    }
}

/// Build a `similar`-based unified diff summary between two code
/// snapshots, used as `MemoryRecord.code_changes` (spec §3).
pub fn diff_summary(original: &str, fixed: &str) -> String {
    let diff = TextDiff::from_lines(original, fixed);
    let mut added = 0usize;
    let mut removed = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    format!("+{added} -{removed} lines")
}

fn derive_insight(record: &MemoryRecord) -> Insight {
    if record.original_code == record.fixed_code {
        return "no_effective_change".to_string();
    }
    if record.fixed_code.contains("except") && !record.original_code.contains("except") {
        return "introduced_exception_handling".to_string();
    }
    if record.fixed_code.contains("\"\"\"") && !record.original_code.contains("\"\"\"") {
        return "added_docstrings".to_string();
    }
    if record.results_after > record.results_before {
        return "improved_pass_count".to_string();
    }
    "modified_logic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LlmInteraction;

    fn sample_record(file: &str, before: usize, after: usize, original: &str, fixed: &str) -> MemoryRecord {
        MemoryRecord {
            attempt_number: 1,
            file_path: PathBuf::from(file),
            original_code: original.to_string(),
            fixed_code: fixed.to_string(),
            success: after > before,
            results_before: before,
            results_after: after,
            approach_description: "test".to_string(),
            code_changes: diff_summary(original, fixed),
            llm_interaction: LlmInteraction { prompt: "p".into(), response: "r".into(), reasoning: None, model: "m".into(), tokens: None },
        }
    }

    #[test]
    fn for_file_filters_by_path() {
        let mut store = MemoryStore::new();
        store.record(sample_record("a.py", 1, 2, "def f(): pass", "def f(): return 1"));
        store.record(sample_record("b.py", 1, 1, "x", "x"));
        assert_eq!(store.for_file(Path::new("a.py")).len(), 1);
    }

    #[test]
    fn insight_detects_no_change() {
        let mut store = MemoryStore::new();
        store.record(sample_record("a.py", 1, 1, "x = 1", "x = 1"));
        assert_eq!(store.insights(Path::new("a.py")), vec!["no_effective_change"]);
    }
}
