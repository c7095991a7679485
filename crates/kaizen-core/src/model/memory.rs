use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The LLM interaction that produced a `MemoryRecord` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub prompt: String,
    pub response: String,
    pub reasoning: Option<String>,
    pub model: String,
    pub tokens: Option<u32>,
}

/// Per-attempt record of prompt, response, code diff, and pass/fail delta
/// (spec §3, §4.7). Memory owns no code beyond these textual snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub attempt_number: u32,
    pub file_path: PathBuf,
    pub original_code: String,
    pub fixed_code: String,
    pub success: bool,
    pub results_before: usize,
    pub results_after: usize,
    pub approach_description: String,
    pub code_changes: String,
    pub llm_interaction: LlmInteraction,
}
