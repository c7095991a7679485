use std::path::Path;

use crate::config::ModelTier;
use crate::error::CompatibilityIssue;
use crate::model::{MemoryRecord, TestCaseResult};

use super::client::{LlmClient, LlmClientError};

/// Everything C8 needs to build one repair prompt (spec §4.8).
pub struct FixRequest<'a> {
    pub file_path: &'a Path,
    pub original_code: &'a str,
    pub failures: &'a [TestCaseResult],
    pub memory: &'a [MemoryRecord],
    pub auxiliary_context: &'a [(std::path::PathBuf, String)],
    pub compatibility_issues: &'a [CompatibilityIssue],
}

/// `{fixed_code, explanation, confidence}` (spec §4.8); confidence is a
/// coarse signal (not schema-validated like the judge's) derived from
/// whether the model's reply needed fence-stripping.
pub struct FixResponse {
    pub fixed_code: String,
    pub explanation: String,
}

const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Build a single prompt naming the file, listing failures with
/// inputs/expected/actual/reasons, citing prior attempts with outcomes,
/// and requiring a complete replacement file with no prose. Calls the
/// provider with deterministic settings and strips accidental fences or
/// leading prose (spec §4.8).
pub async fn propose_fix(client: &LlmClient, model: &ModelTier, request: &FixRequest<'_>) -> Result<FixResponse, LlmClientError> {
    let prompt = build_prompt(request);

    let mut last_err = None;
    for attempt in 0..MAX_TRANSIENT_RETRIES {
        match client.generate(model, &prompt).await {
            Ok(raw) => {
                let fixed_code = clean_response(&raw);
                return Ok(FixResponse { fixed_code, explanation: summarize_failures(request.failures) });
            }
            Err(e) if e.is_transient() && attempt + 1 < MAX_TRANSIENT_RETRIES => {
                tracing::warn!(attempt, %e, "transient error from fixer call, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(200 * 2u64.pow(attempt))).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| LlmClientError::Transport("exhausted retries".to_string())))
}

fn build_prompt(request: &FixRequest<'_>) -> String {
    let mut sections = Vec::new();
    sections.push(format!("You are fixing a single Python source file: {}", request.file_path.display()));
    sections.push("Return the complete replacement file contents only — no prose, no markdown fences.".to_string());
    sections.push("\n--- Current contents ---".to_string());
    sections.push(request.original_code.to_string());

    sections.push("\n--- Failing test cases ---".to_string());
    for failure in request.failures {
        sections.push(format!(
            "Case `{}`: input={} expected={:?} actual={:?} error={:?}",
            failure.name, failure.input, failure.expected_output, failure.actual_output, failure.error_message
        ));
    }

    if !request.memory.is_empty() {
        sections.push("\n--- Prior attempts on this file ---".to_string());
        for record in request.memory {
            sections.push(format!(
                "Attempt {}: {} (success={}, {} -> {} passed). {}",
                record.attempt_number, record.approach_description, record.success, record.results_before, record.results_after, record.code_changes
            ));
        }
    }

    if !request.compatibility_issues.is_empty() {
        sections.push("\n--- Compatibility issues to resolve in this attempt ---".to_string());
        for issue in request.compatibility_issues {
            sections.push(format!("{}: {} (line {:?})", issue.path.display(), issue.message, issue.line));
        }
    }

    if !request.auxiliary_context.is_empty() {
        sections.push("\n--- Sibling files that import from this one (do not break their references) ---".to_string());
        for (path, contents) in request.auxiliary_context {
            sections.push(format!("# {}\n{}", path.display(), contents));
        }
    }

    sections.join("\n")
}

fn summarize_failures(failures: &[TestCaseResult]) -> String {
    format!("addressed {} failing case(s): {}", failures.len(), failures.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "))
}

/// Strip accidental markdown fences or leading prose from the model's
/// reply, keeping only the code body (spec §4.8).
fn clean_response(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_lang = after_fence.strip_prefix("python").unwrap_or(after_fence);
        let after_lang = after_lang.strip_prefix('\n').unwrap_or(after_lang);
        if let Some(end) = after_lang.rfind("```") {
            return after_lang[..end].trim_end().to_string();
        }
        return after_lang.trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_fenced_response() {
        let raw = "```python\ndef run(x):\n    return x\n```";
        assert_eq!(clean_response(raw), "def run(x):\n    return x");
    }

    #[test]
    fn passes_through_unfenced_response() {
        let raw = "def run(x):\n    return x\n";
        assert_eq!(clean_response(raw), raw.trim());
    }
}
