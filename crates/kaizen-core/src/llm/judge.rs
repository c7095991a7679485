use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::config::ModelTier;

use super::client::{LlmClient, LlmClientError};

/// Parsed, schema-validated judge response (spec §4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeVerdict {
    pub status: JudgeStatus,
    pub evaluation: String,
    pub reasoning: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeStatus {
    Passed,
    Failed,
}

static VERDICT_SCHEMA: Lazy<serde_json::Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "required": ["status", "evaluation", "reasoning", "confidence"],
        "properties": {
            "status": {"type": "string", "enum": ["passed", "failed"]},
            "evaluation": {"type": "string"},
            "reasoning": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        }
    })
});

const MAX_ATTEMPTS: u32 = 3;

/// Compose a judge prompt and require a JSON object matching
/// `{status, evaluation, reasoning, confidence}`; retry up to three times
/// with exponential backoff on transient transport errors or responses
/// that fail schema validation (spec §4.4, §7 `EvaluationError`).
pub async fn judge(
    client: &LlmClient,
    model: &ModelTier,
    case_name: &str,
    expected: Option<&str>,
    actual: &str,
    rubric: &str,
) -> Result<JudgeVerdict, LlmClientError> {
    let prompt = build_prompt(case_name, expected, actual, rubric);

    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        let response = match client.generate(model, &prompt).await {
            Ok(text) => text,
            Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                backoff(attempt).await;
                last_err = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match parse_and_validate(&response) {
            Ok(verdict) => return Ok(verdict),
            Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!(attempt, %e, "judge returned malformed JSON, retrying");
                backoff(attempt).await;
                last_err = Some(LlmClientError::Malformed(e));
            }
            Err(e) => return Err(LlmClientError::Malformed(e)),
        }
    }
    Err(last_err.unwrap_or_else(|| LlmClientError::Malformed("exhausted retries".to_string())))
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(std::time::Duration::from_millis(200 * 2u64.pow(attempt))).await;
}

fn build_prompt(case_name: &str, expected: Option<&str>, actual: &str, rubric: &str) -> String {
    let expected_line = expected.map(|e| format!("Expected: {e}\n")).unwrap_or_default();
    format!(
        indoc::indoc! {"
            You are judging one test case of an LLM agent test suite.

            Case: {case_name}
            {expected_line}Actual: {actual}
            Rubric: {rubric}

            Respond with a single JSON object and nothing else, matching exactly:
            {{\"status\": \"passed\"|\"failed\", \"evaluation\": string, \"reasoning\": string, \"confidence\": number between 0 and 1}}
        "},
        case_name = case_name,
        expected_line = expected_line,
        actual = actual,
        rubric = rubric,
    )
}

fn parse_and_validate(response: &str) -> Result<JudgeVerdict, String> {
    let cleaned = strip_code_fences(response);
    let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| format!("invalid JSON: {e}"))?;
    jsonschema::validate(&VERDICT_SCHEMA, &value).map_err(|e| format!("schema violation: {e}"))?;
    serde_json::from_value(value).map_err(|e| format!("failed to deserialize verdict: {e}"))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn parses_valid_verdict() {
        let response = r#"{"status": "passed", "evaluation": "ok", "reasoning": "matches", "confidence": 0.9}"#;
        let verdict = parse_and_validate(response).unwrap();
        assert_eq!(verdict.status, JudgeStatus::Passed);
    }

    #[test]
    fn rejects_missing_field() {
        let response = r#"{"status": "passed", "evaluation": "ok"}"#;
        assert!(parse_and_validate(response).is_err());
    }
}
