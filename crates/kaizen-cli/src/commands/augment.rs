use std::path::PathBuf;
use std::process::ExitCode;

use kaizen_core::config::{Config, EnvDiscovery, ModelTier};
use kaizen_core::error::KaizenError;
use kaizen_core::llm::LlmClient;
use kaizen_core::model::TestCase;

/// `augment <config> --total N [--better-ai]` (spec §6, §3 "supplemented
/// features"). A thin wrapper over `kaizen_core::llm`: proposes additional
/// `TestCase`s from the shape of the existing suite and writes them back
/// into the configuration file. Grounded in
/// `kaizen/cli/commands/augment.py`, which is itself listed in spec.md §1
/// as an external collaborator ("test-case-generation utility") — this
/// command does not duplicate that generator's heuristics, only its entry
/// point and the request/response shape.
pub struct Args {
    pub config: PathBuf,
    pub total: usize,
    pub better_ai: bool,
}

const MAX_GENERATION_ATTEMPTS: u32 = 3;

pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(&args.config)?;

    if config.steps.len() >= args.total {
        println!("{} already has {} case(s), at or above the requested total of {}", config.name, config.steps.len(), args.total);
        return Ok(ExitCode::from(0));
    }

    let api_key = EnvDiscovery::google_api_key()?;
    let llm_client = LlmClient::new(api_key);
    let model = ModelTier::from_better_ai(args.better_ai);
    let needed = args.total - config.steps.len();

    let prompt = build_prompt(&config.steps, needed);
    let response = llm_client.generate_with_retry(&model, &prompt, MAX_GENERATION_ATTEMPTS).await.map_err(|e| KaizenError::LlmProvider(e.to_string()))?;
    let generated = parse_generated_cases(&response)?;

    if generated.is_empty() {
        return Err(KaizenError::LlmProvider("the model returned no additional test cases".to_string()).into());
    }

    let added = generated.len().min(needed);
    config.steps.extend(generated.into_iter().take(needed));

    let serialized = serde_yaml::to_string(&config).map_err(|e| KaizenError::Configuration(e.to_string()))?;
    std::fs::write(&args.config, serialized).map_err(|source| KaizenError::Filesystem { path: args.config.clone(), source })?;

    println!("Added {added} test case(s) to {} ({} total)", args.config.display(), config.steps.len());
    Ok(ExitCode::from(0))
}

/// Describe the existing suite's structure and ask for `needed` more
/// cases in the same shape, as a bare YAML list (no prose, no fences).
fn build_prompt(existing: &[TestCase], needed: usize) -> String {
    let sample = serde_yaml::to_string(existing).unwrap_or_default();
    format!(
        indoc::indoc! {"
            You generate additional test cases for an LLM agent test suite.
            Here are the existing test cases, in YAML:

            {sample}

            Generate {needed} new test case(s) that follow the same structure
            (same field names, same kinds of `input` and `evaluation_targets`)
            but cover edge cases or variations not already present. Respond
            with a bare YAML list of test cases and nothing else — no prose,
            no markdown fences, no surrounding keys.
        "},
        sample = sample,
        needed = needed,
    )
}

fn parse_generated_cases(response: &str) -> Result<Vec<TestCase>, KaizenError> {
    let cleaned = strip_code_fences(response);
    serde_yaml::from_str(cleaned).map_err(|e| KaizenError::LlmProvider(format!("the model's response was not a valid YAML list of test cases: {e}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```yaml") {
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
    fn parses_bare_yaml_list() {
        let response = indoc::indoc! {r#"
            - name: edge-case-1
              input:
                - type: string
                  value: ""
              evaluation_targets:
                - name: output
                  source: return
                  criteria:
                    kind: equals
                    value: ""
        "#};
        let cases = parse_generated_cases(response).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "edge-case-1");
    }

    #[test]
    fn strips_fenced_yaml() {
        let response = "```yaml\n- name: a\n  input: []\n  evaluation_targets: []\n```";
        assert_eq!(strip_code_fences(response), "- name: a\n  input: []\n  evaluation_targets: []");
    }

    #[test]
    fn rejects_malformed_response() {
        let err = parse_generated_cases("not yaml: [").unwrap_err();
        assert!(matches!(err, KaizenError::LlmProvider(_)));
    }
}
