use std::collections::HashMap;

use regex::Regex;

use crate::config::ModelTier;
use crate::llm::judge::{self, JudgeStatus};
use crate::llm::LlmClient;
use crate::model::{Criteria, EvaluationSource, EvaluationTarget, TargetEvaluation, TestCase};

/// Observed values produced by the execution engine, keyed the way C4
/// selects them: `return` for the return value, tracked variable name for
/// `variable` sources (spec §4.4).
pub struct Observed {
    pub return_value: serde_json::Value,
    pub tracked_values: HashMap<String, String>,
}

/// Per-case evaluation: run every target's rubric and aggregate. Cases
/// pass iff every target passes (spec §4.4; weights are reporting-only
/// per the Open Question resolution in DESIGN.md).
pub struct Evaluator<'a> {
    client: Option<&'a LlmClient>,
    model: ModelTier,
}

impl<'a> Evaluator<'a> {
    pub fn new(client: Option<&'a LlmClient>, model: ModelTier) -> Self {
        Self { client, model }
    }

    pub async fn evaluate(&self, case: &TestCase, observed: &Observed) -> (Vec<TargetEvaluation>, f64, bool) {
        let mut evaluations = Vec::with_capacity(case.evaluation_targets.len());
        let mut weighted_score = 0.0;
        let mut weight_total = 0.0;
        let mut all_passed = true;

        for target in &case.evaluation_targets {
            let evaluation = self.evaluate_target(case, target, observed).await;
            if !evaluation.passed {
                all_passed = false;
            }
            weighted_score += evaluation.score * target.weight;
            weight_total += target.weight;
            evaluations.push(evaluation);
        }

        let score = if weight_total > 0.0 { weighted_score / weight_total } else { 0.0 };
        (evaluations, score, all_passed)
    }

    async fn evaluate_target(&self, case: &TestCase, target: &EvaluationTarget, observed: &Observed) -> TargetEvaluation {
        let value = match self.select_value(target, observed) {
            Some(v) => v,
            None => {
                return TargetEvaluation {
                    target_name: target.name.clone(),
                    passed: false,
                    score: 0.0,
                    reasoning: None,
                    error: Some(format!("tracked variable `{:?}` was not captured", target.variable_name)),
                };
            }
        };

        match &target.criteria {
            Criteria::Equals { value: expected } => deterministic(target, value == *expected),
            Criteria::Contains { value: needle } => deterministic(target, value.contains(needle.as_str())),
            Criteria::Regex { pattern } => match Regex::new(pattern) {
                Ok(re) => deterministic(target, re.is_match(&value)),
                Err(e) => TargetEvaluation {
                    target_name: target.name.clone(),
                    passed: false,
                    score: 0.0,
                    reasoning: None,
                    error: Some(format!("invalid regex `{pattern}`: {e}")),
                },
            },
            Criteria::Type { expected } => deterministic(target, type_matches(&value, expected)),
            Criteria::Llm { rubric } => self.judge_target(case, target, &value, rubric).await,
        }
    }

    fn select_value(&self, target: &EvaluationTarget, observed: &Observed) -> Option<String> {
        match target.source {
            EvaluationSource::Return => Some(json_as_text(&observed.return_value)),
            EvaluationSource::Variable => {
                let name = target.variable_name.as_deref()?;
                observed.tracked_values.get(name).cloned()
            }
        }
    }

    async fn judge_target(&self, case: &TestCase, target: &EvaluationTarget, actual: &str, rubric: &str) -> TargetEvaluation {
        let Some(client) = self.client else {
            return TargetEvaluation {
                target_name: target.name.clone(),
                passed: false,
                score: 0.0,
                reasoning: None,
                error: Some("no LLM client configured for judged evaluation".to_string()),
            };
        };
        match judge::judge(client, &self.model, &case.name, case.expected_output.as_deref(), actual, rubric).await {
            Ok(verdict) => TargetEvaluation {
                target_name: target.name.clone(),
                passed: verdict.status == JudgeStatus::Passed,
                score: verdict.confidence,
                reasoning: Some(verdict.reasoning),
                error: None,
            },
            Err(e) => TargetEvaluation {
                target_name: target.name.clone(),
                passed: false,
                score: 0.0,
                reasoning: None,
                error: Some(format!("judge call failed after retries: {e}")),
            },
        }
    }
}

fn deterministic(target: &EvaluationTarget, passed: bool) -> TargetEvaluation {
    TargetEvaluation {
        target_name: target.name.clone(),
        passed,
        score: if passed { 1.0 } else { 0.0 },
        reasoning: None,
        error: None,
    }
}

fn json_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_matches(value: &str, expected: &str) -> bool {
    match expected {
        "int" => value.parse::<i64>().is_ok(),
        "float" => value.parse::<f64>().is_ok(),
        "bool" => matches!(value, "true" | "false" | "True" | "False"),
        "str" | "string" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvaluationSource, EvaluationTarget};

    fn target(criteria: Criteria, source: EvaluationSource, variable_name: Option<&str>) -> EvaluationTarget {
        EvaluationTarget { name: "t".into(), source, variable_name: variable_name.map(String::from), criteria, weight: 1.0 }
    }

    fn case(targets: Vec<EvaluationTarget>) -> TestCase {
        TestCase { name: "case".into(), region: None, input: vec![], expected_output: None, assertions: vec![], evaluation_targets: targets }
    }

    #[tokio::test]
    async fn equals_passes_on_exact_match() {
        let evaluator = Evaluator::new(None, ModelTier::Default);
        let c = case(vec![target(Criteria::Equals { value: "HELLO".into() }, EvaluationSource::Return, None)]);
        let observed = Observed { return_value: serde_json::json!("HELLO"), tracked_values: HashMap::new() };
        let (_, _, passed) = evaluator.evaluate(&c, &observed).await;
        assert!(passed);
    }

    #[tokio::test]
    async fn missing_tracked_variable_fails_target() {
        let evaluator = Evaluator::new(None, ModelTier::Default);
        let c = case(vec![target(Criteria::Contains { value: "x".into() }, EvaluationSource::Variable, Some("missing"))]);
        let observed = Observed { return_value: serde_json::Value::Null, tracked_values: HashMap::new() };
        let (evals, _, passed) = evaluator.evaluate(&c, &observed).await;
        assert!(!passed);
        assert!(evals[0].error.is_some());
    }

    #[tokio::test]
    async fn regex_target_matches() {
        let evaluator = Evaluator::new(None, ModelTier::Default);
        let c = case(vec![target(Criteria::Regex { pattern: r"^\d+$".into() }, EvaluationSource::Return, None)]);
        let observed = Observed { return_value: serde_json::json!("42"), tracked_values: HashMap::new() };
        let (_, _, passed) = evaluator.evaluate(&c, &observed).await;
        assert!(passed);
    }
}
