use crate::error::{KaizenError, KaizenResult};

use super::schema::Config;

/// Structural validation beyond what serde's schema enforces (spec §6,
/// §7 `ConfigurationError`). Runs once, before any test executes.
pub fn validate(config: &Config) -> KaizenResult<()> {
    if config.steps.is_empty() {
        return Err(KaizenError::Configuration("`steps` must contain at least one test case".into()));
    }

    let agent = &config.agent;
    if agent.class.is_none() && agent.method.is_none() {
        return Err(KaizenError::Configuration(
            "agent entry point must specify at least one of `class` or `method`".into(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for step in &config.steps {
        if !seen.insert(step.name.clone()) {
            return Err(KaizenError::Configuration(format!("duplicate test case name: {}", step.name)));
        }
        if step.evaluation_targets.is_empty() {
            return Err(KaizenError::Configuration(format!(
                "test case `{}` has no evaluation targets",
                step.name
            )));
        }
        for target in &step.evaluation_targets {
            if target.source == crate::model::EvaluationSource::Variable && target.variable_name.is_none() {
                return Err(KaizenError::Configuration(format!(
                    "test case `{}` target `{}` has source=variable but no variable_name",
                    step.name, target.name
                )));
            }
        }
    }

    Ok(())
}
