use serde::{Deserialize, Serialize};

use super::input::{EvaluationTarget, InputDefinition};

/// An assertion rule attached directly to a case (in addition to the
/// per-target evaluation rubrics), kept for parity with `steps[].assert`
/// in the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionRule {
    pub description: String,
    pub criteria: super::input::Criteria,
}

/// Declarative test case: name, ordered inputs, optional literal expected
/// output, assertion rules, and evaluation targets. Immutable after load
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    pub input: Vec<InputDefinition>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub assertions: Vec<AssertionRule>,
    pub evaluation_targets: Vec<EvaluationTarget>,
}
