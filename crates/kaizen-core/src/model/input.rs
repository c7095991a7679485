use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One positional argument definition for a test case (spec §3,
/// "Input definition"). Immutable once loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputDefinition {
    String { value: String },
    Number { value: f64 },
    Bool { value: bool },
    List { value: Vec<serde_json::Value> },
    Map { value: HashMap<String, serde_json::Value> },

    /// Construct `class_path(**value)`.
    Object {
        class_path: String,
        value: HashMap<String, serde_json::Value>,
    },

    /// Either import a class by path, or deserialize a previously
    /// persisted (pickled) instance from `pickle_path`.
    ClassObject {
        import_path: Option<String>,
        pickle_path: Option<PathBuf>,
    },

    /// Default-construct `class_path()` then assign each attribute in
    /// `attributes` post-construction.
    InlineObject {
        class_path: String,
        attributes: HashMap<String, serde_json::Value>,
    },
}

impl InputDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            InputDefinition::String { .. } => "string",
            InputDefinition::Number { .. } => "number",
            InputDefinition::Bool { .. } => "bool",
            InputDefinition::List { .. } => "list",
            InputDefinition::Map { .. } => "map",
            InputDefinition::Object { .. } => "object",
            InputDefinition::ClassObject { .. } => "class_object",
            InputDefinition::InlineObject { .. } => "inline_object",
        }
    }
}

/// Where an evaluation target's observed value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    Return,
    Variable,
}

/// A named (source, criteria, weight) rubric applied to a case (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTarget {
    pub name: String,
    pub source: EvaluationSource,
    /// When `source == Variable`, the tracked-attribute name to read.
    #[serde(default)]
    pub variable_name: Option<String>,
    pub criteria: Criteria,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Deterministic rules are the fast path; `Llm` dispatches to the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criteria {
    Equals { value: String },
    Contains { value: String },
    Regex { pattern: String },
    Type { expected: String },
    Llm { rubric: String },
}
