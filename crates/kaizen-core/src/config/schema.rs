use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::TestCase;

/// `{module, class?, method?, fallback_to_function}` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntryPointConfig {
    pub module: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default = "default_true")]
    pub fallback_to_function: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub evaluation_targets: Vec<crate::model::EvaluationTarget>,
}

/// `pr_strategy` policy (spec §6, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrStrategy {
    #[default]
    AllPassing,
    AnyImprovement,
    None,
}

/// The YAML configuration file (spec §6). `file_path` and any path inside
/// `referenced_files`/`files_to_fix` are resolved relative to the
/// directory containing the config file by `Config::load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub file_path: PathBuf,
    pub agent: AgentEntryPointConfig,
    pub evaluation: EvaluationConfig,
    pub steps: Vec<TestCase>,

    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub referenced_files: Vec<PathBuf>,
    #[serde(default)]
    pub files_to_fix: Vec<PathBuf>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub create_pr: bool,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub pr_strategy: PrStrategy,
    #[serde(default)]
    pub better_ai: bool,

    /// The directory the config file lives in; populated by `load`, not
    /// present in the YAML itself.
    #[serde(skip, default)]
    pub config_dir: PathBuf,
    #[serde(skip, default)]
    pub config_path: PathBuf,
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_branch() -> String {
    "main".to_string()
}
