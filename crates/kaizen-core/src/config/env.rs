use crate::error::{KaizenError, KaizenResult};

/// Model capability tier selected by the `better_ai` config flag
/// (spec §3 supplemented features; `kaizen/model_config.py`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Default,
    Better,
}

impl ModelTier {
    pub fn from_better_ai(better_ai: bool) -> Self {
        if better_ai {
            ModelTier::Better
        } else {
            ModelTier::Default
        }
    }

    /// Gemini model id for this tier, overridable by `KAIZEN_CLI_MODEL`.
    pub fn model_id(&self) -> String {
        if let Ok(model) = std::env::var("KAIZEN_CLI_MODEL") {
            if !model.is_empty() {
                return model;
            }
        }
        match self {
            ModelTier::Default => "gemini-2.5-flash-preview-05-20".to_string(),
            ModelTier::Better => "gemini-2.5-pro".to_string(),
        }
    }
}

/// Environment-variable discovery (spec §6). `GOOGLE_API_KEY` is required
/// for evaluation (LLM judge) and repair (LLM fixer); `GITHUB_TOKEN` is
/// required iff the run creates a PR.
pub struct EnvDiscovery;

impl EnvDiscovery {
    pub fn google_api_key() -> KaizenResult<String> {
        std::env::var("GOOGLE_API_KEY").map_err(|_| KaizenError::Environment("GOOGLE_API_KEY".to_string()))
    }

    pub fn github_token() -> KaizenResult<String> {
        std::env::var("GITHUB_TOKEN").map_err(|_| KaizenError::Environment("GITHUB_TOKEN".to_string()))
    }

    /// Check-env preflight for `setup check-env`: returns the set of
    /// required variables that are missing, given whether the run will
    /// create a PR.
    pub fn check(create_pr: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if std::env::var("GOOGLE_API_KEY").is_err() {
            missing.push("GOOGLE_API_KEY");
        }
        if create_pr && std::env::var("GITHUB_TOKEN").is_err() {
            missing.push("GITHUB_TOKEN");
        }
        missing
    }
}
