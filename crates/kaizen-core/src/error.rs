use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the orchestrator (spec §7). Each variant is one row
/// of the taxonomy table; the orchestrator is the only place that decides
/// between retry, rollback, and abort based on the variant it receives.
#[derive(Debug, Error)]
pub enum KaizenError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing required environment variable: {0}")]
    Environment(String),

    #[error("entry point error: {0}")]
    EntryPoint(#[from] EntryPointError),

    #[error("input materialization error at index {index}: {message}")]
    InputMaterialization { index: usize, message: String },

    #[error("user code raised an error: {0}")]
    UserCode(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("compatibility issue: {0:?}")]
    Compatibility(Vec<CompatibilityIssue>),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("hosting API error: {0}")]
    Hosting(String),

    #[error("run cancelled")]
    Cancelled,
}

impl KaizenError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KaizenError::LlmProvider(_) | KaizenError::Compatibility(_) | KaizenError::Cancelled
        )
    }
}

#[derive(Debug, Error)]
pub enum EntryPointError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("target is not callable: {0}")]
    NotCallable(String),
}

/// One compatibility issue reported by the checker (C9).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompatibilityIssue {
    pub path: PathBuf,
    pub kind: CompatibilityIssueKind,
    pub message: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompatibilityIssueKind {
    MissingSymbol,
    InvalidImport,
}

pub type KaizenResult<T> = Result<T, KaizenError>;
