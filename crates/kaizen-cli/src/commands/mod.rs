//! CLI command handlers (spec §6). Each function owns argument validation
//! and config overrides for one subcommand and wires the flags into
//! `kaizen_core`; `main.rs` only parses `clap` arguments and maps the
//! terminal result to an exit code.

pub mod analyze_logs;
pub mod augment;
pub mod fix_tests;
pub mod setup;
pub mod test_all;

use std::collections::HashSet;
use std::process::ExitCode;

use kaizen_core::config::{Config, PrStrategy};
use kaizen_core::error::KaizenError;

/// Maps a terminal error to the exit code scheme of §6: configuration and
/// environment problems abort before any test runs (1); git/hosting
/// failures are reported but don't invalidate the on-disk result (4);
/// anything else is unexpected (255).
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<KaizenError>() {
        Some(KaizenError::Configuration(_)) | Some(KaizenError::Environment(_)) | Some(KaizenError::EntryPoint(_)) => ExitCode::from(1),
        Some(KaizenError::Git(_)) | Some(KaizenError::Hosting(_)) => ExitCode::from(4),
        _ => ExitCode::from(255),
    }
}

/// `ALL_PASSING` / `ANY_IMPROVEMENT` / `NONE`, case-insensitively, as
/// accepted by `--pr-strategy` (spec §6).
pub fn parse_pr_strategy(raw: &str) -> anyhow::Result<PrStrategy> {
    match raw.to_uppercase().as_str() {
        "ALL_PASSING" => Ok(PrStrategy::AllPassing),
        "ANY_IMPROVEMENT" => Ok(PrStrategy::AnyImprovement),
        "NONE" => Ok(PrStrategy::None),
        other => Err(KaizenError::Configuration(format!("unknown pr_strategy: {other}")).into()),
    }
}

/// Every tracked-variable name referenced by the config's evaluation
/// targets, deduplicated, for `ExecutionEngine::new` (spec §4.3 "tracked
/// variables").
pub fn tracked_variables(config: &Config) -> Vec<String> {
    let mut names = HashSet::new();
    for step in &config.steps {
        for target in &step.evaluation_targets {
            if let Some(name) = &target.variable_name {
                names.insert(name.clone());
            }
        }
    }
    names.into_iter().collect()
}

/// `test-results/<name>-<timestamp>.txt` and `test-logs/<name>-<timestamp>.json`,
/// rooted at the current working directory (spec §6 "persisted state").
pub fn report_paths(config: &Config) -> (std::path::PathBuf, std::path::PathBuf) {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let slug = config.name.replace(' ', "_");
    (
        std::path::PathBuf::from("test-results").join(format!("{slug}-{stamp}.txt")),
        std::path::PathBuf::from("test-logs").join(format!("{slug}-{stamp}.json")),
    )
}

/// Write both persisted artifacts, creating their parent directories.
pub fn write_reports(config: &Config, history: &kaizen_core::model::TestExecutionHistory) -> anyhow::Result<()> {
    let (text_path, json_path) = report_paths(config);
    for path in [&text_path, &json_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = kaizen_core::report::ReportWriter::new(history);
    writer.write_text_report(&text_path)?;
    writer.write_json_log(&json_path)?;
    tracing::info!(text = %text_path.display(), json = %json_path.display(), "wrote test reports");
    Ok(())
}
