use std::path::Path;
use std::process::ExitCode;

use kaizen_core::error::KaizenError;

/// `analyze-logs <log-file>` (spec §6). Reads a persisted
/// `test-logs/*.json` report (written by `kaizen_core::report::ReportWriter`)
/// and prints a human-readable summary — a thin reader over C6's
/// serialized form, grounded in `report_writer.py`/`formatters.py`'s
/// console summary.
pub fn run(log_file: &Path) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(log_file).map_err(|source| KaizenError::Filesystem { path: log_file.to_path_buf(), source })?;
    let log: serde_json::Value = serde_json::from_str(&raw).map_err(|e| KaizenError::Configuration(format!("not a valid test log: {e}")))?;

    print_run("Baseline", log.get("baseline"));
    if let Some(attempts) = log.get("attempts").and_then(|a| a.as_array()) {
        for (i, attempt) in attempts.iter().enumerate() {
            print_run(&format!("Attempt {}", i + 1), Some(attempt));
        }
    }

    let best_passed = log.get("best_passed").and_then(|v| v.as_u64()).unwrap_or(0);
    let best_total = log.get("best_total").and_then(|v| v.as_u64()).unwrap_or(0);
    println!("\nBest result: {best_passed}/{best_total} passed");

    Ok(ExitCode::from(0))
}

fn print_run(label: &str, run: Option<&serde_json::Value>) {
    let Some(run) = run else { return };
    let status = run.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
    let passed = run.get("passed").and_then(|v| v.as_u64()).unwrap_or(0);
    let total = run.get("total").and_then(|v| v.as_u64()).unwrap_or(0);
    println!("{label}: {status} ({passed}/{total} passed)");

    if let Some(cases) = run.get("cases").and_then(|c| c.as_array()) {
        for case in cases {
            let name = case.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let status = case.get("status").and_then(|v| v.as_str()).unwrap_or("?");
            if status != "passed" {
                let error = case.get("error_message").and_then(|v| v.as_str()).unwrap_or("no error message");
                println!("  - {name}: {status} ({error})");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_summarizes_a_json_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "baseline": {"run_type": "baseline", "status": "failed", "passed": 1, "total": 2, "cases": [
                    {"name": "case-1", "status": "passed", "error_message": null},
                    {"name": "case-2", "status": "failed", "error_message": "mismatch"},
                ]},
                "attempts": [],
                "best_passed": 1,
                "best_total": 2,
            })
            .to_string(),
        )
        .unwrap();

        assert!(run(&path).is_ok());
    }

    #[test]
    fn rejects_malformed_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(run(&path).is_err());
    }
}
