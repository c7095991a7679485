use std::path::Path;
use std::process::ExitCode;

use kaizen_core::config::EnvDiscovery;

/// `setup check-env` and `setup create-env-example` (spec §6). Grounded in
/// `test_env_setup.py`/`test_env_loading.py`'s environment preflight and
/// `.env.example` scaffolding, reduced here to the two variables this
/// implementation actually consults (`GOOGLE_API_KEY`, `GITHUB_TOKEN`).
const ENV_TEMPLATE: &str = indoc::indoc! {r#"
    # Required for test evaluation and LLM-guided repair.
    GOOGLE_API_KEY=

    # Required only when create_pr / --create-pr / --make-pr is used.
    GITHUB_TOKEN=

    # Optional overrides.
    KAIZEN_CLI_MODEL=
"#};

/// `setup check-env [--create-pr]`: reports which required environment
/// variables are missing, given whether the intended run will create a PR.
pub fn check_env(create_pr: bool) -> anyhow::Result<ExitCode> {
    let missing = EnvDiscovery::check(create_pr);
    if missing.is_empty() {
        println!("All required environment variables are set.");
        Ok(ExitCode::from(0))
    } else {
        println!("Missing required environment variable(s): {}", missing.join(", "));
        Ok(ExitCode::from(1))
    }
}

/// `setup create-env-example [--out path]`: scaffold a `.env.example`
/// listing every variable this implementation reads from the environment.
/// Refuses to overwrite an existing file.
pub fn create_env_example(out: &Path) -> anyhow::Result<ExitCode> {
    if out.exists() {
        println!("{} already exists; leaving it untouched.", out.display());
        return Ok(ExitCode::from(0));
    }
    std::fs::write(out, ENV_TEMPLATE)?;
    println!("Wrote {}", out.display());
    Ok(ExitCode::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn check_env_succeeds_when_satisfied() {
        let prev = std::env::var("GOOGLE_API_KEY").ok();
        std::env::set_var("GOOGLE_API_KEY", "key");
        assert!(check_env(false).is_ok());
        match prev {
            Some(v) => std::env::set_var("GOOGLE_API_KEY", v),
            None => std::env::remove_var("GOOGLE_API_KEY"),
        }
    }

    #[test]
    fn create_env_example_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.example");
        assert!(create_env_example(&path).is_ok());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn create_env_example_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.example");
        std::fs::write(&path, "EXISTING=1\n").unwrap();
        create_env_example(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "EXISTING=1\n");
    }
}
