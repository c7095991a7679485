use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KaizenError, KaizenResult};

/// Result of one git operation, kept for audit purposes (spec §4.12: the
/// Git working tree is owned by C12 during PR composition and every step
/// — branch checkout, add, commit, push, restore of the original branch —
/// is worth recording if something later goes wrong).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOpResult {
    pub success: bool,
    pub description: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
}

impl GitOpResult {
    pub fn ok(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self { success: true, description: description.into(), command: command.into(), timestamp: Utc::now() }
    }

    pub fn fail(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self { success: false, description: description.into(), command: command.into(), timestamp: Utc::now() }
    }
}

/// Abstracts the subprocess boundary so the composer's branch/commit/push
/// sequence can be driven against a mock in tests (spec §5: "the Git
/// working tree is owned by C12 ... for the duration of PR composition").
pub trait GitExecutor: Send + Sync {
    fn execute(&self, args: &[&str], cwd: &Path) -> KaizenResult<String>;
}

pub struct RealGitExecutor;

impl GitExecutor for RealGitExecutor {
    fn execute(&self, args: &[&str], cwd: &Path) -> KaizenResult<String> {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| KaizenError::Filesystem { path: cwd.to_path_buf(), source })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(KaizenError::Git(format!("git {} failed: {stderr}", args.join(" "))))
        }
    }
}

/// Branch/commit/push operations over a `GitExecutor`, with a run log for
/// the composer to fold into its report on `GitError` (spec §7).
pub struct GitOps<'a> {
    repo_path: PathBuf,
    executor: &'a dyn GitExecutor,
    history: Vec<GitOpResult>,
}

impl<'a> GitOps<'a> {
    pub fn new(repo_path: PathBuf, executor: &'a dyn GitExecutor) -> Self {
        Self { repo_path, executor, history: Vec::new() }
    }

    pub fn current_branch(&self) -> KaizenResult<String> {
        self.executor.execute(&["rev-parse", "--abbrev-ref", "HEAD"], &self.repo_path)
    }

    pub fn create_branch(&mut self, name: &str, base: &str) -> KaizenResult<()> {
        let cmd = format!("git checkout -b {name} {base}");
        match self.executor.execute(&["checkout", "-b", name, base], &self.repo_path) {
            Ok(_) => {
                self.history.push(GitOpResult::ok(format!("created branch '{name}' from '{base}'"), cmd));
                Ok(())
            }
            Err(e) => {
                self.history.push(GitOpResult::fail(e.to_string(), cmd));
                Err(e)
            }
        }
    }

    pub fn stage(&mut self, paths: &[PathBuf]) -> KaizenResult<()> {
        let args: Vec<&str> = std::iter::once("add").chain(paths.iter().map(|p| p.to_str().unwrap_or(""))).collect();
        let cmd = format!("git {}", args.join(" "));
        match self.executor.execute(&args, &self.repo_path) {
            Ok(_) => {
                self.history.push(GitOpResult::ok(format!("staged {} file(s)", paths.len()), cmd));
                Ok(())
            }
            Err(e) => {
                self.history.push(GitOpResult::fail(e.to_string(), cmd));
                Err(e)
            }
        }
    }

    pub fn commit(&mut self, message: &str) -> KaizenResult<()> {
        let cmd = format!("git commit -m {message:?}");
        match self.executor.execute(&["commit", "-m", message], &self.repo_path) {
            Ok(_) => {
                self.history.push(GitOpResult::ok("committed staged changes", cmd));
                Ok(())
            }
            Err(e) => {
                self.history.push(GitOpResult::fail(e.to_string(), cmd));
                Err(e)
            }
        }
    }

    pub fn push(&mut self, branch: &str) -> KaizenResult<()> {
        let cmd = format!("git push -u origin {branch}");
        match self.executor.execute(&["push", "-u", "origin", branch], &self.repo_path) {
            Ok(_) => {
                self.history.push(GitOpResult::ok(format!("pushed '{branch}' to origin"), cmd));
                Ok(())
            }
            Err(e) => {
                self.history.push(GitOpResult::fail(e.to_string(), cmd));
                Err(e)
            }
        }
    }

    pub fn checkout(&mut self, branch: &str) -> KaizenResult<()> {
        let cmd = format!("git checkout {branch}");
        match self.executor.execute(&["checkout", branch], &self.repo_path) {
            Ok(_) => {
                self.history.push(GitOpResult::ok(format!("checked out '{branch}'"), cmd));
                Ok(())
            }
            Err(e) => {
                self.history.push(GitOpResult::fail(e.to_string(), cmd));
                Err(e)
            }
        }
    }

    pub fn remote_url(&self, remote: &str) -> KaizenResult<String> {
        self.executor.execute(&["remote", "get-url", remote], &self.repo_path)
    }

    pub fn history(&self) -> &[GitOpResult] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockExecutor {
        responses: Mutex<Vec<KaizenResult<String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn new(responses: Vec<KaizenResult<String>>) -> Self {
            Self { responses: Mutex::new(responses), calls: Mutex::new(Vec::new()) }
        }
    }

    impl GitExecutor for MockExecutor {
        fn execute(&self, args: &[&str], _cwd: &Path) -> KaizenResult<String> {
            self.calls.lock().unwrap().push(args.join(" "));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(KaizenError::Git("no more mock responses".into()));
            }
            responses.remove(0)
        }
    }

    #[test]
    fn create_branch_records_success() {
        let executor = MockExecutor::new(vec![Ok(String::new())]);
        let mut ops = GitOps::new(PathBuf::from("/tmp/repo"), &executor);
        ops.create_branch("autofix-1", "main").unwrap();
        assert_eq!(executor.calls.lock().unwrap()[0], "checkout -b autofix-1 main");
        assert!(ops.history()[0].success);
    }

    #[test]
    fn push_failure_is_recorded_and_propagated() {
        let executor = MockExecutor::new(vec![Err(KaizenError::Git("no upstream".into()))]);
        let mut ops = GitOps::new(PathBuf::from("/tmp/repo"), &executor);
        let result = ops.push("autofix-1");
        assert!(result.is_err());
        assert!(!ops.history()[0].success);
    }
}
