use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{KaizenError, KaizenResult};

/// Owns an ephemeral staging area populated with byte-exact copies of every
/// file an attempt may modify (spec §4.10). `restore()` copies snapshots
/// back over the originals; `commit()` discards snapshots after a
/// successful attempt. The staging area is removed on drop regardless of
/// outcome, so a panicked or early-returning attempt never leaks a dangling
/// backup directory.
pub struct StateManager {
    staging_dir: tempfile::TempDir,
    snapshots: HashMap<PathBuf, PathBuf>,
}

impl StateManager {
    /// Snapshot every file in `files` into a fresh temp directory.
    pub fn snapshot(files: &[PathBuf]) -> KaizenResult<Self> {
        let staging_dir = tempfile::tempdir().map_err(|source| KaizenError::Filesystem {
            path: std::env::temp_dir(),
            source,
        })?;

        let mut snapshots = HashMap::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            let backup_path = staging_dir.path().join(format!("{index}.bak"));
            std::fs::copy(path, &backup_path).map_err(|source| KaizenError::Filesystem { path: path.clone(), source })?;
            snapshots.insert(path.clone(), backup_path);
        }

        Ok(Self { staging_dir, snapshots })
    }

    /// Byte-exact contents of each snapshotted file, for `FixAttempt.original_code`.
    pub fn original_contents(&self) -> KaizenResult<HashMap<PathBuf, String>> {
        self.snapshots
            .iter()
            .map(|(original, backup)| {
                std::fs::read_to_string(backup)
                    .map(|contents| (original.clone(), contents))
                    .map_err(|source| KaizenError::Filesystem { path: original.clone(), source })
            })
            .collect()
    }

    /// Copy every snapshot back over its original path (spec invariant I1).
    pub fn restore(&self) -> KaizenResult<()> {
        for (original, backup) in &self.snapshots {
            std::fs::copy(backup, original).map_err(|source| KaizenError::Filesystem { path: original.clone(), source })?;
        }
        Ok(())
    }

    /// Restore a single file, leaving the rest of the snapshot intact —
    /// used when only one file in a multi-file attempt needs rolling back.
    pub fn restore_one(&self, path: &Path) -> KaizenResult<()> {
        let backup = self
            .snapshots
            .get(path)
            .ok_or_else(|| KaizenError::Filesystem { path: path.to_path_buf(), source: std::io::Error::new(std::io::ErrorKind::NotFound, "not snapshotted") })?;
        std::fs::copy(backup, path).map_err(|source| KaizenError::Filesystem { path: path.to_path_buf(), source })?;
        Ok(())
    }

    /// No-op beyond documenting intent: the staging directory is reclaimed
    /// on drop either way. Kept as an explicit call site so orchestrator
    /// code reads the same way the spec describes the contract.
    pub fn commit(self) {
        drop(self);
    }

    #[cfg(test)]
    fn staging_path(&self) -> &Path {
        self.staging_dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn restore_reverts_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("agent.py");
        write_file(&target, "original");

        let manager = StateManager::snapshot(&[target.clone()]).unwrap();
        write_file(&target, "mutated by the fixer");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "mutated by the fixer");

        manager.restore().unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn original_contents_matches_pre_snapshot_state() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("agent.py");
        write_file(&target, "def run(): pass");

        let manager = StateManager::snapshot(&[target.clone()]).unwrap();
        let originals = manager.original_contents().unwrap();
        assert_eq!(originals.get(&target).unwrap(), "def run(): pass");
    }

    #[test]
    fn staging_dir_removed_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("agent.py");
        write_file(&target, "x");

        let manager = StateManager::snapshot(&[target.clone()]).unwrap();
        let staging = manager.staging_path().to_path_buf();
        assert!(staging.exists());
        drop(manager);
        assert!(!staging.exists());
    }
}
