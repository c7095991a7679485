use std::path::Path;

use crate::error::{KaizenError, KaizenResult};

use super::schema::Config;
use super::validate;

impl Config {
    /// Load and validate a configuration file. `file_path` and every path
    /// in `referenced_files`/`files_to_fix` are resolved relative to the
    /// config file's directory (spec §6).
    pub fn load(config_path: impl AsRef<Path>) -> KaizenResult<Config> {
        let config_path = config_path.as_ref();
        let raw = std::fs::read_to_string(config_path).map_err(|source| KaizenError::Filesystem {
            path: config_path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, config_path)
    }

    /// Parse and validate an already-read YAML document, resolving
    /// relative paths against `config_path`'s directory. Split from
    /// `load` so tests can exercise parsing without touching disk.
    pub fn parse(raw: &str, config_path: &Path) -> KaizenResult<Config> {
        let mut config: Config = serde_yaml::from_str(raw)
            .map_err(|e| KaizenError::Configuration(format!("invalid YAML in {}: {e}", config_path.display())))?;

        let config_dir = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| Path::new(".").to_path_buf());

        config.config_path = config_path.to_path_buf();
        config.file_path = resolve(&config_dir, &config.file_path);
        config.referenced_files = config.referenced_files.iter().map(|p| resolve(&config_dir, p)).collect();
        config.files_to_fix = config.files_to_fix.iter().map(|p| resolve(&config_dir, p)).collect();
        config.config_dir = config_dir;

        validate::validate(&config)?;
        Ok(config)
    }
}

fn resolve(base: &Path, candidate: &Path) -> std::path::PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
