//! User configuration loaded from `~/.relay/config.yaml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{CONFIG_DIR_NAME, DEFAULT_LOG_FILE, DEFAULT_MAX_HISTORY, DEFAULT_TIMEOUT_SECS};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timeout_secs: u64,
    pub max_history: usize,
    pub log_file: String,
    /// Environment selected at startup
    pub default_environment: Option<String>,
    /// Baseline row for compare runs; falls back to the active environment
    pub compare_baseline: Option<String>,
    /// Environments a compare run targets; empty means all loaded ones
    pub compare_environments: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_history: DEFAULT_MAX_HISTORY,
            log_file: DEFAULT_LOG_FILE.to_string(),
            default_environment: None,
            compare_baseline: None,
            compare_environments: Vec::new(),
        }
    }
}

impl Config {
    /// `~/.relay`, or `./.relay` without a home directory
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load `config.yaml` from `dir`, using defaults when it is missing or
    /// does not parse
    pub fn load(dir: &Path) -> Config {
        let path = dir.join("config.yaml");
        if !path.exists() {
            return Config::default();
        }
        match Config::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "invalid config, using defaults");
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "timeout_secs: 5\ncompare_baseline: prod\n").unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.compare_baseline.as_deref(), Some("prod"));
        assert_eq!(config.max_history, DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "timeout_secs: [").unwrap();
        assert_eq!(Config::load(dir.path()), Config::default());
        assert!(Config::load_from(&dir.path().join("config.yaml")).is_err());
    }
}
