use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use std::fs;
use crate::engine::PollingOptions;

/// Environment variable overriding `storage.db_path`.
pub const DB_PATH_ENV: &str = "VIDGEN_DB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String { common::DEFAULT_API_BASE_URL.to_string() }
fn default_timeout_secs() -> u64 { 30 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PollingConfig {
    /// Unset means failed checks are retried indefinitely.
    #[serde(default)]
    pub max_recovery_attempts: Option<u32>,
}

impl PollingConfig {
    pub fn options(&self) -> PollingOptions {
        PollingOptions { max_recovery_attempts: self.max_recovery_attempts }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf { PathBuf::from(common::DEFAULT_DB_PATH) }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Loads `path` if given, else `vidgen.yaml` when present, else defaults.
    /// `VIDGEN_DB` overrides the database path either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(common::DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.storage.db_path = PathBuf::from(db_path);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, common::DEFAULT_API_BASE_URL);
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.polling.options(), PollingOptions::default());
        assert_eq!(config.storage.db_path, PathBuf::from("vidgen.db"));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_yaml() {
        let (_dir, path) = write_config(
            "vidgen.yaml",
            "polling:\n  max_recovery_attempts: 12\nlogging:\n  level: debug\n",
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.polling.max_recovery_attempts, Some(12));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_toml() {
        let (_dir, path) = write_config(
            "vidgen.toml",
            "[api]\nbase_url = \"http://localhost:8080\"\ntimeout_secs = 5\n\n[storage]\ndb_path = \"/tmp/v.db\"\n",
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/v.db"));
        assert_eq!(config.polling.max_recovery_attempts, None);
    }

    #[test]
    fn test_unsupported_extension() {
        let (_dir, path) = write_config("vidgen.json", "{}");
        assert!(Config::from_file(&path).is_err());
    }
}
