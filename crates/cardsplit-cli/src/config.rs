//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cardsplit_partition::ExistingFilePolicy;
use serde::Deserialize;

/// Global configuration for cardsplit
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub partition: PartitionConfig,
    pub http: HttpConfig,
    /// File this configuration was read from (`None` = defaults)
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub url: String,
    /// Name of the downloaded export inside `tmp_dir`
    pub file_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://directory.peppol.eu/export/businesscards".to_string(),
            file_name: "directory-export-business-cards.xml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub tmp_dir: PathBuf,
    pub log_dir: PathBuf,
    pub extracts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tmp_dir: PathBuf::from("tmp"),
            log_dir: PathBuf::from("log"),
            extracts_dir: PathBuf::from("extracts"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub prefix: String,
    pub record_tag: String,
    #[serde(deserialize_with = "deserialize_policy")]
    pub existing: ExistingFilePolicy,
    pub max_open_files: Option<usize>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        let defaults = cardsplit_partition::Config::default();
        Self {
            prefix: defaults.prefix,
            record_tag: defaults.record_tag,
            existing: defaults.existing,
            max_open_files: defaults.max_open_files,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds without data before a download is considered stalled
    pub read_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let defaults = cardsplit_core::HttpConfig::default();
        Self {
            read_timeout: defaults.read_timeout.as_secs(),
            max_retries: defaults.max_retries,
        }
    }
}

fn deserialize_policy<'de, D>(deserializer: D) -> Result<ExistingFilePolicy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Deserialize a string that may be an environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    expand_env_var(&s).ok_or_else(|| serde::de::Error::custom(format!("{s} is not set")))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./cardsplit.toml (current directory)
    /// 2. ~/.config/cardsplit/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("cardsplit.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "cardsplit") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.loaded_from = Some(path.to_path_buf());
        Ok(config)
    }
}
