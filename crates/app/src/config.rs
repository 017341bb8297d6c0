use serde::{Deserialize, Serialize};
use spendiq_core::CategorySet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::CommitPolicy;

pub const CONFIG_FILE_NAME: &str = "spendiq.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Could not determine a data directory for this platform")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Relative to `data_dir` unless absolute.
    pub database_file: PathBuf,
    /// Defaults to `<data_dir>/cache`.
    pub cache_dir: Option<PathBuf>,
    pub log_filter: String,
    /// Categories new users start with; empty means the built-in list.
    pub default_categories: Vec<String>,
    pub commit_policy: CommitPolicy,
    /// Optional TOML file of `[[rules]]` replacing the built-in categorization rules.
    pub rules_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: PathBuf::from("spendiq.db"),
            cache_dir: None,
            log_filter: "info".to_string(),
            default_categories: Vec::new(),
            commit_policy: CommitPolicy::default(),
            rules_file: None,
        }
    }
}

impl AppConfig {
    /// Reads `explicit`, or `spendiq.toml` in the platform data directory.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = platform_data_dir()?.join(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => platform_data_dir(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(&self.database_file))
    }

    pub fn cache_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.data_dir()?.join("cache")),
        }
    }

    pub fn default_category_set(&self) -> CategorySet {
        if self.default_categories.is_empty() {
            CategorySet::defaults()
        } else {
            CategorySet::from_names(&self.default_categories)
        }
    }
}

fn platform_data_dir() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("com", "spendiq", "Spendiq")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}
