//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Environment variable overriding the schema search path
pub const SCHEMA_PATH_ENV: &str = "RECDB_SCHEMA_PATH";

/// Environment variable overriding the instance search path
pub const INSTANCE_PATH_ENV: &str = "RECDB_INSTANCE_PATH";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Search paths for dataset files
    #[serde(default)]
    pub paths: PathsConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Search path settings
#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    /// Directories searched for schema (`.dbd`) files
    #[serde(default = "default_search_dirs")]
    pub schema: Vec<PathBuf>,

    /// Directories searched for instance (`.db`) files
    #[serde(default = "default_search_dirs")]
    pub instance: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            schema: default_search_dirs(),
            instance: default_search_dirs(),
        }
    }
}

fn default_search_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("db")]
}

/// Output settings
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Colorize the human-readable summary
    #[serde(default = "default_color")]
    pub color: bool,

    /// Write a JSON report of all programs to this file
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
            report: None,
        }
    }
}

fn default_color() -> bool {
    true
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist. Search path
    /// environment variables take precedence over the file.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Some(dirs) = env_path_list(SCHEMA_PATH_ENV) {
            self.paths.schema = dirs;
        }
        if let Some(dirs) = env_path_list(INSTANCE_PATH_ENV) {
            self.paths.instance = dirs;
        }
    }
}

fn env_path_list(name: &str) -> Option<Vec<PathBuf>> {
    std::env::var_os(name).map(|value| std::env::split_paths(&value).collect())
}
