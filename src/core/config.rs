use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::plugin::index::DEFAULT_INDEX_URL;
use crate::utils::io;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_MIGRATION_FILE: &str = "migration.yml";

/// Root configuration structure for config.yml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RollerConfig {
    #[serde(default)]
    pub global: GlobalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub plugin: PluginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// `default`, `text` or `json`.
    #[serde(default = "default_formatter")]
    pub formatter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            formatter: default_formatter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfig {
    /// Directory scanned for plugin executables at startup.
    #[serde(default = "default_plugin_path")]
    pub plugin_path: String,

    /// Cache directory for the downloaded plugin index.
    #[serde(default = "default_plugin_repo_path")]
    pub plugin_repo_path: String,

    #[serde(default = "default_repo")]
    pub default_repo: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_path: default_plugin_path(),
            plugin_repo_path: default_plugin_repo_path(),
            default_repo: default_repo(),
        }
    }
}

impl PluginConfig {
    pub fn plugin_dir(&self) -> PathBuf {
        expand(&self.plugin_path)
    }

    pub fn repo_dir(&self) -> PathBuf {
        expand(&self.plugin_repo_path)
    }
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_formatter() -> String {
    "default".to_string()
}

fn default_plugin_path() -> String {
    "./plugins".to_string()
}

fn default_plugin_repo_path() -> String {
    "./repos".to_string()
}

fn default_repo() -> String {
    DEFAULT_INDEX_URL.to_string()
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

impl RollerConfig {
    /// An explicit path must exist. Without one, `./config.yml` is used when
    /// present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(&expand(&path.to_string_lossy())),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = io::read_file(path, &format!("read config {}", path.display()))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(content)
            .map_err(|e| Error::config_invalid_yaml(path.display().to_string(), e.to_string()))?;

        if config.global.plugin.default_repo.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "global.plugin.default_repo",
                None,
                "plugin index URL cannot be empty",
            ));
        }
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self)
            .map_err(|e| Error::internal_unexpected(format!("serialize config: {}", e)))
    }
}
