//! Configuration management
//!
//! Alias table, filter tuning, view defaults and logging, persisted as TOML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{ALL_COURSES_SCOPE, DASHBOARD_SCOPE};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Reserved collection names and the system labels they resolve to
    #[serde(default = "default_aliases")]
    pub aliases: Vec<AliasEntry>,
    /// Course filter settings
    #[serde(default)]
    pub filters: FilterConfig,
    /// View settings
    #[serde(default)]
    pub views: ViewConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One reserved alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Name callers use, e.g. "favorites"
    pub alias: String,
    /// Label of the system collection it resolves to
    pub label: String,
}

impl AliasEntry {
    pub fn new(alias: &str, label: &str) -> Self {
        Self {
            alias: alias.to_string(),
            label: label.to_string(),
        }
    }
}

fn default_aliases() -> Vec<AliasEntry> {
    vec![
        AliasEntry::new("favorites", "Favorites"),
        AliasEntry::new("research", "Workspace"),
        AliasEntry::new("to_learn", "Watchlist"),
        AliasEntry::new("personal-context", "Personal Context"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Window used by the "since login" date filter
    #[serde(default = "default_since_login_days")]
    pub since_login_days: i64,
    /// Scope values that bypass the collection predicate
    #[serde(default = "default_all_courses_scopes")]
    pub all_courses_scopes: Vec<String>,
}

fn default_since_login_days() -> i64 {
    3
}

fn default_all_courses_scopes() -> Vec<String> {
    vec![ALL_COURSES_SCOPE.to_string(), DASHBOARD_SCOPE.to_string()]
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            since_login_days: default_since_login_days(),
            all_courses_scopes: default_all_courses_scopes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Scope a view falls back to when its collection is deleted
    #[serde(default = "default_scope")]
    pub default_scope: String,
}

fn default_scope() -> String {
    ALL_COURSES_SCOPE.to_string()
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_scope: default_scope(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            filters: FilterConfig::default(),
            views: ViewConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "collection-engine", "collection-engine")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
