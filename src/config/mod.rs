//! Project configuration.
//!
//! Sources, highest precedence first:
//! 1. CLI flags (`--port`)
//! 2. `devloop.toml` in the project root (optional)
//! 3. built-in defaults
//!
//! The project's `.env` is loaded alongside; `DEBUG` there switches the
//! live reload hub and script injection on or off.
//!
//! | Section   | Purpose                                   |
//! |-----------|-------------------------------------------|
//! | `[build]` | Custom build command, cargo bin target    |
//! | `[watch]` | Patterns, reload-only patterns, debounce  |
//! | `[serve]` | Hub port                                  |

mod env;
mod error;
pub mod section;

pub use env::{DOTENV_FILE, DotEnv, is_truthy};
pub use error::ConfigError;
pub use section::{BuildConfig, ServeConfig, WatchConfig};

use crate::log;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "devloop.toml";

/// Root configuration structure representing devloop.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevConfig {
    /// Absolute project root (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// `.env` pairs of the project (internal use only)
    #[serde(skip)]
    pub env: DotEnv,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl DevConfig {
    /// Load `devloop.toml` (if present) and `.env` from an absolute root.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);

        let mut config = if path.is_file() {
            Self::from_path(&path)?
        } else {
            Self::default()
        };

        config.root = root.to_path_buf();
        config.env = DotEnv::load(root)?;
        config.validate()?;
        Ok(config)
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            log!("warning"; "unknown fields in {}: {}", CONFIG_FILE, ignored.join(", "));
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be greater than 0".into(),
            ));
        }
        if let Some(re) = &self.watch.regex {
            Regex::new(re).map_err(|e| {
                ConfigError::Validation(format!("watch.regex is not a valid expression: {e}"))
            })?;
        }
        if !self.build.command.is_empty() && !self.build.has_command() {
            return Err(ConfigError::Validation(
                "build.command must start with a program name".into(),
            ));
        }
        Ok(())
    }

    /// Apply the `--port` flag.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.serve.port = port;
        }
        self
    }

    /// Live reload (hub + injection) is enabled by `DEBUG` in `.env`.
    pub fn debug(&self) -> bool {
        self.env.debug()
    }
}

#[cfg(test)]
pub fn test_parse_config(content: &str) -> DevConfig {
    let (parsed, ignored) = DevConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
