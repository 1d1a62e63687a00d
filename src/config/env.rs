//! `.env` file in the project root.
//!
//! Format: `KEY=value` per line, `#` starts a comment line, an optional
//! `export ` prefix is accepted, and values may be wrapped in single or
//! double quotes. Malformed lines are skipped.

use std::fs;
use std::path::Path;

use super::ConfigError;

/// File name looked up in the project root.
pub const DOTENV_FILE: &str = ".env";

/// Parsed `.env` pairs, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotEnv {
    vars: Vec<(String, String)>,
}

impl DotEnv {
    /// Load `<root>/.env`. A missing file yields an empty set.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(DOTENV_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(path, e)),
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut vars: Vec<(String, String)> = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                continue;
            }

            let value = unquote(value.trim()).to_string();
            // Later assignments win, keeping the first position.
            match vars.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => vars.push((key.to_string(), value)),
            }
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `DEBUG` is truthy: enables the hub and script injection.
    pub fn debug(&self) -> bool {
        self.get("DEBUG").is_some_and(is_truthy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// `1`, `true`, `yes`, `on` in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    // Unquoted values may carry a trailing ` # comment`.
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end(),
        None => value,
    }
}
