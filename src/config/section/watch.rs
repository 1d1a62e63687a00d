//! `[watch]` section configuration.
//!
//! ```toml
//! [watch]
//! patterns = ["*.rs", "*.toml", "*.html"]   # changes that rebuild
//! regex = '\.(go|html)$'                    # alternative to `patterns`
//! reload = ["*.css", "*.js"]                # changes that only reload browsers
//! ignore = ["target", "node_modules"]       # directories never watched
//! debounce_ms = 500
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default quiet period before a rebuild fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// File watch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Glob list over base names; a match triggers a rebuild.
    pub patterns: Vec<String>,

    /// Regular expression over base names; used instead of `patterns` when set.
    pub regex: Option<String>,

    /// Glob list over base names; a match only reloads connected browsers.
    pub reload: Vec<String>,

    /// Directory names that are never watched (hidden ones are always skipped).
    pub ignore: Vec<String>,

    /// Quiet period in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                "*.rs".into(),
                "*.toml".into(),
                "*.html".into(),
                "*.tmpl".into(),
            ],
            regex: None,
            reload: Vec::new(),
            ignore: vec!["target".into(), "node_modules".into()],
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
