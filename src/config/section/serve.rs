//! `[serve]` section configuration.
//!
//! ```toml
//! [serve]
//! port = 5000                 # Port for /livereload and /livereload.js
//! ```

use serde::{Deserialize, Serialize};

/// Default port of the live reload hub.
pub const DEFAULT_PORT: u16 = 5000;

/// Live reload server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// TCP port the hub listens on (127.0.0.1).
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}
