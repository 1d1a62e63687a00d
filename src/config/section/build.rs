//! `[build]` section configuration.
//!
//! ```toml
//! [build]
//! command = ["go", "build", "-o", "$DEVLOOP_OUTPUT", "."]
//! bin = "server"
//! ```
//!
//! Without `command`, the project must be a cargo package and is built with
//! `cargo build --bin <bin>`.

use serde::{Deserialize, Serialize};

/// Build command settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Custom build command. `$DEVLOOP_OUTPUT` and `$DEVLOOP_ROOT` are
    /// substituted in every argument.
    pub command: Vec<String>,

    /// Cargo binary target to build (default: first `[[bin]]`, else package name).
    pub bin: Option<String>,
}

impl BuildConfig {
    /// A custom command is configured.
    pub fn has_command(&self) -> bool {
        self.command.first().is_some_and(|p| !p.trim().is_empty())
    }
}
