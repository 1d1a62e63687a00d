//! Setup errors: everything that stops the dev loop before it runs.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::actor::fs::WatchError;
use crate::config::ConfigError;

/// Unrecoverable startup failure; the process exits with code 1.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no buildable project in `{}` (expected Cargo.toml with [package] or devloop.toml with build.command)", .0.display())]
    NotBuildable(PathBuf),

    #[error("`{0}` not found on PATH")]
    MissingToolchain(String),

    #[error("cannot bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
