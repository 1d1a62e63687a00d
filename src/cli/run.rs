//! `devloop run`: the developer loop against a project root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;

use crate::actor::Runner;
use crate::config::DevConfig;
use crate::core::SetupError;
use crate::log;
use crate::utils::path::normalize_path;

/// Resolve the project root: `path` or the current directory, made absolute.
pub fn resolve_root(path: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    let root = match path {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd.join(p),
        None => cwd,
    };
    let root = normalize_path(&root);

    if !root.is_dir() {
        return Err(SetupError::NotBuildable(root).into());
    }
    Ok(root)
}

/// Load the configuration and run until shutdown.
pub async fn run(port: Option<u16>, path: Option<&Path>, shutdown_rx: Receiver<()>) -> Result<()> {
    let root = resolve_root(path)?;
    let config = DevConfig::load(&root)
        .map_err(SetupError::from)?
        .with_port(port);

    log!("run"; "project root {}", root.display());
    Runner::new(config)
        .with_shutdown_signal(shutdown_rx)
        .run()
        .await
}
