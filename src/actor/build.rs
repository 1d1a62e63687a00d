//! Artifact builder.
//!
//! Runs the project's toolchain in the project root and installs the
//! result at a stable artifact path. The artifact is replaced by rename,
//! so a failed build never touches the previous binary.
//!
//! Two project kinds are recognised:
//!
//! | Project | Command | Output |
//! |---------|---------|--------|
//! | cargo   | `cargo build --bin <name>` | `target/debug/<name>` copied to staging |
//! | custom  | `build.command` from `devloop.toml` | written to `$DEVLOOP_OUTPUT` |

use std::env::consts::EXE_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;

use crate::config::{ConfigError, DevConfig};
use crate::core::SetupError;
use crate::utils::exec::{CARGO_FILTER, Cmd, EMPTY_FILTER, ExecError};
use crate::utils::path::base_name;

/// Staging output path handed to custom build commands.
pub const OUTPUT_VAR: &str = "DEVLOOP_OUTPUT";
/// Project root handed to custom build commands.
pub const ROOT_VAR: &str = "DEVLOOP_ROOT";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to execute `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed with {status}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("build produced no output at `{}`", .0.display())]
    MissingOutput(PathBuf),

    #[error("cannot install artifact")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Captured toolchain output, empty unless the build ran and failed.
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

impl From<ExecError> for BuildError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Spawn { program, source } => Self::Spawn { program, source },
            ExecError::Failed { status, stderr, .. } => Self::Failed { status, stderr },
        }
    }
}

// ============================================================================
// Project detection
// ============================================================================

/// How the project in the root is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Project {
    /// Cargo package; `bin` is the binary target to build.
    Cargo { bin: String },
    /// Custom command from `devloop.toml`.
    Custom { name: String, command: Vec<String> },
}

#[derive(Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
    #[serde(default)]
    bin: Vec<ManifestBin>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: String,
}

#[derive(Deserialize)]
struct ManifestBin {
    name: Option<String>,
}

impl Project {
    /// Decide how to build `config.root`.
    ///
    /// An explicit `build.command` wins; otherwise the root must hold a
    /// `Cargo.toml` with a `[package]`.
    pub fn detect(config: &DevConfig) -> Result<Self, SetupError> {
        let root = &config.root;

        if config.build.has_command() {
            let name = match base_name(root) {
                "" => "app".to_string(),
                name => name.to_string(),
            };
            return Ok(Self::Custom {
                name,
                command: config.build.command.clone(),
            });
        }

        let path = root.join("Cargo.toml");
        if !path.is_file() {
            return Err(SetupError::NotBuildable(root.clone()));
        }
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        let manifest: Manifest = toml::from_str(&content).map_err(ConfigError::from)?;

        let Some(package) = manifest.package else {
            return Err(SetupError::NotBuildable(root.clone()));
        };

        let bin = config
            .build
            .bin
            .clone()
            .or_else(|| manifest.bin.into_iter().find_map(|b| b.name))
            .unwrap_or(package.name);

        Ok(Self::Cargo { bin })
    }

    /// Name used for the artifact file.
    pub fn name(&self) -> &str {
        match self {
            Self::Cargo { bin } => bin,
            Self::Custom { name, .. } => name,
        }
    }

    /// Toolchain program that must be on PATH.
    pub fn program(&self) -> &str {
        match self {
            Self::Cargo { .. } => "cargo",
            Self::Custom { command, .. } => command.first().map_or("", String::as_str),
        }
    }

    /// Fail early when the toolchain is missing.
    pub fn check_toolchain(&self) -> Result<(), SetupError> {
        which::which(self.program())
            .map(|_| ())
            .map_err(|_| SetupError::MissingToolchain(self.program().to_string()))
    }
}

/// Stable artifact location for a root: `<temp>/devloop-<name>-<hash><exe>`.
pub fn artifact_path(root: &Path, name: &str) -> PathBuf {
    let hex = blake3::hash(root.as_os_str().as_encoded_bytes()).to_hex();
    let short = &hex.as_str()[..8];
    std::env::temp_dir().join(format!("devloop-{name}-{short}{EXE_SUFFIX}"))
}

// ============================================================================
// Builder
// ============================================================================

pub struct Builder {
    root: PathBuf,
    project: Project,
    artifact: PathBuf,
}

impl Builder {
    pub fn new(root: &Path, project: Project) -> Self {
        let artifact = artifact_path(root, project.name());
        Self {
            root: root.to_path_buf(),
            project,
            artifact,
        }
    }

    /// Install at `artifact` instead of the default temp location.
    pub fn with_artifact(mut self, artifact: PathBuf) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Sibling file the toolchain output lands in before the rename.
    fn staging(&self) -> PathBuf {
        let mut name = self.artifact.as_os_str().to_owned();
        name.push(".staging");
        PathBuf::from(name)
    }

    /// Build and install the artifact, blocking until the toolchain exits.
    ///
    /// Returns the build duration.
    pub fn build(&self) -> Result<Duration, BuildError> {
        let started = Instant::now();
        let staging = self.staging();
        remove_if_exists(&staging)?;

        let result = match &self.project {
            Project::Cargo { bin } => self.build_cargo(bin, &staging),
            Project::Custom { command, .. } => self.build_custom(command, &staging),
        }
        .and_then(|()| {
            fs::rename(&staging, &self.artifact)?;
            Ok(())
        });

        if result.is_err() {
            let _ = remove_if_exists(&staging);
        }
        result.map(|()| started.elapsed())
    }

    /// [`Builder::build`] on the blocking pool.
    pub async fn build_async(self: Arc<Self>) -> Result<Duration, BuildError> {
        match tokio::task::spawn_blocking(move || self.build()).await {
            Ok(result) => result,
            Err(e) => Err(BuildError::Io(std::io::Error::other(e))),
        }
    }

    fn build_cargo(&self, bin: &str, staging: &Path) -> Result<(), BuildError> {
        Cmd::new("cargo")
            .args(["build", "--bin", bin])
            .cwd(&self.root)
            .filter(&CARGO_FILTER)
            .run()?;

        let output = cargo_output(&self.root, bin)
            .ok_or_else(|| BuildError::MissingOutput(self.root.join("target/debug").join(bin)))?;
        fs::copy(&output, staging)?;
        Ok(())
    }

    fn build_custom(&self, command: &[String], staging: &Path) -> Result<(), BuildError> {
        let output = staging.to_string_lossy();
        let root = self.root.to_string_lossy();
        let command: Vec<String> = command
            .iter()
            .map(|arg| substitute(arg, &output, &root))
            .collect();

        Cmd::from_slice(&command)
            .cwd(&self.root)
            .envs([(OUTPUT_VAR, &*output), (ROOT_VAR, &*root)])
            .filter(&EMPTY_FILTER)
            .run()?;

        if !staging.is_file() {
            return Err(BuildError::MissingOutput(staging.to_path_buf()));
        }
        Ok(())
    }

    /// Best-effort artifact removal on shutdown.
    pub fn remove_artifact(&self) {
        for path in [self.artifact.clone(), self.staging()] {
            if let Err(e) = remove_if_exists(&path) {
                crate::debug!("build"; "cannot remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Expand `$DEVLOOP_OUTPUT` / `${DEVLOOP_OUTPUT}` and the root variable.
fn substitute(arg: &str, output: &str, root: &str) -> String {
    let mut arg = arg.to_string();
    for (var, value) in [(OUTPUT_VAR, output), (ROOT_VAR, root)] {
        arg = arg
            .replace(&format!("${{{var}}}"), value)
            .replace(&format!("${var}"), value);
    }
    arg
}

/// Locate `target/debug/<bin>` for the package, honoring
/// `CARGO_TARGET_DIR` and workspace roots above the package.
fn cargo_output(root: &Path, bin: &str) -> Option<PathBuf> {
    let file = format!("{bin}{EXE_SUFFIX}");

    if let Some(dir) = std::env::var_os("CARGO_TARGET_DIR") {
        let path = root.join(dir).join("debug").join(&file);
        if path.is_file() {
            return Some(path);
        }
    }

    root.ancestors()
        .map(|dir| dir.join("target").join("debug").join(&file))
        .find(|path| path.is_file())
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
