//! Child process supervisor.
//!
//! Owns at most one child started from the artifact. Transitions go
//! through one async mutex, so overlapping `restart` calls queue up and
//! never leave two children behind.
//!
//! ```text
//! None → Starting → Running → Stopping → None
//!                      ↑          │
//!                      └─Starting─┘   (restart)
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};

use crate::{debug, log};

/// Time between the soft interrupt and the hard kill.
pub const GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("cannot start `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    None,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: ChildState,
    pid: Option<u32>,
}

pub struct Supervisor {
    artifact: PathBuf,
    cwd: PathBuf,
    envs: Vec<(String, String)>,
    grace: Duration,
    /// Current child; the lock serializes every transition
    child: tokio::sync::Mutex<Option<Child>>,
    /// Snapshot for readers that must not wait on a transition
    status: Mutex<Status>,
}

impl Supervisor {
    pub fn new(artifact: &Path, cwd: &Path) -> Self {
        Self {
            artifact: artifact.to_path_buf(),
            cwd: cwd.to_path_buf(),
            envs: Vec::new(),
            grace: GRACE_PERIOD,
            child: tokio::sync::Mutex::new(None),
            status: Mutex::new(Status {
                state: ChildState::None,
                pid: None,
            }),
        }
    }

    /// Extra environment for the child (the project's `.env`).
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> ChildState {
        self.status.lock().state
    }

    pub fn pid(&self) -> Option<u32> {
        self.status.lock().pid
    }

    fn set(&self, state: ChildState, pid: Option<u32>) {
        *self.status.lock() = Status { state, pid };
    }

    /// Stop the current child (if any) and start a new one from the artifact.
    ///
    /// Returns the new pid once the process is launched.
    pub async fn restart(&self) -> Result<u32, SpawnError> {
        let mut slot = self.child.lock().await;

        if let Some(mut child) = slot.take() {
            self.set(ChildState::Stopping, child.id());
            self.terminate(&mut child).await;
        }

        self.set(ChildState::Starting, None);
        match self.spawn() {
            Ok(child) => {
                let pid = child.id().unwrap_or_default();
                self.set(ChildState::Running, Some(pid));
                *slot = Some(child);
                log!("run"; "started {} (pid {})", self.artifact_name(), pid);
                Ok(pid)
            }
            Err(e) => {
                self.set(ChildState::None, None);
                Err(e)
            }
        }
    }

    /// Terminate the current child and release it.
    pub async fn stop(&self) {
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            self.set(ChildState::Stopping, child.id());
            self.terminate(&mut child).await;
        }
        self.set(ChildState::None, None);
    }

    fn spawn(&self) -> Result<Child, SpawnError> {
        Command::new(&self.artifact)
            .current_dir(&self.cwd)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Io {
                path: self.artifact.clone(),
                source,
            })
    }

    /// Interrupt, wait up to the grace period, then kill.
    async fn terminate(&self, child: &mut Child) {
        let pid = child.id().unwrap_or_default();

        if let Ok(Some(status)) = child.try_wait() {
            debug!("run"; "child {} had already exited: {}", pid, status);
            return;
        }

        if interrupt(child) {
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("run"; "child {} exited: {}", pid, status);
                    return;
                }
                Ok(Err(e)) => debug!("run"; "waiting on child {}: {}", pid, e),
                Err(_) => log!("run"; "child {} still running after {:?}, killing", pid, self.grace),
            }
        }

        if let Err(e) = child.kill().await {
            debug!("run"; "kill child {}: {}", pid, e);
        }
    }

    fn artifact_name(&self) -> &str {
        crate::utils::path::base_name(&self.artifact)
    }
}

/// Send the soft termination signal. Returns false where none exists.
#[cfg(unix)]
fn interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
    unsafe { libc::kill(pid, libc::SIGINT) == 0 }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> bool {
    false
}
