use std::sync::Arc;

use crossbeam::channel::Receiver;
use tokio::task::JoinHandle;

use crate::actor::build::Builder;
use crate::actor::fs::WatchError;
use crate::actor::supervisor::Supervisor;
use crate::core::is_shutdown;
use crate::logger::{status_error, status_success};
use crate::reload::Hub;
use crate::{debug, log};

/// What one rebuild ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Outcome {
    Restarted(u32),
    BuildFailed,
    SpawnFailed,
    /// Built, but shutdown was requested before the restart.
    Skipped,
}

/// Build, then notify browsers and recycle the child.
///
/// Build and restart run back to back, so the artifact is never
/// replaced while the supervisor is spawning from it.
pub(super) struct Cycle {
    builder: Arc<Builder>,
    supervisor: Arc<Supervisor>,
    hub: Hub,
}

impl Cycle {
    pub(super) fn new(builder: Arc<Builder>, supervisor: Arc<Supervisor>, hub: Hub) -> Self {
        Self {
            builder,
            supervisor,
            hub,
        }
    }

    pub(super) async fn rebuild(&self) -> Outcome {
        let name = self.builder.project().name();
        log!("build"; "building {}", name);

        let elapsed = match Arc::clone(&self.builder).build_async().await {
            Ok(elapsed) => elapsed,
            Err(e) => {
                // The previous child keeps running so its output stays readable.
                status_error(&format!("build failed: {e}"), e.stderr().trim_end());
                return Outcome::BuildFailed;
            }
        };
        status_success(&format!("built {name} in {elapsed:.2?}"));

        if is_shutdown() {
            return Outcome::Skipped;
        }

        self.hub.reload();
        match self.supervisor.restart().await {
            Ok(pid) => Outcome::Restarted(pid),
            Err(e) => {
                log!("error"; "{}", e);
                Outcome::SpawnFailed
            }
        }
    }
}

/// Drain watcher errors. Returns the first fatal one.
pub(super) fn log_watch_errors(
    mut errors: tokio::sync::mpsc::UnboundedReceiver<WatchError>,
) -> JoinHandle<Option<WatchError>> {
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            if err.is_fatal() {
                log!("error"; "watcher stopped: {}", err);
                return Some(err);
            }
            log!("watch"; "{}", err);
        }
        None
    })
}

/// Block until a shutdown signal or a fatal watcher error.
pub(super) async fn wait_for_shutdown(
    shutdown_rx: Option<Receiver<()>>,
    errors: JoinHandle<Option<WatchError>>,
) -> Option<WatchError> {
    let signal = async move {
        match shutdown_rx {
            Some(rx) => {
                let _ = tokio::task::spawn_blocking(move || rx.recv()).await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(signal);

    tokio::select! {
        _ = &mut signal => {
            debug!("run"; "shutdown signal received");
            None
        }
        joined = errors => match joined.ok().flatten() {
            None => {
                signal.await;
                None
            }
            fatal => fatal,
        },
    }
}
