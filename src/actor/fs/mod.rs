//! File system watching.
//!
//! Watches a project root and turns raw notify events into filtered,
//! debounced callbacks for the runner.
//!
//! Architecture:
//! ```text
//! notify → bridge thread (attach new dirs) → ChangeEvent channel → Debouncer → callbacks
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use notify::RecommendedWatcher;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

// Timer-reset subscriptions.
mod debouncer;
// Base-name pattern filter.
mod filter;
// Shared fs event types.
mod types;
// Per-directory watch registration.
mod watch_roots;

#[cfg(test)]
mod tests;

pub use debouncer::Debouncer;
pub use filter::Pattern;
pub use types::{ChangeEvent, ChangeKind};

use watch_roots::WatchRoots;

/// Capacity of the change event channel.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot watch `{}`", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watcher error")]
    Notify(#[from] notify::Error),
}

impl WatchError {
    /// Fatal errors stop the watcher; the rest are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Setup { .. } => true,
            Self::Notify(e) => matches!(e.kind, notify::ErrorKind::MaxFilesWatch),
        }
    }
}

/// Running watcher over one root.
///
/// Read events with [`Watcher::next`], or split the event and error
/// streams apart with [`Watcher::into_parts`]. Dropping the watcher stops observation and closes both channels.
pub struct Watcher {
    events: mpsc::Receiver<ChangeEvent>,
    errors: mpsc::UnboundedReceiver<WatchError>,
    /// Keeps the OS watcher alive (shared with the bridge thread)
    _inner: Arc<Mutex<Inner>>,
}

struct Inner {
    watcher: RecommendedWatcher,
    roots: WatchRoots,
}

impl Watcher {
    /// Start watching `root` and every visible directory beneath it.
    ///
    /// `ignore` lists directory names skipped besides hidden ones.
    pub fn start(root: &Path, ignore: Vec<String>) -> Result<Self, WatchError> {
        let setup = |source: notify::Error| WatchError::Setup {
            path: root.to_path_buf(),
            source,
        };

        // Unreadable roots fail here rather than with a silent empty watch.
        std::fs::read_dir(root).map_err(|e| setup(notify::Error::io(e)))?;

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .map_err(setup)?;

        let mut roots = WatchRoots::new(root.to_path_buf(), ignore);
        let count = roots.attach_tree(&mut watcher, root).map_err(setup)?;
        crate::debug!("watch"; "watching {} directories under {}", count, root.display());

        let inner = Arc::new(Mutex::new(Inner { watcher, roots }));
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, errors) = mpsc::unbounded_channel();

        let bridge = Arc::downgrade(&inner);
        std::thread::Builder::new()
            .name("devloop-watch".into())
            .spawn(move || bridge_loop(notify_rx, bridge, event_tx, error_tx))
            .map_err(|e| setup(notify::Error::io(e)))?;

        Ok(Self {
            events,
            errors,
            _inner: inner,
        })
    }

    /// Next change event; `None` once the watcher has terminated.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Split into the event and error streams plus a guard that keeps
    /// the OS watcher alive.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<ChangeEvent>,
        mpsc::UnboundedReceiver<WatchError>,
        WatchGuard,
    ) {
        let guard = WatchGuard {
            _inner: self._inner,
        };
        (self.events, self.errors, guard)
    }
}

/// Keeps a split [`Watcher`] registered; drop to stop watching.
pub struct WatchGuard {
    _inner: Arc<Mutex<Inner>>,
}

/// Forward notify results as change events, attaching new directories
/// before their creation is reported downstream.
///
/// Holds the watcher weakly: once the owner drops it, the notify sender
/// goes with it and `recv` ends the loop.
fn bridge_loop(
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    inner: Weak<Mutex<Inner>>,
    event_tx: mpsc::Sender<ChangeEvent>,
    error_tx: mpsc::UnboundedSender<WatchError>,
) {
    while let Ok(result) = notify_rx.recv() {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                let err = WatchError::Notify(e);
                let fatal = err.is_fatal();
                let _ = error_tx.send(err);
                if fatal {
                    break;
                }
                continue;
            }
        };

        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            continue;
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        for path in event.paths {
            {
                let mut guard = inner.lock();
                let Inner { watcher, roots } = &mut *guard;
                if !path.starts_with(roots.root()) || roots.is_inside_skipped(&path) {
                    continue;
                }
                match kind {
                    ChangeKind::Create | ChangeKind::Rename if path.is_dir() => {
                        let skipped = path.file_name().is_some_and(|n| roots.is_skipped(n));
                        if !skipped {
                            match roots.attach_tree(watcher, &path) {
                                Ok(n) if n > 0 => {
                                    crate::debug!("watch"; "attached {} new dirs at {}", n, path.display());
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    let _ = error_tx.send(WatchError::Notify(e));
                                }
                            }
                        }
                    }
                    ChangeKind::Remove | ChangeKind::Rename => roots.detach(&path),
                    _ => {}
                }
            }

            crate::debug!("watch"; "{} {}", kind.label(), path.display());
            if event_tx.blocking_send(ChangeEvent::new(path, kind)).is_err() {
                return; // Receiver dropped
            }
        }
    }
}
