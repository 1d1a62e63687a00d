//! Process-wide shutdown state.
//!
//! INT and TERM both land in the same handler:
//! - first signal: set `SHUTDOWN` and notify the runner over the shutdown channel
//! - second signal: the runner is stuck, exit immediately

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender};

/// Shutdown has been requested (INT/TERM received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Shutdown signal sender for the runner
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Install the INT/TERM handler. Call once at program start.
///
/// Returns the receiving end of the shutdown channel; the runner selects on it.
pub fn setup_shutdown_handler() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = crossbeam::channel::bounded::<()>(1);
    let _ = SHUTDOWN_TX.set(tx);

    ctrlc::set_handler(|| {
        if SHUTDOWN.swap(true, Ordering::SeqCst) {
            crate::log!("run"; "forced exit");
            std::process::exit(0);
        }

        match SHUTDOWN_TX.get() {
            Some(tx) => {
                crate::log!("run"; "shutting down...");
                let _ = tx.try_send(());
            }
            None => std::process::exit(0),
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set signal handler: {}", e))?;

    Ok(rx)
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Request shutdown from inside the process (e.g. a fatal watcher error).
pub fn request_shutdown() {
    raise(&SHUTDOWN, SHUTDOWN_TX.get());
}

/// Set `flag` and wake the runner. A full channel means a wake-up is already pending.
fn raise(flag: &AtomicBool, tx: Option<&Sender<()>>) {
    flag.store(true, Ordering::SeqCst);
    if let Some(tx) = tx {
        let _ = tx.try_send(());
    }
}
