//! Live reload hub.
//!
//! A single dispatch task owns the peer set. Everything else talks to it
//! through one ordered command queue:
//!
//! ```text
//! Runner ──broadcast──┐
//! Peer ───join/leave──┼──> dispatch loop ──try_send──> peer outboxes
//! Peer ───send_to─────┘
//! ```
//!
//! Each peer gets a bounded outbox whose only sender lives in the loop.
//! A full outbox means the peer is too slow: it is dropped from the set,
//! which closes the outbox and lets its writer finish. The loop never
//! waits on a peer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::message::Message;
use crate::{debug, log};

/// Per-peer outbox capacity.
///
/// Outboxes are the bounded queues. The command queue in front of the
/// dispatch loop is unbounded: the loop only awaits that queue and each
/// command is a non-blocking pass over the peer set, so it drains as fast
/// as it fills. A bounded queue would have to drop `leave` under load,
/// leaving a dead peer in the set, or make every caller async.
pub const OUTBOX_CAPACITY: usize = 256;

/// A serialized frame, shared across outboxes.
pub type Payload = Arc<str>;

/// Receiving end of a peer's outbox.
pub type Outbox = mpsc::Receiver<Payload>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum Command {
    Join {
        id: PeerId,
        outbox: mpsc::Sender<Payload>,
    },
    Leave(PeerId),
    Broadcast(Payload),
    Send(PeerId, Payload),
    Count(oneshot::Sender<usize>),
}

/// Cloneable handle to the hub.
///
/// The dispatch loop starts on the first [`Hub::start`] and stops once
/// every handle is dropped. Commands issued before `start` are discarded;
/// a peer joining a stopped hub sees its outbox closed at once.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    commands: OnceLock<mpsc::UnboundedSender<Command>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the dispatch loop. Later calls are no-ops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        self.inner.commands.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(dispatch(rx));
            debug!("hub"; "started");
            tx
        });
    }

    pub fn is_started(&self) -> bool {
        self.inner.commands.get().is_some()
    }

    fn command(&self, command: Command) {
        if let Some(tx) = self.inner.commands.get() {
            let _ = tx.send(command);
        }
    }

    /// Register a new peer with the default outbox capacity.
    pub fn join(&self) -> (PeerId, Outbox) {
        self.join_with_capacity(OUTBOX_CAPACITY)
    }

    pub fn join_with_capacity(&self, capacity: usize) -> (PeerId, Outbox) {
        let id = PeerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, rx) = mpsc::channel(capacity.max(1));
        self.command(Command::Join { id, outbox });
        (id, rx)
    }

    /// Deregister a peer and close its outbox. Unknown ids are ignored.
    pub fn leave(&self, id: PeerId) {
        self.command(Command::Leave(id));
    }

    pub fn broadcast(&self, message: &Message) {
        self.broadcast_raw(message.to_json());
    }

    /// Broadcast an already serialized frame.
    pub fn broadcast_raw(&self, payload: impl Into<Payload>) {
        self.command(Command::Broadcast(payload.into()));
    }

    /// Tell every browser to reload.
    pub fn reload(&self) {
        self.broadcast(&Message::reload());
    }

    /// Show a banner in every browser.
    pub fn alert(&self, message: impl Into<String>) {
        self.broadcast(&Message::alert(message));
    }

    /// Queue a frame for one peer only.
    pub fn send_to(&self, id: PeerId, message: &Message) {
        self.command(Command::Send(id, message.to_json().into()));
    }

    /// Number of registered peers, after every earlier command is applied.
    pub async fn peer_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Count(tx));
        rx.await.unwrap_or(0)
    }
}

/// The dispatch loop: sole owner of the peer set.
async fn dispatch(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut peers: Vec<(PeerId, mpsc::Sender<Payload>)> = Vec::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Join { id, outbox } => {
                peers.push((id, outbox));
                log!("hub"; "peer {} connected ({} total)", id, peers.len());
            }
            Command::Leave(id) => {
                let before = peers.len();
                peers.retain(|(peer, _)| *peer != id);
                if peers.len() < before {
                    log!("hub"; "peer {} disconnected ({} total)", id, peers.len());
                }
            }
            Command::Broadcast(payload) => {
                let before = peers.len();
                peers.retain(|(id, outbox)| deliver(*id, outbox, &payload));
                debug!("hub"; "broadcast to {} peers", peers.len());
                if peers.len() < before {
                    log!("hub"; "evicted {} peers ({} total)", before - peers.len(), peers.len());
                }
            }
            Command::Send(id, payload) => {
                if let Some(pos) = peers.iter().position(|(peer, _)| *peer == id) {
                    let (_, outbox) = &peers[pos];
                    if !deliver(id, outbox, &payload) {
                        peers.swap_remove(pos);
                        log!("hub"; "evicted peer {} ({} total)", id, peers.len());
                    }
                }
            }
            Command::Count(reply) => {
                let _ = reply.send(peers.len());
            }
        }
    }

    debug!("hub"; "stopped");
}

/// Non-blocking append. `false` means the peer must be evicted.
fn deliver(id: PeerId, outbox: &mpsc::Sender<Payload>, payload: &Payload) -> bool {
    match outbox.try_send(Arc::clone(payload)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("hub"; "peer {} outbox full", id);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
