//! Per-connection peer: the read and write halves of one browser socket.
//!
//! - writer: drains the outbox into text frames, stops on the first error
//!   or once the hub closes the outbox
//! - reader: answers `hello` through the outbox, ignores everything else
//!
//! Whichever half finishes first ends the peer and removes it from the hub.

use axum::extract::ws::{Message as Frame, WebSocket};
use futures::{SinkExt, StreamExt};

use super::hub::{Hub, PeerId};
use super::message::Message;
use crate::debug;

/// Run a peer until either half stops.
pub async fn serve(hub: Hub, socket: WebSocket) {
    let (id, mut outbox) = hub.join();
    let (mut sink, mut stream) = socket.split();

    let writer = async {
        while let Some(payload) = outbox.recv().await {
            if let Err(e) = sink.send(Frame::Text(payload.to_string())).await {
                debug!("peer"; "{} write failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    };

    let reader = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Frame::Text(text)) => on_text(&hub, id, &text),
                Ok(Frame::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("peer"; "{} read failed: {}", id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    hub.leave(id);
}

fn on_text(hub: &Hub, id: PeerId, text: &str) {
    match Message::from_json(text) {
        Some(msg) if msg.is_hello() => {
            debug!("peer"; "{} handshake", id);
            hub.send_to(id, &Message::hello());
            // A reconnecting browser re-syncs right away.
            hub.reload();
        }
        Some(_) => {}
        None => debug!("peer"; "{} sent malformed frame", id),
    }
}
