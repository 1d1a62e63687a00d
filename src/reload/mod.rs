//! Browser live reload.
//!
//! # Architecture
//!
//! ```text
//! Runner --reload--> Hub --outbox--> Peer --ws--> Browser
//!                     ^                |
//!                     +----hello-------+
//! ```
//!
//! HTML responses of the host application pass through the injector,
//! which adds the `<script>` tag that makes browsers connect.
//!
//! # Modules
//!
//! - `message` - LiveReload v7 frames (hello, reload, alert)
//! - `hub` - peer registry and broadcast dispatch loop
//! - `peer` - per-socket reader/writer
//! - `inject` - HTML rewrite with gzip/deflate transparency
//! - `server` - `LiveReload` middleware, reserved routes, bind

pub mod hub;
pub mod inject;
pub mod message;
pub mod peer;
pub mod server;

pub use hub::{Hub, OUTBOX_CAPACITY, PeerId};
pub use message::Message;
pub use server::{LiveReload, Middleware, SCRIPT_PATH, SOCKET_PATH};
