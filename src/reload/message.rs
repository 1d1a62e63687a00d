//! LiveReload v7 message protocol
//!
//! JSON text frames exchanged with browser clients over `/livereload`.
//!
//! # Message Types
//!
//! - `hello`: handshake, sent by both sides
//! - `reload`: reload the page (or refresh stylesheets in place)
//! - `alert`: show a banner in the browser
//!
//! Other client commands (`info`, `url`, ...) parse as `Unknown` and are ignored.

use serde::{Deserialize, Serialize};

/// Protocol identifier advertised in the server `hello`.
pub const PROTOCOL_V7: &str = "http://livereload.com/protocols/official-7";

/// Name reported as `serverName`.
pub const SERVER_NAME: &str = "devloop";

/// Path sent with `reload`; clients treat it as "reload everything".
pub const RELOAD_PATH: &str = "/livereload";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Message {
    Hello {
        #[serde(default)]
        protocols: Vec<String>,
        #[serde(
            rename = "serverName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        server_name: Option<String>,
    },

    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },

    Alert {
        message: String,
    },

    /// Any command this server does not act on
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Server side of the handshake.
    pub fn hello() -> Self {
        Self::Hello {
            protocols: vec![PROTOCOL_V7.to_string()],
            server_name: Some(SERVER_NAME.to_string()),
        }
    }

    /// Full reload with live CSS refresh enabled.
    pub fn reload() -> Self {
        Self::Reload {
            path: RELOAD_PATH.to_string(),
            live_css: true,
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::Alert {
            message: message.into(),
        }
    }

    pub fn is_hello(&self) -> bool {
        matches!(self, Self::Hello { .. })
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"command":"reload","path":"/livereload","liveCSS":true}"#.into())
    }

    /// Parse a client frame; malformed JSON yields `None`.
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
