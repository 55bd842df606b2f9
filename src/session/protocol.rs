// Wire frames exchanged over the chat WebSocket.
// Every frame is a JSON object distinguished by its "type" field.

use serde::{Deserialize, Serialize};

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Server-side readiness signal; completes the connect handshake.
    WsReady,
    /// A chat message delivered to this account.
    Message {
        from: String,
        text: String,
        #[serde(default)]
        id: Option<String>,
    },
    /// The server accepted an outbound message for delivery.
    Ack {
        #[serde(rename = "localId")]
        local_id: String,
    },
    /// The message reached the recipient.
    Delivered {
        #[serde(rename = "localId")]
        local_id: String,
    },
    /// The server could not deliver the message.
    Failed {
        #[serde(rename = "localId")]
        local_id: String,
    },
}

impl InboundFrame {
    /// Parse a text frame. Unknown frame types come back as `None` so the
    /// reader loop can skip them without tearing the session down.
    pub fn parse(text: &str) -> Option<InboundFrame> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::debug!("Ignoring unrecognized frame: {}", e);
                None
            }
        }
    }
}

/// Frames sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message {
        to: String,
        text: String,
        #[serde(rename = "localId")]
        local_id: String,
    },
    Presence {
        status: String,
    },
    ChatOpen {
        with: String,
    },
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        // Serialization of these enums cannot fail: no maps, no non-string keys.
        serde_json::to_string(self).unwrap_or_default()
    }
}
