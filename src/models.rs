use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message in the active conversation.
///
/// The id is generated on the sending client before transmission, so server
/// acknowledgements can be correlated back to the exact pending entry.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
}

impl ChatMessage {
    /// Build an outbound message with a fresh client-generated id.
    pub fn outbound(sender_id: &str, recipient_id: &str, text: &str) -> Self {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            delivery_status: DeliveryStatus::Pending,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeliveryStatus {
    Pending,   // Created locally, not yet accepted by the server
    Sending,   // Server acknowledged receipt, delivery in progress
    Delivered, // Delivered to the recipient (terminal)
    Failed,    // Server signaled non-delivery (terminal)
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Auth material required to open a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub account_id: String,
}

impl Credentials {
    pub fn new(token: &str, account_id: &str) -> Self {
        Credentials {
            token: token.to_string(),
            account_id: account_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Offline => "offline",
        }
    }
}

/// Preference profile returned by the matchmaking backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub account_id: String,
    pub gender: String,
    pub romance_min: u8,
    pub romance_max: u8,
}

/// A server-paired counterpart account.
///
/// Transient: created when a match is found, consumed exactly once when the
/// user opens the resulting conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub account_id: String,
    pub own_profile: PreferenceProfile,
    pub matched_profile: PreferenceProfile,
}
