// emberchat: the real-time core of an anonymous-match chat client.
// Session management over a single WebSocket, per-message delivery tracking,
// and the matchmaking flow that gates opening a conversation.

pub mod api;
pub mod error;
pub mod matchmaking;
pub mod models;
pub mod session;
pub mod storage;

// Re-export the main types for convenience
pub use models::*;
pub use session::{DeliveryTracker, SessionEvent, SessionManager};
