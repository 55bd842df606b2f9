// Error taxonomy for the session, matchmaking and storage layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection handshake failed: {0}")]
    Connection(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matchmaking request timed out")]
    Timeout,
    #[error("matchmaking request failed: {0}")]
    Request(#[source] anyhow::Error),
    #[error("profile fetch failed: {0}")]
    ProfileFetch(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
