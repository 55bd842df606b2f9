// Local key-value store bridging the overlay flow back into the main UI:
// auth token, account email, theme flag, and cached match-profile blobs.
// One JSON file under the platform config directory, with an explicit schema
// instead of an ad-hoc preference bus.

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::MatchCandidate;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    #[serde(default)]
    pub dark_theme: bool,
    /// Match candidate cached by the overlay for the foreground UI to open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_match: Option<MatchCandidate>,
}

static STORE_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Redirect the store to a custom path. Used by tests to keep state in a
/// temp dir; only the first call wins.
pub fn set_store_path_override(path: PathBuf) {
    let _ = STORE_PATH_OVERRIDE.set(path);
}

fn store_path() -> Result<PathBuf, StoreError> {
    if let Some(path) = STORE_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    let config_dir = dirs::config_dir()
        .ok_or(StoreError::NoConfigDir)?
        .join("emberchat");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir.join("state.json"))
}

pub fn save_state(state: &StoredState) -> Result<(), StoreError> {
    let path = store_path()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, state)?;
    info!("Saved local state");
    Ok(())
}

pub fn load_state() -> Result<StoredState, StoreError> {
    let path = store_path()?;
    if !path.exists() {
        return Ok(StoredState::default());
    }
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let state: StoredState = serde_json::from_str(&contents)?;
    Ok(state)
}

/// Stash a freshly found match for the foreground UI, leaving the rest of
/// the stored state untouched.
pub fn cache_pending_match(candidate: &MatchCandidate) -> Result<(), StoreError> {
    let mut state = load_state()?;
    state.pending_match = Some(candidate.clone());
    save_state(&state)
}

/// Take the cached match, clearing it from disk. Consumed exactly once.
pub fn take_pending_match() -> Result<Option<MatchCandidate>, StoreError> {
    let mut state = load_state()?;
    let candidate = state.pending_match.take();
    if candidate.is_some() {
        save_state(&state)?;
    }
    Ok(candidate)
}
