// Matchmaking flow for the floating overlay.
// A small state machine driven by a bounded long-poll and two concurrent
// preference fetches, gating navigation into a chat session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::timeout;

use crate::error::MatchError;
use crate::models::{MatchCandidate, PreferenceProfile};

/// Upper bound on the matchmaking long-poll.
pub const MATCH_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit bound on each preference fetch rather than inheriting whatever
/// the HTTP layer enforces.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend operations the flow depends on. A trait seam so the state machine
/// is exercised in tests without a server.
#[async_trait]
pub trait MatchmakingApi: Send + Sync {
    /// Long-poll for a paired account. `Ok(None)` means no match was
    /// available before the server gave up.
    async fn poll_match(&self, account_id: &str) -> anyhow::Result<Option<String>>;

    /// Fetch the preference profile for an account.
    async fn fetch_preferences(&self, account_id: &str) -> anyhow::Result<PreferenceProfile>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Idle,
    Searching,
    MatchFound,
    FetchingProfiles,
    Ready,
    Failed,
}

pub struct MatchmakingFlow {
    api: Arc<dyn MatchmakingApi>,
    account_id: String,
    state: MatchState,
    candidate: Option<MatchCandidate>,
    poll_timeout: Duration,
    profile_timeout: Duration,
}

impl MatchmakingFlow {
    pub fn new(api: Arc<dyn MatchmakingApi>, account_id: &str) -> Self {
        MatchmakingFlow {
            api,
            account_id: account_id.to_string(),
            state: MatchState::Idle,
            candidate: None,
            poll_timeout: MATCH_POLL_TIMEOUT,
            profile_timeout: PROFILE_FETCH_TIMEOUT,
        }
    }

    /// Override the default poll/fetch bounds.
    pub fn with_timeouts(mut self, poll: Duration, profile: Duration) -> Self {
        self.poll_timeout = poll;
        self.profile_timeout = profile;
        self
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Run one search cycle. Returns `Ok(true)` when a candidate is ready to
    /// be consumed, `Ok(false)` when no match was available. Timeouts and
    /// fetch failures revert the machine to `Idle`; a failed poll request
    /// lands in `Failed` until `reset()`.
    pub async fn search(&mut self) -> Result<bool, MatchError> {
        if self.state != MatchState::Idle {
            debug!("search ignored in state {:?}", self.state);
            return Ok(self.state == MatchState::Ready);
        }

        self.state = MatchState::Searching;
        info!("Searching for a match");

        let matched_id = match timeout(self.poll_timeout, self.api.poll_match(&self.account_id))
            .await
        {
            Err(_) => {
                info!("Matchmaking poll timed out after {:?}", self.poll_timeout);
                self.state = MatchState::Idle;
                return Err(MatchError::Timeout);
            }
            Ok(Err(e)) => {
                warn!("Matchmaking poll failed: {}", e);
                self.state = MatchState::Failed;
                return Err(MatchError::Request(e));
            }
            Ok(Ok(None)) => {
                info!("No match available");
                self.state = MatchState::Idle;
                return Ok(false);
            }
            Ok(Ok(Some(id))) => id,
        };

        self.state = MatchState::MatchFound;
        info!("Match found: {}", matched_id);
        self.state = MatchState::FetchingProfiles;

        // Both fetches run in parallel and both are awaited: the first
        // failure must not cancel the other in-flight request.
        let (own, matched) = tokio::join!(
            timeout(
                self.profile_timeout,
                self.api.fetch_preferences(&self.account_id)
            ),
            timeout(
                self.profile_timeout,
                self.api.fetch_preferences(&matched_id)
            ),
        );

        let own_profile = match flatten_fetch(own, self.profile_timeout) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Own profile fetch failed: {}", e);
                self.state = MatchState::Idle;
                return Err(MatchError::ProfileFetch(e));
            }
        };
        let matched_profile = match flatten_fetch(matched, self.profile_timeout) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Matched profile fetch failed: {}", e);
                self.state = MatchState::Idle;
                return Err(MatchError::ProfileFetch(e));
            }
        };

        self.candidate = Some(MatchCandidate {
            account_id: matched_id,
            own_profile,
            matched_profile,
        });
        self.state = MatchState::Ready;
        info!("Match candidate ready");
        Ok(true)
    }

    /// Consume the cached candidate. One-shot: the first call after `Ready`
    /// returns it and re-arms the machine to `Idle`; a new candidate only
    /// appears through another search cycle.
    pub fn take_candidate(&mut self) -> Option<MatchCandidate> {
        if self.state != MatchState::Ready {
            return None;
        }
        self.state = MatchState::Idle;
        self.candidate.take()
    }

    /// Return to `Idle`, discarding any cached candidate.
    pub fn reset(&mut self) {
        self.state = MatchState::Idle;
        self.candidate = None;
    }
}

fn flatten_fetch(
    result: Result<anyhow::Result<PreferenceProfile>, tokio::time::error::Elapsed>,
    bound: Duration,
) -> anyhow::Result<PreferenceProfile> {
    match result {
        Ok(Ok(profile)) => Ok(profile),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(anyhow::anyhow!("profile fetch exceeded {:?}", bound)),
    }
}
