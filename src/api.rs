// Thin REST wrapper for the account and matchmaking endpoints.
// Each call is a simple request/response JSON exchange.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::matchmaking::MatchmakingApi;
use crate::models::PreferenceProfile;

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct ResetPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct MatchPollResponse {
    #[serde(default)]
    matched_account: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        ApiClient {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        self.http
            .post(format!("{}/register", self.base_url))
            .json(&RegisterRequest { email, password })
            .send()
            .await?
            .error_for_status()?;
        info!("Registered account {}", email);
        Ok(())
    }

    /// Log in and obtain the auth token used for the chat connection.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let response: LoginResponse = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.token.is_empty() {
            return Err(anyhow!("server returned an empty auth token"));
        }
        Ok(response.token)
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.http
            .post(format!("{}/reset_password", self.base_url))
            .json(&ResetPasswordRequest { email })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl MatchmakingApi for ApiClient {
    async fn poll_match(&self, account_id: &str) -> Result<Option<String>> {
        let response: MatchPollResponse = self
            .http
            .get(format!("{}/match", self.base_url))
            .query(&[("account", account_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.matched_account)
    }

    async fn fetch_preferences(&self, account_id: &str) -> Result<PreferenceProfile> {
        let profile: PreferenceProfile = self
            .http
            .get(format!("{}/preferences", self.base_url))
            .query(&[("account", account_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile)
    }
}
