use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use crate::errors::{AppError, Result};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens closer than this to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 180;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now >= Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

/// Client-credentials bearer token shared by all catalog requests.
///
/// The lock is held across a refresh so concurrent callers trigger one
/// token request.
pub struct TokenCache {
    client: Client,
    client_id: String,
    client_secret: String,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(client: Client, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            current: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        log::debug!("[CATALOG] Requesting access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("❌ [CATALOG] Token request failed with {}: {}", status, body);
            return Err(AppError::Auth(format!("token request failed: status {}", status)));
        }

        let data: TokenResponse = response.json().await?;
        Ok(CachedToken {
            value: data.access_token,
            expires_at: Utc::now() + Duration::seconds(data.expires_in),
        })
    }
}
