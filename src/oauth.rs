use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::{Credential, CredentialKind};
use crate::store::CredentialStore;

const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// Issuer tokens are long-lived; one exchange per 28 days keeps the token
/// endpoint quiet.
const REFRESH_INTERVAL_SECS: i64 = 28 * 24 * 60 * 60;
/// Refresh a minute early so we never race the server clock.
const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    /// Present when the server rotates the refresh token.
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Client for the fixed OAuth token endpoint.
#[derive(Clone)]
pub struct OauthClient {
    http: reqwest::Client,
    token_url: String,
}

impl Default for OauthClient {
    fn default() -> Self {
        Self::new(TOKEN_URL)
    }
}

impl OauthClient {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn exchange(&self, refresh_token: &str) -> Result<TokenExchange, AppError> {
        let resp = self
            .http
            .post(&self.token_url)
            .json(&json!({
                "client_id": CLIENT_ID,
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "scope": "openid profile email",
            }))
            .send()
            .await
            .map_err(|e| AppError::RefreshFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::RefreshFailed(format!(
                "unexpected status: {}",
                resp.status()
            )));
        }

        let token: TokenExchange = resp
            .json()
            .await
            .map_err(|e| AppError::RefreshFailed(e.to_string()))?;
        debug!(expires_in = ?token.expires_in, "exchanged refresh token");
        Ok(token)
    }

    /// Refresh the credential's access token if it has aged past the refresh
    /// window, persisting the result. Static keys and fresh tokens pass
    /// through untouched. On exchange failure the stored row is left as it
    /// was and the error surfaces to the caller.
    pub async fn refresh_if_needed(
        &self,
        store: &CredentialStore,
        cred: &Credential,
    ) -> Result<Credential, AppError> {
        let CredentialKind::InteractiveLogin {
            refresh_token,
            token_refreshed_at,
            ..
        } = &cred.kind
        else {
            return Ok(cred.clone());
        };
        if !refresh_due(*token_refreshed_at, Utc::now()) {
            return Ok(cred.clone());
        }

        let token = self.exchange(refresh_token).await?;

        let mut updated = cred.clone();
        if let CredentialKind::InteractiveLogin {
            refresh_token,
            access_token,
            token_refreshed_at,
            ..
        } = &mut updated.kind
        {
            *access_token = token.access_token;
            if let Some(rotated) = token.refresh_token {
                if !rotated.is_empty() {
                    *refresh_token = rotated;
                }
            }
            *token_refreshed_at = Utc::now();
        }
        store.update(&updated).await?;
        info!(id = cred.id, "refreshed access token");
        Ok(updated)
    }
}

/// True once the stored token's age crosses the refresh window, less a small
/// skew.
pub fn refresh_due(token_refreshed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let fresh_until = token_refreshed_at
        + ChronoDuration::seconds(REFRESH_INTERVAL_SECS - REFRESH_SKEW_SECS);
    now >= fresh_until
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_due() {
        let now = Utc::now();
        assert!(!refresh_due(now, now));
        assert!(!refresh_due(now - ChronoDuration::days(27), now));
    }

    #[test]
    fn aged_token_is_due() {
        let now = Utc::now();
        assert!(refresh_due(now - ChronoDuration::days(29), now));
        assert!(refresh_due(DateTime::<Utc>::UNIX_EPOCH, now));
    }

    #[test]
    fn skew_fires_just_inside_the_window() {
        let now = Utc::now();
        let refreshed = now - ChronoDuration::seconds(REFRESH_INTERVAL_SECS - 30);
        assert!(refresh_due(refreshed, now));

        let refreshed = now - ChronoDuration::seconds(REFRESH_INTERVAL_SECS - 120);
        assert!(!refresh_due(refreshed, now));
    }
}
