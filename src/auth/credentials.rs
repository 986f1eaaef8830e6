//! Stored-token credential provider
//!
//! Reads the user's token from the `TokenStore` and refreshes it against the
//! Spotify accounts service when the access token is missing or expired.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::CredentialProvider;
use crate::config::SpotifyConfig;
use crate::database::TokenStore;
use crate::error::CredentialError;
use crate::models::StoredToken;

/// Seconds shaved off `expires_in` so a token is never used right at expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// `CredentialProvider` backed by persisted OAuth tokens
pub struct StoredTokenProvider {
    store: Arc<dyn TokenStore>,
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StoredTokenProvider {
    pub fn new(store: Arc<dyn TokenStore>, config: &SpotifyConfig) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        Ok(Self {
            store,
            client,
            token_url: format!(
                "{}/api/token",
                config.accounts_base_url.trim_end_matches('/')
            ),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    async fn refresh(&self, mut token: StoredToken) -> Result<StoredToken, CredentialError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| CredentialError::NoCredential(token.user_id.clone()))?;

        let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{}: {}", error, description),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            warn!(user_id = %token.user_id, status = status.as_u16(), reason = %reason, "Token refresh rejected");
            return Err(CredentialError::RefreshFailed(reason));
        }

        let refreshed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::RefreshFailed(format!("Invalid token response: {}", e)))?;

        // Short-lived tokens give up at most half their lifetime to the margin
        let margin = EXPIRY_MARGIN_SECS.min(refreshed.expires_in / 2);
        let lifetime = (refreshed.expires_in - margin).max(0);
        let expires_at = Utc::now() + chrono::Duration::seconds(lifetime);

        token.access_token = Some(refreshed.access_token);
        token.expires_at = Some(expires_at);
        if let Some(rotated) = refreshed.refresh_token {
            token.refresh_token = Some(rotated);
        }
        if refreshed.scope.is_some() {
            token.scope = refreshed.scope;
        }

        self.store
            .save_token(&token)
            .await
            .map_err(|e| CredentialError::Storage(e.to_string()))?;

        info!(user_id = %token.user_id, expires_at = %expires_at, "Refreshed access token");
        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for StoredTokenProvider {
    async fn valid_bearer_for(&self, user_id: &str) -> Result<String, CredentialError> {
        let token = self
            .store
            .find_token(user_id)
            .await
            .map_err(|e| CredentialError::Storage(e.to_string()))?
            .ok_or_else(|| CredentialError::NoCredential(user_id.to_string()))?;

        if token.refresh_token.is_none() {
            return Err(CredentialError::NoCredential(user_id.to_string()));
        }

        if let Some(access) = token.usable_access_token(Utc::now()) {
            debug!(user_id = user_id, "Using stored access token");
            return Ok(access.to_string());
        }

        let refreshed = self.refresh(token).await?;
        refreshed
            .access_token
            .ok_or_else(|| CredentialError::RefreshFailed("No access token returned".to_string()))
    }
}
