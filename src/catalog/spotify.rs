//! Spotify Web API client
//!
//! Maps HTTP outcomes onto `ApiError`: 429 becomes `RateLimited` with the
//! `Retry-After` delay (or the configured default), other non-2xx statuses
//! become `Upstream`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::CatalogApi;
use crate::config::SpotifyConfig;
use crate::error::ApiError;
use crate::models::{Album, Page, Track};

/// reqwest-backed `CatalogApi`
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    client: Client,
    api_base_url: String,
    default_retry_after_secs: u64,
}

/// Spotify's error envelope: `{"error": {"status": 404, "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// Build around an existing reqwest client
    pub fn with_client(client: Client, config: &SpotifyConfig) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            default_retry_after_secs: config.default_retry_after_secs,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Page<T>, ApiError> {
        let response = self.send(request).await?;

        response
            .json::<Page<T>>()
            .await
            .map_err(|e| ApiError::InvalidData(e.to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let url = response.url().to_string();

        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Catalog request succeeded");
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.default_retry_after_secs);

            warn!(url = %url, retry_after = wait, "Rate limited by catalog API");
            return Err(ApiError::RateLimited(wait));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);

        warn!(
            url = %url,
            status = status.as_u16(),
            message = %message,
            "Catalog request failed"
        );
        Err(ApiError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn artist_albums(
        &self,
        bearer: &str,
        artist_id: &str,
        include_groups: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Album>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/artists/{}/albums", artist_id)))
            .bearer_auth(bearer)
            .query(&[
                ("include_groups", include_groups.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ]);

        self.get_page(request).await
    }

    async fn album_tracks(
        &self,
        bearer: &str,
        album_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Track>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/albums/{}/tracks", album_id)))
            .bearer_auth(bearer)
            .query(&[("limit", limit.to_string()), ("offset", offset.to_string())]);

        self.get_page(request).await
    }

    async fn follow_albums(&self, bearer: &str, cursor: &str) -> Result<Page<Album>, ApiError> {
        self.get_page(self.client.get(cursor).bearer_auth(bearer))
            .await
    }

    async fn follow_tracks(&self, bearer: &str, cursor: &str) -> Result<Page<Track>, ApiError> {
        self.get_page(self.client.get(cursor).bearer_auth(bearer))
            .await
    }

    async fn append_to_playlist(
        &self,
        bearer: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/playlists/{}/tracks", playlist_id)))
            .bearer_auth(bearer)
            .json(&serde_json::json!({ "uris": uris }));

        self.send(request).await?;
        Ok(())
    }
}
