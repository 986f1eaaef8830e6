//! Upstream catalog API
//!
//! The engine reads artist albums and album tracks and performs one write,
//! appending track URIs to a playlist. Every call may fail with
//! `ApiError::RateLimited`, which callers route through `RetryManager`.

pub mod spotify;

pub use spotify::SpotifyClient;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{Album, Page, Track};

/// Paginated reads and the playlist write against the catalog provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// First page of an artist's releases
    async fn artist_albums(
        &self,
        bearer: &str,
        artist_id: &str,
        include_groups: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Album>, ApiError>;

    /// First page of an album's tracks
    async fn album_tracks(
        &self,
        bearer: &str,
        album_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Track>, ApiError>;

    /// Album page behind a `next` cursor
    async fn follow_albums(&self, bearer: &str, cursor: &str) -> Result<Page<Album>, ApiError>;

    /// Track page behind a `next` cursor
    async fn follow_tracks(&self, bearer: &str, cursor: &str) -> Result<Page<Track>, ApiError>;

    /// Append track URIs to the end of a playlist
    async fn append_to_playlist(
        &self,
        bearer: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), ApiError>;
}
