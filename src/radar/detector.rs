//! Release detection for a single watch task
//!
//! Walks every watched artist's releases, keeps the ones on or after the
//! task checkpoint that the ledger has not seen yet, and resolves their
//! tracks. Every catalog call goes through the `RetryManager`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::dates::{is_on_or_after, parse_release_date};
use crate::auth::CredentialProvider;
use crate::catalog::CatalogApi;
use crate::config::SpotifyConfig;
use crate::database::{LedgerStore, TaskStore};
use crate::error::RadarError;
use crate::models::{Album, LedgerItemKind, Platform, Track, WatchItemKind, WatchTask};
use crate::sync::{walk_pages, RetryManager};

/// New releases found for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedReleases {
    /// Albums not yet in the ledger, in discovery order
    pub albums: Vec<Album>,

    /// Tracks of those albums, in album then track order
    pub tracks: Vec<Track>,
}

impl DetectedReleases {
    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}

/// Finds new releases for watch tasks
pub struct ReleaseDetector {
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn LedgerStore>,
    credentials: Arc<dyn CredentialProvider>,
    catalog: Arc<dyn CatalogApi>,
    retry: RetryManager,
    include_groups: String,
    page_size: u32,
}

impl ReleaseDetector {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        ledger: Arc<dyn LedgerStore>,
        credentials: Arc<dyn CredentialProvider>,
        catalog: Arc<dyn CatalogApi>,
        retry: RetryManager,
    ) -> Self {
        let defaults = SpotifyConfig::default();
        Self {
            tasks,
            ledger,
            credentials,
            catalog,
            retry,
            include_groups: defaults.include_groups,
            page_size: defaults.page_size,
        }
    }

    /// Override the album groups and page size used for listings
    pub fn with_listing(mut self, include_groups: impl Into<String>, page_size: u32) -> Self {
        self.include_groups = include_groups.into();
        self.page_size = page_size;
        self
    }

    /// Load a task by id and detect its new releases
    pub async fn detect(&self, task_id: i64) -> Result<DetectedReleases, RadarError> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or(RadarError::TaskNotFound(task_id))?;

        self.detect_task(&task).await
    }

    /// Detect new releases for an already loaded task
    pub async fn detect_task(&self, task: &WatchTask) -> Result<DetectedReleases, RadarError> {
        let task_id = task.id_or_default();
        validate_task(task)?;

        let bearer = self.credentials.valid_bearer_for(&task.user_id).await?;
        let checkpoint = self.checkpoint(task).await?;

        debug!(
            task_id,
            checkpoint = ?checkpoint,
            artists = task.items.len(),
            "Detecting new releases"
        );

        let mut seen = HashSet::new();
        let mut albums = Vec::new();

        for item in &task.items {
            for album in self.artist_albums(&bearer, &item.external_id).await? {
                if !is_new_release(&album, checkpoint)? {
                    continue;
                }
                if !seen.insert(album.id.clone()) {
                    continue;
                }
                if self
                    .ledger
                    .exists(task_id, &album.id, LedgerItemKind::Album)
                    .await?
                {
                    debug!(task_id, album_id = %album.id, "Album already delivered");
                    continue;
                }
                albums.push(album);
            }
        }

        let mut track_ids = HashSet::new();
        let mut tracks = Vec::new();
        for album in &albums {
            for track in self.album_tracks(&bearer, &album.id).await? {
                if track_ids.insert(track.id.clone()) {
                    tracks.push(track);
                }
            }
        }

        if !albums.is_empty() {
            info!(
                task_id,
                albums = albums.len(),
                tracks = tracks.len(),
                "Detected new releases"
            );
        }

        Ok(DetectedReleases { albums, tracks })
    }

    /// Explicit task checkpoint, else the newest ledger entry, else none
    async fn checkpoint(&self, task: &WatchTask) -> Result<Option<DateTime<Utc>>, RadarError> {
        if let Some(check_from) = task.check_from {
            return Ok(Some(check_from));
        }

        Ok(self.ledger.latest_added_at(task.id_or_default()).await?)
    }

    async fn artist_albums(&self, bearer: &str, artist_id: &str) -> Result<Vec<Album>, RadarError> {
        let catalog = &*self.catalog;
        let retry = &self.retry;
        let include_groups = self.include_groups.as_str();
        let limit = self.page_size;

        let first = retry
            .execute(|| catalog.artist_albums(bearer, artist_id, include_groups, limit, 0))
            .await?;

        let albums = walk_pages(first, |cursor: String| async move {
            retry
                .execute(|| catalog.follow_albums(bearer, &cursor))
                .await
        })
        .await?;

        debug!(artist_id, albums = albums.len(), "Fetched artist releases");
        Ok(albums)
    }

    async fn album_tracks(&self, bearer: &str, album_id: &str) -> Result<Vec<Track>, RadarError> {
        let catalog = &*self.catalog;
        let retry = &self.retry;
        let limit = self.page_size;

        let first = retry
            .execute(|| catalog.album_tracks(bearer, album_id, limit, 0))
            .await?;

        let tracks = walk_pages(first, |cursor: String| async move {
            retry
                .execute(|| catalog.follow_tracks(bearer, &cursor))
                .await
        })
        .await?;

        Ok(tracks)
    }
}

fn validate_task(task: &WatchTask) -> Result<(), RadarError> {
    if task.platform != Platform::Spotify {
        return Err(RadarError::UnsupportedPlatform(task.platform.to_string()));
    }

    if let Some(item) = task
        .items
        .iter()
        .find(|item| item.kind != WatchItemKind::Artist)
    {
        return Err(RadarError::UnsupportedWatchItemKind(item.kind.to_string()));
    }

    Ok(())
}

/// Date filter; malformed dates fail even without a checkpoint
fn is_new_release(album: &Album, checkpoint: Option<DateTime<Utc>>) -> Result<bool, RadarError> {
    match checkpoint {
        Some(checkpoint) => Ok(is_on_or_after(
            &album.release_date,
            &album.release_date_precision,
            checkpoint,
        )?),
        None => {
            parse_release_date(&album.release_date, &album.release_date_precision)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockCredentialProvider;
    use crate::catalog::MockCatalogApi;
    use crate::database::{MockLedgerStore, MockTaskStore};
    use crate::error::{ApiError, CredentialError};
    use crate::models::{Page, WatchItem};
    use chrono::TimeZone;

    fn task() -> WatchTask {
        let mut task = WatchTask::new("alice", "radar")
            .with_item(WatchItem::artist("artist-1"))
            .with_check_from(Utc.with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap())
            .with_playlist("playlist-1");
        task.id = Some(1);
        task
    }

    fn credentials() -> MockCredentialProvider {
        let mut credentials = MockCredentialProvider::new();
        credentials
            .expect_valid_bearer_for()
            .returning(|_| Ok("token".to_string()));
        credentials
    }

    fn empty_ledger() -> MockLedgerStore {
        let mut ledger = MockLedgerStore::new();
        ledger.expect_exists().returning(|_, _, _| Ok(false));
        ledger.expect_latest_added_at().returning(|_| Ok(None));
        ledger
    }

    fn detector(
        ledger: MockLedgerStore,
        credentials: MockCredentialProvider,
        catalog: MockCatalogApi,
    ) -> ReleaseDetector {
        ReleaseDetector::new(
            Arc::new(MockTaskStore::new()),
            Arc::new(ledger),
            Arc::new(credentials),
            Arc::new(catalog),
            RetryManager::with_defaults(),
        )
    }

    // Test 1: Only albums on or after the checkpoint are kept
    #[tokio::test]
    async fn test_date_filter() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Ok(Page::last(vec![
                Album::new("new", "2024-12-26", "day"),
                Album::new("old", "2024-12-24", "day"),
            ]))
        });
        catalog
            .expect_album_tracks()
            .withf(|_, album_id, _, _| album_id == "new")
            .times(1)
            .returning(|_, _, _, _| Ok(Page::last(vec![Track::new("t1")])));

        let detected = detector(empty_ledger(), credentials(), catalog)
            .detect_task(&task())
            .await
            .unwrap();

        assert_eq!(detected.albums.len(), 1);
        assert_eq!(detected.albums[0].id, "new");
        assert_eq!(detected.tracks, vec![Track::new("t1")]);
    }

    // Test 2: Albums already in the ledger are excluded
    #[tokio::test]
    async fn test_ledger_dedup() {
        let mut ledger = MockLedgerStore::new();
        ledger
            .expect_exists()
            .returning(|_, id, kind| Ok(id == "seen" && kind == LedgerItemKind::Album));

        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Ok(Page::last(vec![
                Album::new("seen", "2024-12-26", "day"),
                Album::new("fresh", "2024-12-27", "day"),
            ]))
        });
        catalog
            .expect_album_tracks()
            .times(1)
            .returning(|_, _, _, _| Ok(Page::last(vec![Track::new("t2")])));

        let detected = detector(ledger, credentials(), catalog)
            .detect_task(&task())
            .await
            .unwrap();

        let ids: Vec<_> = detected.albums.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    // Test 3: Unsupported precision aborts detection
    #[tokio::test]
    async fn test_unsupported_precision_aborts() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Ok(Page::last(vec![
                Album::new("a", "2024-12-26", "day"),
                Album::new("b", "2024-12-26", "unknown"),
            ]))
        });
        catalog.expect_album_tracks().never();

        let result = detector(empty_ledger(), credentials(), catalog)
            .detect_task(&task())
            .await;

        match result {
            Err(RadarError::UnsupportedPrecision(p)) => assert_eq!(p, "unknown"),
            other => panic!("Expected UnsupportedPrecision, got {:?}", other),
        }
    }

    // Test 4: Non-Spotify platform is rejected before any credential lookup
    #[tokio::test]
    async fn test_unsupported_platform() {
        let mut credentials = MockCredentialProvider::new();
        credentials.expect_valid_bearer_for().never();

        let task = task().with_platform(Platform::Other("DEEZER".to_string()));
        let result = detector(empty_ledger(), credentials, MockCatalogApi::new())
            .detect_task(&task)
            .await;

        assert!(matches!(result, Err(RadarError::UnsupportedPlatform(p)) if p == "DEEZER"));
    }

    // Test 5: Playlist watch items are rejected
    #[tokio::test]
    async fn test_playlist_item_rejected() {
        let task = task().with_item(WatchItem::new(WatchItemKind::Playlist, "pl"));
        let result = detector(empty_ledger(), credentials(), MockCatalogApi::new())
            .detect_task(&task)
            .await;

        assert!(matches!(
            result,
            Err(RadarError::UnsupportedWatchItemKind(k)) if k == "playlist"
        ));
    }

    // Test 6: Credential failures propagate
    #[tokio::test]
    async fn test_credential_failure() {
        let mut credentials = MockCredentialProvider::new();
        credentials
            .expect_valid_bearer_for()
            .returning(|user| Err(CredentialError::NoCredential(user.to_string())));

        let result = detector(empty_ledger(), credentials, MockCatalogApi::new())
            .detect_task(&task())
            .await;

        assert!(matches!(
            result,
            Err(RadarError::Credential(CredentialError::NoCredential(_)))
        ));
    }

    // Test 7: Album and track cursors are followed
    #[tokio::test]
    async fn test_pagination_followed() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Ok(Page::new(
                vec![Album::new("a1", "2025-01-01", "day")],
                Some("https://api/albums?offset=50".to_string()),
            ))
        });
        catalog
            .expect_follow_albums()
            .withf(|_, cursor| cursor == "https://api/albums?offset=50")
            .times(1)
            .returning(|_, _| Ok(Page::last(vec![Album::new("a2", "2025", "year")])));
        catalog.expect_album_tracks().returning(|_, album_id, _, _| {
            if album_id == "a1" {
                Ok(Page::new(
                    vec![Track::new("t1")],
                    Some("https://api/tracks?offset=50".to_string()),
                ))
            } else {
                Ok(Page::last(vec![Track::new("t3")]))
            }
        });
        catalog
            .expect_follow_tracks()
            .times(1)
            .returning(|_, _| Ok(Page::last(vec![Track::new("t2")])));

        let detected = detector(empty_ledger(), credentials(), catalog)
            .detect_task(&task())
            .await
            .unwrap();

        let ids: Vec<_> = detected.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    // Test 8: Ledger timestamp is the checkpoint when the task has none
    #[tokio::test]
    async fn test_ledger_checkpoint_fallback() {
        let mut ledger = MockLedgerStore::new();
        ledger.expect_exists().returning(|_, _, _| Ok(false));
        ledger
            .expect_latest_added_at()
            .times(1)
            .returning(|_| Ok(Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())));

        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Ok(Page::last(vec![
                Album::new("before", "2024-05", "month"),
                Album::new("after", "2024-06-01", "day"),
            ]))
        });
        catalog
            .expect_album_tracks()
            .returning(|_, _, _, _| Ok(Page::last(vec![])));

        let mut task = task();
        task.check_from = None;

        let detected = detector(ledger, credentials(), catalog)
            .detect_task(&task)
            .await
            .unwrap();

        assert_eq!(detected.albums.len(), 1);
        assert_eq!(detected.albums[0].id, "after");
    }

    // Test 9: An album reached through two artists is processed once
    #[tokio::test]
    async fn test_album_shared_between_artists() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().times(2).returning(|_, _, _, _, _| {
            Ok(Page::last(vec![Album::new("collab", "2025-01-10", "day")]))
        });
        catalog
            .expect_album_tracks()
            .times(1)
            .returning(|_, _, _, _| Ok(Page::last(vec![Track::new("t1")])));

        let task = task().with_item(WatchItem::artist("artist-2"));
        let detected = detector(empty_ledger(), credentials(), catalog)
            .detect_task(&task)
            .await
            .unwrap();

        assert_eq!(detected.albums.len(), 1);
        assert_eq!(detected.tracks.len(), 1);
    }

    // Test 10: Upstream errors abort detection
    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artist_albums().returning(|_, _, _, _, _| {
            Err(ApiError::Upstream {
                status: 404,
                message: "non existing id".to_string(),
            })
        });

        let result = detector(empty_ledger(), credentials(), catalog)
            .detect_task(&task())
            .await;

        assert!(matches!(
            result,
            Err(RadarError::Api(ApiError::Upstream { status: 404, .. }))
        ));
    }

    // Test 11: detect loads the task and reports unknown ids
    #[tokio::test]
    async fn test_detect_unknown_task() {
        let mut tasks = MockTaskStore::new();
        tasks.expect_find_by_id().returning(|_| Ok(None));

        let detector = ReleaseDetector::new(
            Arc::new(tasks),
            Arc::new(empty_ledger()),
            Arc::new(credentials()),
            Arc::new(MockCatalogApi::new()),
            RetryManager::with_defaults(),
        );

        assert!(matches!(
            detector.detect(42).await,
            Err(RadarError::TaskNotFound(42))
        ));
    }
}
