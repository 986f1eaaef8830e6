//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use release_radar::auth::{CredentialProvider, StoredTokenProvider};
use release_radar::catalog::{CatalogApi, SpotifyClient};
use release_radar::config::{RetryConfig, SpotifyConfig};
use release_radar::database::{LedgerStore, SqliteDatabase, TaskStore, TokenStore};
use release_radar::models::{StoredToken, WatchItem, WatchTask};
use release_radar::radar::{ReleaseDetector, SyncOrchestrator};
use release_radar::sync::RetryManager;

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::new(":memory:")
            .await
            .expect("Failed to create test database"),
    )
}

/// Spotify configuration pointing both API and accounts service at the mock
pub fn spotify_config(server: &MockServer) -> SpotifyConfig {
    SpotifyConfig {
        api_base_url: server.uri(),
        accounts_base_url: server.uri(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        ..SpotifyConfig::default()
    }
}

/// Build an orchestrator wired to the database and the mock server
pub fn create_orchestrator(db: Arc<SqliteDatabase>, server: &MockServer) -> SyncOrchestrator {
    let config = spotify_config(server);
    let tasks: Arc<dyn TaskStore> = db.clone();
    let ledger: Arc<dyn LedgerStore> = db.clone();
    let tokens: Arc<dyn TokenStore> = db;

    let credentials: Arc<dyn CredentialProvider> = Arc::new(
        StoredTokenProvider::new(tokens, &config).expect("Failed to create credential provider"),
    );
    let catalog: Arc<dyn CatalogApi> =
        Arc::new(SpotifyClient::new(&config).expect("Failed to create Spotify client"));
    let retry = RetryManager::new(RetryConfig::default());

    let detector = ReleaseDetector::new(
        Arc::clone(&tasks),
        Arc::clone(&ledger),
        Arc::clone(&credentials),
        Arc::clone(&catalog),
        retry.clone(),
    );

    SyncOrchestrator::new(detector, tasks, ledger, credentials, catalog, retry)
}

/// Checkpoint used by most scenarios
pub fn checkpoint() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap()
}

/// Store a still-valid access token for the user
pub async fn seed_token(db: &SqliteDatabase, user_id: &str) {
    let token = StoredToken::new(user_id)
        .with_access_token(format!("token-{}", user_id), Utc::now() + Duration::hours(1))
        .with_refresh_token(format!("refresh-{}", user_id));
    db.save_token(&token).await.expect("Failed to save token");
}

/// Persist a task watching one artist and return its id
pub async fn seed_task(db: &SqliteDatabase, user_id: &str, artist_id: &str, playlist_id: &str) -> i64 {
    let task = WatchTask::new(user_id, format!("{} radar", user_id))
        .with_item(WatchItem::artist(artist_id))
        .with_check_from(checkpoint())
        .with_playlist(playlist_id);
    db.persist(&task).await.expect("Failed to persist task")
}

/// Album JSON as returned by the artist albums endpoint
pub fn album_json(id: &str, release_date: &str, precision: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Album {}", id),
        "album_type": "album",
        "release_date": release_date,
        "release_date_precision": precision
    })
}

/// Track JSON as returned by the album tracks endpoint
pub fn track_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Track {}", id),
        "uri": format!("spotify:track:{}", id)
    })
}

/// Mount a single-page album listing for an artist
pub async fn mount_artist_albums(server: &MockServer, artist_id: &str, albums: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/artists/{}/albums", artist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": albums,
            "next": null
        })))
        .mount(server)
        .await;
}

/// Mount a single-page track listing for an album
pub async fn mount_album_tracks(server: &MockServer, album_id: &str, track_ids: &[&str]) {
    let items: Vec<Value> = track_ids.iter().map(|id| track_json(id)).collect();

    Mock::given(method("GET"))
        .and(path(format!("/v1/albums/{}/tracks", album_id)))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": items,
            "next": null
        })))
        .mount(server)
        .await;
}

/// Playlist append requests received by the mock, as URI lists
pub async fn appended_uris(server: &MockServer, playlist_id: &str) -> Vec<Vec<String>> {
    let append_path = format!("/v1/playlists/{}/tracks", playlist_id);

    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST" && request.url.path() == append_path)
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).expect("Invalid append body");
            body["uris"]
                .as_array()
                .expect("Missing uris")
                .iter()
                .map(|uri| uri.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .collect()
}
