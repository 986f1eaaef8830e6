//! Watch task domain models
//!
//! A watch task follows a set of upstream entities on one platform and
//! delivers newly released tracks into a destination playlist.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Catalog provider a task runs against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    /// Spotify Web API
    Spotify,
    /// Any provider this engine has no client for
    Other(String),
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Spotify => write!(f, "SPOTIFY"),
            Platform::Other(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("spotify") {
            Platform::Spotify
        } else {
            Platform::Other(s)
        }
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

/// Kind of upstream entity a watch item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchItemKind {
    /// An artist; its albums are the releases
    Artist,
    /// A playlist; has no release dates and cannot be watched for releases
    Playlist,
    /// Anything else
    Other,
}

impl std::fmt::Display for WatchItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchItemKind::Artist => write!(f, "artist"),
            WatchItemKind::Playlist => write!(f, "playlist"),
            WatchItemKind::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for WatchItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "artist" => Ok(WatchItemKind::Artist),
            "playlist" => Ok(WatchItemKind::Playlist),
            "other" => Ok(WatchItemKind::Other),
            _ => Err(format!("Invalid watch item kind: {}", s)),
        }
    }
}

/// One upstream entity followed by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchItem {
    /// Entity kind
    pub kind: WatchItemKind,

    /// Upstream id (e.g. Spotify artist id)
    pub external_id: String,
}

impl WatchItem {
    pub fn new(kind: WatchItemKind, external_id: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: external_id.into(),
        }
    }

    pub fn artist(external_id: impl Into<String>) -> Self {
        Self::new(WatchItemKind::Artist, external_id)
    }
}

/// A recurring release detection job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchTask {
    /// Database ID (None until persisted)
    pub id: Option<i64>,

    /// Owner of the task and of the destination playlist
    pub user_id: String,

    /// Human-readable name
    pub name: String,

    /// Catalog provider
    pub platform: Platform,

    /// Followed entities, in insertion order
    pub items: Vec<WatchItem>,

    /// Days between runs
    pub interval_days: u32,

    /// When the task last ran (success or failure)
    pub last_run_at: Option<DateTime<Utc>>,

    /// Only releases on or after this instant are considered
    pub check_from: Option<DateTime<Utc>>,

    /// Whether the scheduler picks this task up
    pub active: bool,

    /// Destination playlist id
    pub playlist_id: Option<String>,
}

impl WatchTask {
    /// Create an active Spotify task with the default interval of 7 days
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            name: name.into(),
            platform: Platform::Spotify,
            items: Vec::new(),
            interval_days: 7,
            last_run_at: None,
            check_from: None,
            active: true,
            playlist_id: None,
        }
    }

    pub fn with_item(mut self, item: WatchItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_interval_days(mut self, days: u32) -> Self {
        self.interval_days = days;
        self
    }

    pub fn with_check_from(mut self, check_from: DateTime<Utc>) -> Self {
        self.check_from = Some(check_from);
        self
    }

    pub fn with_last_run_at(mut self, last_run_at: DateTime<Utc>) -> Self {
        self.last_run_at = Some(last_run_at);
        self
    }

    pub fn with_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = Some(playlist_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// A task is due when it never ran or its interval has fully elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => last + Duration::days(i64::from(self.interval_days)) <= now,
        }
    }

    /// Database id, or 0 for a task that was never persisted
    pub fn id_or_default(&self) -> i64 {
        self.id.unwrap_or_default()
    }
}
