//! Upstream catalog entities
//!
//! Transient shapes decoded from the Spotify Web API. Unknown fields are
//! ignored so that only what the engine needs is modelled.

use serde::{Deserialize, Serialize};

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in API order
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// Absolute URL of the next page; null or empty when exhausted
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    /// Page with no follow-up cursor
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// The cursor to follow, treating an empty string like null
    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|next| !next.is_empty())
    }
}

/// A release by an artist (album, single, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// `YYYY-MM-DD`, `YYYY-MM` or `YYYY` depending on precision
    pub release_date: String,

    /// `day`, `month` or `year`
    pub release_date_precision: String,

    #[serde(default)]
    pub album_group: Option<String>,
}

impl Album {
    pub fn new(
        id: impl Into<String>,
        release_date: impl Into<String>,
        release_date_precision: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            release_date: release_date.into(),
            release_date_precision: release_date_precision.into(),
            album_group: None,
        }
    }
}

/// A track on an album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// `spotify:track:{id}`, used for playlist writes
    pub uri: String,
}

impl Track {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            uri: format!("spotify:track:{}", id),
            name: String::new(),
            id,
        }
    }
}
