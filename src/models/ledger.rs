//! Dedup ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Granularity of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerItemKind {
    Album,
    Track,
}

impl std::fmt::Display for LedgerItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerItemKind::Album => write!(f, "ALBUM"),
            LedgerItemKind::Track => write!(f, "TRACK"),
        }
    }
}

impl std::str::FromStr for LedgerItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ALBUM" => Ok(LedgerItemKind::Album),
            "TRACK" => Ok(LedgerItemKind::Track),
            _ => Err(format!("Invalid ledger item kind: {}", s)),
        }
    }
}

/// Record that an upstream item was already delivered for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Database ID (None until appended)
    pub id: Option<i64>,

    pub task_id: i64,

    pub external_id: String,

    pub kind: LedgerItemKind,

    pub added_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        task_id: i64,
        external_id: impl Into<String>,
        kind: LedgerItemKind,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            task_id,
            external_id: external_id.into(),
            kind,
            added_at,
        }
    }

    pub fn album(task_id: i64, external_id: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self::new(task_id, external_id, LedgerItemKind::Album, added_at)
    }

    pub fn track(task_id: i64, external_id: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self::new(task_id, external_id, LedgerItemKind::Track, added_at)
    }
}
