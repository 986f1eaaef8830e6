//! Database migrations for release-radar
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexical ordering matches chronological ordering.

/// SQL statement to create the initial database schema
pub const CREATE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Watch tasks
CREATE TABLE IF NOT EXISTS watch_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    platform TEXT NOT NULL,
    interval_days INTEGER NOT NULL CHECK (interval_days > 0),
    last_run_at TEXT,
    check_from TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    playlist_id TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_watch_tasks_active ON watch_tasks(active);

-- Entities followed by a task
CREATE TABLE IF NOT EXISTS watch_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES watch_tasks(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    kind TEXT NOT NULL,
    external_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_watch_items_task ON watch_items(task_id, position);

-- Append-only dedup ledger
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES watch_tasks(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    added_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_task_external ON ledger_entries(task_id, external_id, kind);
CREATE INDEX IF NOT EXISTS idx_ledger_task_added ON ledger_entries(task_id, added_at DESC);

-- OAuth tokens per user
CREATE TABLE IF NOT EXISTS spotify_tokens (
    user_id TEXT PRIMARY KEY,
    access_token TEXT,
    refresh_token TEXT,
    expires_at TEXT,
    scope TEXT,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;
