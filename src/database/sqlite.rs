//! SQLite implementation of the store traits
//!
//! Uses rusqlite behind tokio-rusqlite so that every query runs on the
//! connection's background thread.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::{LedgerStore, TaskStore, TokenStore};
use crate::error::DbError;
use crate::models::{
    LedgerEntry, LedgerItemKind, Platform, StoredToken, WatchItem, WatchItemKind, WatchTask,
};

/// SQLite database implementation
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open (or create) a database and apply the schema
    ///
    /// Use `:memory:` for an in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

const TASK_COLUMNS: &str = "id, user_id, name, platform, interval_days, last_run_at, check_from, active, playlist_id";

#[async_trait]
impl TaskStore for SqliteDatabase {
    async fn find_by_id(&self, id: i64) -> Result<Option<WatchTask>, DbError> {
        self.conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM watch_tasks WHERE id = ?1", TASK_COLUMNS);
                let task = conn.query_row(&sql, [id], row_to_task).optional()?;

                match task {
                    Some(mut task) => {
                        task.items = load_items(conn, id)?;
                        Ok(Some(task))
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    async fn list_all(&self) -> Result<Vec<WatchTask>, DbError> {
        self.conn
            .call(|conn| {
                let sql = format!("SELECT {} FROM watch_tasks ORDER BY id", TASK_COLUMNS);
                let mut tasks = conn
                    .prepare(&sql)?
                    .query_map([], row_to_task)?
                    .collect::<Result<Vec<_>, _>>()?;

                for task in tasks.iter_mut() {
                    task.items = load_items(conn, task.id_or_default())?;
                }

                Ok(tasks)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_active_due(&self, now: DateTime<Utc>) -> Result<Vec<WatchTask>, DbError> {
        let mut tasks = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {} FROM watch_tasks WHERE active = 1 ORDER BY id",
                    TASK_COLUMNS
                );
                let mut tasks = conn
                    .prepare(&sql)?
                    .query_map([], row_to_task)?
                    .collect::<Result<Vec<_>, _>>()?;

                for task in tasks.iter_mut() {
                    task.items = load_items(conn, task.id_or_default())?;
                }

                Ok(tasks)
            })
            .await?;

        tasks.retain(|task| task.is_due(now));
        Ok(tasks)
    }

    async fn persist(&self, task: &WatchTask) -> Result<i64, DbError> {
        let task_id = task.id;
        let user_id = task.user_id.clone();
        let name = task.name.clone();
        let platform = task.platform.to_string();
        let interval_days = task.interval_days;
        let last_run_at = task.last_run_at.map(format_datetime);
        let check_from = task.check_from.map(format_datetime);
        let active = task.active;
        let playlist_id = task.playlist_id.clone();
        let items: Vec<(String, String)> = task
            .items
            .iter()
            .map(|item| (item.kind.to_string(), item.external_id.clone()))
            .collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let id = match task_id {
                    Some(id) => {
                        let updated = tx.execute(
                            r#"
                            UPDATE watch_tasks
                            SET user_id = ?1, name = ?2, platform = ?3, interval_days = ?4,
                                last_run_at = ?5, check_from = ?6, active = ?7, playlist_id = ?8
                            WHERE id = ?9
                            "#,
                            rusqlite::params![
                                user_id,
                                name,
                                platform,
                                interval_days,
                                last_run_at,
                                check_from,
                                active,
                                playlist_id,
                                id
                            ],
                        )?;
                        if updated == 0 {
                            return Ok(None);
                        }
                        tx.execute("DELETE FROM watch_items WHERE task_id = ?1", [id])?;
                        id
                    }
                    None => {
                        tx.execute(
                            r#"
                            INSERT INTO watch_tasks
                            (user_id, name, platform, interval_days, last_run_at, check_from, active, playlist_id)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                            "#,
                            rusqlite::params![
                                user_id,
                                name,
                                platform,
                                interval_days,
                                last_run_at,
                                check_from,
                                active,
                                playlist_id
                            ],
                        )?;
                        tx.last_insert_rowid()
                    }
                };

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO watch_items (task_id, position, kind, external_id) VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for (position, (kind, external_id)) in items.iter().enumerate() {
                        stmt.execute(rusqlite::params![id, position as i64, kind, external_id])?;
                    }
                }

                tx.commit()?;
                Ok(Some(id))
            })
            .await?
            .ok_or(DbError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), DbError> {
        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM watch_tasks WHERE id = ?1", [id])?))
            .await?;

        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn update_last_run_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), DbError> {
        let at = format_datetime(at);

        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE watch_tasks SET last_run_at = ?1 WHERE id = ?2",
                    rusqlite::params![at, id],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteDatabase {
    async fn exists(
        &self,
        task_id: i64,
        external_id: &str,
        kind: LedgerItemKind,
    ) -> Result<bool, DbError> {
        let external_id = external_id.to_string();
        let kind = kind.to_string();

        self.conn
            .call(move |conn| {
                let found: bool = conn.query_row(
                    r#"
                    SELECT EXISTS(
                        SELECT 1 FROM ledger_entries
                        WHERE task_id = ?1 AND external_id = ?2 AND kind = ?3
                    )
                    "#,
                    rusqlite::params![task_id, external_id, kind],
                    |row| row.get(0),
                )?;
                Ok(found)
            })
            .await
            .map_err(Into::into)
    }

    async fn latest_added_at(&self, task_id: i64) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest = self
            .conn
            .call(move |conn| {
                let latest: Option<String> = conn.query_row(
                    "SELECT MAX(added_at) FROM ledger_entries WHERE task_id = ?1",
                    [task_id],
                    |row| row.get(0),
                )?;
                Ok(latest)
            })
            .await?;

        Ok(parse_datetime(latest))
    }

    async fn append(&self, entries: &[LedgerEntry]) -> Result<(), DbError> {
        if entries.is_empty() {
            return Ok(());
        }
        let entries = entries.to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO ledger_entries (task_id, external_id, kind, added_at)
                        VALUES (?1, ?2, ?3, ?4)
                        "#,
                    )?;
                    for entry in &entries {
                        stmt.execute(rusqlite::params![
                            entry.task_id,
                            entry.external_id,
                            entry.kind.to_string(),
                            format_datetime(entry.added_at),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn list_by_task(&self, task_id: i64) -> Result<Vec<LedgerEntry>, DbError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, task_id, external_id, kind, added_at
                    FROM ledger_entries
                    WHERE task_id = ?1
                    ORDER BY id
                    "#,
                )?;

                let entries = stmt
                    .query_map([task_id], |row| {
                        Ok(LedgerEntry {
                            id: Some(row.get(0)?),
                            task_id: row.get(1)?,
                            external_id: row.get(2)?,
                            kind: parse_column(row.get::<_, String>(3)?, 3)?,
                            added_at: required_datetime(row.get::<_, String>(4)?, 4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(entries)
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl TokenStore for SqliteDatabase {
    async fn find_token(&self, user_id: &str) -> Result<Option<StoredToken>, DbError> {
        let user_id = user_id.to_string();

        self.conn
            .call(move |conn| {
                let token = conn
                    .query_row(
                        r#"
                        SELECT user_id, access_token, refresh_token, expires_at, scope
                        FROM spotify_tokens
                        WHERE user_id = ?1
                        "#,
                        [&user_id],
                        |row| {
                            Ok(StoredToken {
                                user_id: row.get(0)?,
                                access_token: row.get(1)?,
                                refresh_token: row.get(2)?,
                                expires_at: parse_datetime(row.get::<_, Option<String>>(3)?),
                                scope: row.get(4)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(token)
            })
            .await
            .map_err(Into::into)
    }

    async fn save_token(&self, token: &StoredToken) -> Result<(), DbError> {
        let user_id = token.user_id.clone();
        let access_token = token.access_token.clone();
        let refresh_token = token.refresh_token.clone();
        let expires_at = token.expires_at.map(format_datetime);
        let scope = token.scope.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO spotify_tokens
                    (user_id, access_token, refresh_token, expires_at, scope, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
                    "#,
                    rusqlite::params![user_id, access_token, refresh_token, expires_at, scope],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchTask> {
    Ok(WatchTask {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        name: row.get(2)?,
        platform: Platform::from(row.get::<_, String>(3)?),
        interval_days: row.get(4)?,
        last_run_at: parse_datetime(row.get::<_, Option<String>>(5)?),
        check_from: parse_datetime(row.get::<_, Option<String>>(6)?),
        active: row.get(7)?,
        playlist_id: row.get(8)?,
        items: Vec::new(),
    })
}

fn load_items(conn: &rusqlite::Connection, task_id: i64) -> rusqlite::Result<Vec<WatchItem>> {
    let mut stmt = conn.prepare(
        "SELECT kind, external_id FROM watch_items WHERE task_id = ?1 ORDER BY position",
    )?;

    let items = stmt
        .query_map([task_id], |row| {
            let kind: WatchItemKind = parse_column(row.get::<_, String>(0)?, 0)?;
            Ok(WatchItem::new(kind, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Parse a text column through `FromStr`, surfacing failures as conversion errors
fn parse_column<T>(value: String, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn required_datetime(value: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(Some(value.clone())).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("Invalid timestamp: {}", value).into(),
        )
    })
}

/// Fixed-width UTC timestamp; sorts lexically in time order
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // SQLite's CURRENT_TIMESTAMP format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
