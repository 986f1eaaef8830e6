//! Persistence layer for release-radar
//!
//! Three narrow store traits cover tasks, the dedup ledger and OAuth tokens.
//! `SqliteDatabase` implements all of them.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{LedgerEntry, LedgerItemKind, StoredToken, WatchTask};

/// Watch task storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load a task together with its watch items
    async fn find_by_id(&self, id: i64) -> Result<Option<WatchTask>, DbError>;

    /// All tasks, ordered by id
    async fn list_all(&self) -> Result<Vec<WatchTask>, DbError>;

    /// Active tasks whose interval has elapsed at `now`
    async fn list_active_due(&self, now: DateTime<Utc>) -> Result<Vec<WatchTask>, DbError>;

    /// Insert (id None) or update a task and replace its items
    ///
    /// Returns the task id.
    async fn persist(&self, task: &WatchTask) -> Result<i64, DbError>;

    /// Delete a task; items and ledger entries cascade
    async fn delete(&self, id: i64) -> Result<(), DbError>;

    /// Record the time of the latest run attempt
    async fn update_last_run_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), DbError>;
}

/// Append-only dedup ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether the item was already recorded for the task
    async fn exists(
        &self,
        task_id: i64,
        external_id: &str,
        kind: LedgerItemKind,
    ) -> Result<bool, DbError>;

    /// Most recent `added_at` across the task's entries
    async fn latest_added_at(&self, task_id: i64) -> Result<Option<DateTime<Utc>>, DbError>;

    /// Append entries; duplicates are not rejected here
    async fn append(&self, entries: &[LedgerEntry]) -> Result<(), DbError>;

    /// All entries for a task in insertion order
    async fn list_by_task(&self, task_id: i64) -> Result<Vec<LedgerEntry>, DbError>;
}

/// OAuth token storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_token(&self, user_id: &str) -> Result<Option<StoredToken>, DbError>;

    async fn save_token(&self, token: &StoredToken) -> Result<(), DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WatchItem;

    // Test 1: MockTaskStore returns a configured task
    #[tokio::test]
    async fn test_mock_task_store_find_by_id() {
        let mut mock = MockTaskStore::new();

        mock.expect_find_by_id()
            .withf(|id| *id == 1)
            .returning(|_| {
                let mut task = WatchTask::new("alice", "radar").with_item(WatchItem::artist("a1"));
                task.id = Some(1);
                Ok(Some(task))
            });

        let task = mock.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(task.user_id, "alice");
        assert_eq!(task.items.len(), 1);
    }

    // Test 2: MockLedgerStore exists with argument matching
    #[tokio::test]
    async fn test_mock_ledger_store_exists() {
        let mut mock = MockLedgerStore::new();

        mock.expect_exists()
            .withf(|task_id, external_id, kind| {
                *task_id == 1 && external_id == "alb1" && *kind == LedgerItemKind::Album
            })
            .returning(|_, _, _| Ok(true));
        mock.expect_exists().returning(|_, _, _| Ok(false));

        assert!(mock.exists(1, "alb1", LedgerItemKind::Album).await.unwrap());
        assert!(!mock.exists(1, "alb2", LedgerItemKind::Album).await.unwrap());
    }

    // Test 3: MockLedgerStore append receives all entries
    #[tokio::test]
    async fn test_mock_ledger_store_append() {
        let mut mock = MockLedgerStore::new();

        mock.expect_append()
            .withf(|entries| entries.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let now = Utc::now();
        let entries = vec![LedgerEntry::album(1, "a", now), LedgerEntry::track(1, "t", now)];
        assert!(mock.append(&entries).await.is_ok());
    }

    // Test 4: MockTokenStore error handling
    #[tokio::test]
    async fn test_mock_token_store_error() {
        let mut mock = MockTokenStore::new();

        mock.expect_find_token().returning(|_| Err(DbError::NotFound));

        match mock.find_token("bob").await {
            Err(DbError::NotFound) => (),
            _ => panic!("Expected DbError::NotFound"),
        }
    }
}
