//! Outbound call plumbing and scheduling
//!
//! # Components
//!
//! - [`pagination`]: cursor-following page walker
//! - [`retry`]: retry manager with exponential backoff on rate limits
//! - [`scheduler`]: periodic batch scheduler with manual runs
//!
//! # Example
//!
//! ```ignore
//! use release_radar::sync::{walk_pages, RetryManager};
//!
//! let retry = RetryManager::with_defaults();
//! let first = retry.execute(|| catalog.album_tracks(bearer, album_id, 50, 0)).await?;
//! let tracks = walk_pages(first, |cursor| async move {
//!     retry.execute(|| catalog.follow_tracks(bearer, &cursor)).await
//! })
//! .await?;
//! ```

pub mod pagination;
pub mod retry;
pub mod scheduler;

pub use pagination::walk_pages;
pub use retry::RetryManager;
pub use scheduler::{BatchScheduler, BatchSummary, ManualRunHandle, TaskRunner};
