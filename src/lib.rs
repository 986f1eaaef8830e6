//! release-radar - New-release detection for watched artists
//!
//! Watch tasks follow Spotify artists. On every run the engine finds albums
//! released since the task's checkpoint that it has not delivered before,
//! appends their tracks to the task's playlist and records them in a dedup
//! ledger. A batch scheduler runs all due tasks once per interval.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod otel;
pub mod radar;
pub mod sync;
